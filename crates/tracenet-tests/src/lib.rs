//! Shared fixtures for the tracenet integration tests.

use tracenet_core::{FlowEdge, Reports, SupplyNetwork};

/// `stage_ends` for consecutive stages of the given widths.
pub fn stage_ends_for(widths: &[usize]) -> Vec<usize> {
    widths
        .iter()
        .scan(0, |next, &w| {
            *next += w;
            Some(*next - 1)
        })
        .collect()
}

/// Every `(from, to)` pair between consecutive stages.
pub fn stage_pairs(widths: &[usize]) -> Vec<(u32, u32)> {
    let ends = stage_ends_for(widths);
    let mut pairs = Vec::new();
    for s in 0..widths.len().saturating_sub(1) {
        let from_start = ends[s] + 1 - widths[s];
        let to_start = ends[s] + 1;
        for a in from_start..=ends[s] {
            for b in to_start..=ends[s + 1] {
                pairs.push((a as u32, b as u32));
            }
        }
    }
    pairs
}

/// Stages fully connected to the next, with uniform split probabilities.
///
/// Distances grow with the target index so that shortest paths are unique.
pub fn fully_connected(widths: &[usize]) -> SupplyNetwork {
    let ends = stage_ends_for(widths);
    let flows: Vec<FlowEdge> = stage_pairs(widths)
        .into_iter()
        .map(|(a, b)| {
            let stage = ends.iter().position(|&e| (b as usize) <= e).unwrap_or(0);
            let share = 1.0 / widths[stage] as f64;
            FlowEdge::new(a, b, share, 630.0 + 63.0 * b as f64)
        })
        .collect();
    SupplyNetwork::new(ends, flows).expect("layered networks are valid")
}

/// Two sources feeding one retailer: `0 -> 2` carries 0.6, `1 -> 2` carries 0.4.
///
/// Source 0 is twice as far away as source 1, so the two sources get distinct
/// start-time estimates for the same report.
pub fn two_source_scenario() -> (SupplyNetwork, Reports, Vec<f64>) {
    let network = SupplyNetwork::new(
        vec![1, 2],
        vec![
            FlowEdge::new(0, 2, 0.6, 1260.0),
            FlowEdge::new(1, 2, 0.4, 630.0),
        ],
    )
    .expect("valid network");
    let reports = Reports::from_parallel(&[2], &[10.0]).expect("valid reports");
    (network, reports, vec![0.5, 0.5])
}

/// Farms {0, 1}, distributors {2, 3}, retailers {4, 5, 6}.
///
/// Farm 0 supplies both distributors, farm 1 only distributor 3, and
/// distributor 2 forwards part of its stock to distributor 3.
pub fn farm_network() -> SupplyNetwork {
    SupplyNetwork::new(
        vec![1, 3, 6],
        vec![
            FlowEdge::new(0, 2, 0.7, 900.0),
            FlowEdge::new(0, 3, 0.3, 1500.0),
            FlowEdge::new(1, 3, 1.0, 700.0),
            FlowEdge::new(2, 3, 0.2, 300.0),
            FlowEdge::new(2, 4, 0.5, 400.0),
            FlowEdge::new(2, 5, 0.3, 650.0),
            FlowEdge::new(3, 5, 0.4, 500.0),
            FlowEdge::new(3, 6, 0.6, 800.0),
        ],
    )
    .expect("valid network")
}

pub fn assert_close(actual: f64, expected: f64, tol: f64, label: &str) {
    assert!(
        (actual - expected).abs() <= tol,
        "{} mismatch: expected {:.15}, got {:.15}, diff={:.3e}",
        label,
        expected,
        actual,
        (actual - expected).abs()
    );
}
