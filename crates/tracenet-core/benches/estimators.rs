//! Benchmarks comparing exact trajectory enumeration with the heuristic estimators.
//!
//! Run with: cargo bench --bench estimators

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tracenet_core::engine::paths::all_paths_between;
use tracenet_core::{
    traceback, Estimator, FlowEdge, NodeId, Reports, SupplyNetwork, TracebackConfig,
};

/// `stages` fully connected layers of `width` nodes each.
fn layered(stages: usize, width: usize) -> SupplyNetwork {
    let stage_ends: Vec<usize> = (1..=stages).map(|s| s * width - 1).collect();
    let mut flows = Vec::new();
    for s in 0..stages - 1 {
        for a in s * width..(s + 1) * width {
            for b in (s + 1) * width..(s + 2) * width {
                let distance = 400.0 + 37.0 * ((a * 7 + b * 3) % 11) as f64;
                flows.push(FlowEdge::new(
                    a as u32,
                    b as u32,
                    1.0 / width as f64,
                    distance,
                ));
            }
        }
    }
    SupplyNetwork::new(stage_ends, flows).unwrap()
}

fn retailer_reports(stages: usize, width: usize, count: usize) -> Reports {
    let first = (stages - 1) * width;
    let nodes: Vec<u32> = (0..count).map(|i| (first + i % width) as u32).collect();
    let times: Vec<f64> = (0..count).map(|i| 10.0 + i as f64 * 0.75).collect();
    Reports::from_parallel(&nodes, &times).unwrap()
}

fn benchmark_heuristics(c: &mut Criterion) {
    let mut group = c.benchmark_group("heuristic_estimators");
    for width in [4, 8, 16] {
        let network = layered(4, width);
        let reports = retailer_reports(4, width, width);
        let prior = vec![1.0 / width as f64; width];
        for estimator in [Estimator::BfsTimeVolumePoint, Estimator::MaxPTimeVolume] {
            let config = TracebackConfig::default()
                .with_estimator(estimator)
                .with_feasibility_fraction(0.5);
            group.bench_with_input(
                BenchmarkId::new(estimator.name(), width),
                &width,
                |b, _| {
                    b.iter(|| traceback(black_box(&network), &prior, &reports, &config));
                },
            );
        }
    }
    group.finish();
}

fn benchmark_exact(c: &mut Criterion) {
    let mut group = c.benchmark_group("exact_estimator");
    group.measurement_time(Duration::from_secs(10));
    for reports_count in [1, 2, 3] {
        let network = layered(3, 3);
        let reports = retailer_reports(3, 3, reports_count);
        let config = TracebackConfig::default()
            .with_estimator(Estimator::ExactTimeVolume)
            .with_feasibility_fraction(0.5);
        group.bench_with_input(
            BenchmarkId::new("exact-time-volume", reports_count),
            &reports_count,
            |b, _| {
                b.iter(|| traceback(black_box(&network), &[1.0 / 3.0; 3], &reports, &config));
            },
        );
    }
    group.finish();
}

fn benchmark_path_enumeration(c: &mut Criterion) {
    let mut group = c.benchmark_group("all_paths_between");
    for stages in [3, 4, 5] {
        let network = layered(stages, 4);
        let target = NodeId(((stages - 1) * 4) as u32);
        group.bench_with_input(BenchmarkId::from_parameter(stages), &stages, |b, _| {
            b.iter(|| all_paths_between(black_box(&network), NodeId(0), target));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_heuristics,
    benchmark_exact,
    benchmark_path_enumeration
);
criterion_main!(benches);
