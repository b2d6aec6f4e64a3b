//! Exact and heuristic estimators against each other.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

use tracenet_core::engine::exact::trajectory_space_size;
use tracenet_core::engine::volume::volume_log_likelihood;
use tracenet_core::{
    EnumerationProgress, ExactEstimator, ExactMode, FlowEdge, HeuristicEstimator, NodeId,
    PathRule, Reports, SupplyNetwork, TimeMode, TimeModelConfig,
};
use tracenet_tests::{assert_close, farm_network};

/// Farm 0 ships through distributors 1 and 2 to retailers 3, 4, 5 with one
/// route per retailer.
fn tree() -> SupplyNetwork {
    SupplyNetwork::new(
        vec![0, 2, 5],
        vec![
            FlowEdge::new(0, 1, 0.6, 700.0),
            FlowEdge::new(0, 2, 0.4, 1100.0),
            FlowEdge::new(1, 3, 0.5, 300.0),
            FlowEdge::new(1, 4, 0.5, 900.0),
            FlowEdge::new(2, 5, 1.0, 450.0),
        ],
    )
    .unwrap()
}

fn heuristic_ll(
    net: &SupplyNetwork,
    rule: PathRule,
    reports: &Reports,
    config: TimeModelConfig,
) -> f64 {
    HeuristicEstimator::new(net, config, rule, TimeMode::Integrated)
        .unwrap()
        .score_source(NodeId(0), reports)
        .unwrap()
        .log_likelihood
}

#[test]
fn single_route_networks_make_every_time_estimator_agree() {
    let net = tree();
    let reports = Reports::from_parallel(&[3, 4, 5], &[13.0, 15.5, 12.0]).unwrap();
    let config = TimeModelConfig::default().with_transport_dev_frac(0.2);

    let exact = ExactEstimator::new(&net, config, ExactMode::TimeOnly)
        .unwrap()
        .score_source(NodeId(0), &reports)
        .unwrap();
    let bfs = heuristic_ll(&net, PathRule::Bfs, &reports, config);
    let maxp = heuristic_ll(&net, PathRule::MaxP, &reports, config);

    assert!(exact.is_finite());
    assert_close(bfs, exact, 1e-9, "bfs vs exact");
    assert_close(maxp, exact, 1e-9, "maxp vs exact");
}

#[test]
fn single_route_combined_exact_equals_volume_times_time() {
    let net = tree();
    let reports = Reports::from_parallel(&[3, 5], &[13.0, 12.0]).unwrap();
    let config = TimeModelConfig::default();

    let exact = ExactEstimator::new(&net, config, ExactMode::TimeAndVolume)
        .unwrap()
        .score_source(NodeId(0), &reports)
        .unwrap();
    let volume = volume_log_likelihood(&net, NodeId(0), &reports);
    let time = heuristic_ll(&net, PathRule::Bfs, &reports, config);

    // 0.6 * 0.5 to retailer 3 and 0.4 * 1.0 to retailer 5.
    assert_close(volume, (0.3_f64 * 0.4).ln(), 1e-12, "volume");
    assert_close(exact, volume + time, 1e-9, "combined");
}

#[test]
fn trajectory_space_counts_each_report_separately() {
    let net = farm_network();
    let reports = Reports::from_parallel(&[5, 6, 6], &[14.0, 15.0, 16.0]).unwrap();
    // Farm 0 reaches 5 three ways and 6 two ways; farm 1 has one route to each.
    assert_eq!(trajectory_space_size(&net, NodeId(0), &reports), 12);
    assert_eq!(trajectory_space_size(&net, NodeId(1), &reports), 1);

    let visited = AtomicU64::new(0);
    let observer = |p: EnumerationProgress| -> ControlFlow<()> {
        visited.store(p.visited as u64, Ordering::SeqCst);
        ControlFlow::Continue(())
    };
    let estimator = ExactEstimator::new(&net, TimeModelConfig::default(), ExactMode::TimeOnly)
        .unwrap()
        .with_observer(&observer, 1);
    let ll = estimator.score_source(NodeId(0), &reports).unwrap();
    assert!(ll.is_finite());
    assert_eq!(visited.load(Ordering::SeqCst), 12);
}

#[test]
fn exact_scores_come_back_in_source_order() {
    let net = farm_network();
    let reports = Reports::from_parallel(&[5, 6], &[14.0, 15.0]).unwrap();
    let estimator =
        ExactEstimator::new(&net, TimeModelConfig::default(), ExactMode::TimeAndVolume).unwrap();
    let batch = estimator.score_sources(&[NodeId(1), NodeId(0)], &reports);
    assert_eq!(batch[0], estimator.score_source(NodeId(1), &reports));
    assert_eq!(batch[1], estimator.score_source(NodeId(0), &reports));
}

#[test]
fn heuristic_unreachable_node_zeroes_source() {
    let net = farm_network();
    let reports = Reports::from_parallel(&[4, 6], &[14.0, 15.0]).unwrap();
    for rule in [PathRule::Bfs, PathRule::MaxP] {
        let score = HeuristicEstimator::new(
            &net,
            TimeModelConfig::default(),
            rule,
            TimeMode::PointEstimate,
        )
        .unwrap()
        .score_source(NodeId(1), &reports)
        .unwrap();
        assert_eq!(score.log_likelihood, f64::NEG_INFINITY);
        assert_eq!(score.start_time, None);
    }
}
