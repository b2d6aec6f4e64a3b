//! Path queries on layered supply networks.

use tracenet_core::engine::paths::{
    all_paths_between, count_paths_between, most_probable_path, parents, path_probability,
    root_ancestors, shortest_path, Path,
};
use tracenet_core::NodeId;
use tracenet_tests::{assert_close, farm_network, fully_connected};

#[test]
fn parents_is_union_of_predecessors() {
    let net = farm_network();
    let p = parents(&net, [NodeId(5), NodeId(6)]);
    assert_eq!(p.into_iter().collect::<Vec<_>>(), vec![NodeId(2), NodeId(3)]);
}

#[test]
fn roots_of_retailer_are_the_farms_that_supply_it() {
    let net = farm_network();
    assert_eq!(
        root_ancestors(&net, NodeId(4)).into_iter().collect::<Vec<_>>(),
        vec![NodeId(0)]
    );
    assert_eq!(
        root_ancestors(&net, NodeId(6)).into_iter().collect::<Vec<_>>(),
        vec![NodeId(0), NodeId(1)]
    );
}

#[test]
fn enumerates_every_route_including_intra_stage_hops() {
    let net = farm_network();
    let paths = all_paths_between(&net, NodeId(0), NodeId(6));
    assert_eq!(
        paths,
        vec![
            Path::from(vec![0, 2, 3, 6]),
            Path::from(vec![0, 3, 6]),
        ]
    );
    assert_eq!(count_paths_between(&net, NodeId(0), NodeId(6)), 2);
    assert!(all_paths_between(&net, NodeId(1), NodeId(4)).is_empty());
}

#[test]
fn path_count_grows_with_layer_width() {
    // 1 x 3 x 3 x 1: nine routes from the farm to the retailer.
    let net = fully_connected(&[1, 3, 3, 1]);
    let paths = all_paths_between(&net, NodeId(0), NodeId(7));
    assert_eq!(paths.len(), 9);
    assert_eq!(count_paths_between(&net, NodeId(0), NodeId(7)), 9);
    for path in &paths {
        assert_eq!(path.first(), Some(NodeId(0)));
        assert_eq!(path.last(), Some(NodeId(7)));
    }
}

#[test]
fn shortest_path_is_one_of_all_paths() {
    let net = farm_network();
    for source in net.sources() {
        for target in net.stage_nodes(2) {
            let all = all_paths_between(&net, source, target);
            match shortest_path(&net, source, target) {
                Some(best) => {
                    assert!(all.contains(&best.path), "{:?} not in {:?}", best.path, all);
                }
                None => assert!(all.is_empty()),
            }
        }
    }
}

#[test]
fn shortest_and_most_probable_can_disagree() {
    let net = farm_network();
    // 0 -> 3 -> 6 is 2300 long; 0 -> 2 -> 3 -> 6 is 2000 long.
    let short = shortest_path(&net, NodeId(0), NodeId(6)).unwrap();
    assert_eq!(short.path, Path::from(vec![0, 2, 3, 6]));
    assert_close(short.distance, 2000.0, 1e-12, "distance");

    // 0.3 * 0.6 = 0.18 beats 0.7 * 0.2 * 0.6 = 0.084.
    let likely = most_probable_path(&net, NodeId(0), NodeId(6)).unwrap();
    assert_eq!(likely.path, Path::from(vec![0, 3, 6]));
    assert_close(likely.probability, 0.18, 1e-12, "probability");
}

#[test]
fn path_probability_rejects_non_edges() {
    let net = farm_network();
    assert_eq!(path_probability(&net, &Path::from(vec![1, 2])), None);
    assert_close(
        path_probability(&net, &Path::from(vec![0, 2, 5])).unwrap(),
        0.21,
        1e-12,
        "probability",
    );
}
