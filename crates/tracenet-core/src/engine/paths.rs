//! Graph algebra over the supply-chain network.
//!
//! - `parents` / `root_ancestors` / `descendants`: reachability queries
//! - `all_paths_between`: full enumeration of source-to-node paths
//! - `shortest_path`: minimum total transport distance
//! - `most_probable_path`: maximum product of edge probabilities
//!
//! The network is acyclic, so every path is simple and single-source shortest
//! paths are computed by relaxing edges in topological order.

use std::collections::BTreeSet;

use crate::engine::network::{EdgeData, NodeId, SupplyNetwork};

/// An ordered node sequence from a source to a target, both inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Path(Vec<NodeId>);

impl Path {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Path(nodes)
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.0
    }

    pub fn first(&self) -> Option<NodeId> {
        self.0.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.0.last().copied()
    }

    /// Number of edges traversed.
    pub fn hop_count(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Consecutive `(from, to)` pairs along the path.
    pub fn hops(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.0.windows(2).map(|w| (w[0], w[1]))
    }
}

impl From<Vec<u32>> for Path {
    fn from(nodes: Vec<u32>) -> Self {
        Path(nodes.into_iter().map(NodeId).collect())
    }
}

/// A path with its total transport distance.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedPath {
    pub path: Path,
    pub distance: f64,
}

/// A path with the product of its edge probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbablePath {
    pub path: Path,
    pub probability: f64,
}

/// Union of the direct predecessors of `nodes`.
pub fn parents(
    network: &SupplyNetwork,
    nodes: impl IntoIterator<Item = NodeId>,
) -> BTreeSet<NodeId> {
    nodes
        .into_iter()
        .flat_map(|n| network.predecessors(n))
        .collect()
}

/// Ancestors of `node` that have no predecessors of their own.
///
/// Walks the parent frontier upstream until it empties. A node with no
/// predecessors is its own root.
pub fn root_ancestors(network: &SupplyNetwork, node: NodeId) -> BTreeSet<NodeId> {
    let mut roots = BTreeSet::new();
    let mut frontier = BTreeSet::from([node]);
    while !frontier.is_empty() {
        let (exhausted, upstream): (Vec<NodeId>, Vec<NodeId>) = frontier
            .iter()
            .copied()
            .partition(|n| !network.has_predecessors(*n));
        roots.extend(exhausted);
        frontier = parents(network, upstream);
    }
    roots
}

/// Membership mask of `start` and every node reachable from it.
pub fn descendants(network: &SupplyNetwork, start: NodeId) -> Vec<bool> {
    let mut seen = vec![false; network.node_count()];
    if !network.contains(start) {
        return seen;
    }
    let mut stack = vec![start];
    seen[start.index()] = true;
    while let Some(node) = stack.pop() {
        for next in network.successors(node) {
            if !seen[next.index()] {
                seen[next.index()] = true;
                stack.push(next);
            }
        }
    }
    seen
}

/// Every path from `start` to `end`, sorted lexicographically.
///
/// Fragments are grown one hop upstream from `end` until they reach `start`.
/// Parents that `start` cannot reach are pruned, which discards exactly the
/// fragments that could never begin at `start`.
///
/// # Complexity
///
/// The output size is the number of paths, which grows exponentially with
/// depth in densely connected networks (a full `k`-ary layering of `d` stages
/// has `k^(d-2)` paths between a source and a terminal node). No bound is
/// applied; callers that need one should count with [`count_paths_between`]
/// first.
pub fn all_paths_between(network: &SupplyNetwork, start: NodeId, end: NodeId) -> Vec<Path> {
    if !network.contains(start) || !network.contains(end) {
        return Vec::new();
    }
    let reachable = descendants(network, start);
    if !reachable[end.index()] {
        return Vec::new();
    }

    let mut complete = Vec::new();
    // fragments are stored end-first
    let mut fragments: Vec<Vec<NodeId>> = vec![vec![end]];
    while let Some(fragment) = fragments.pop() {
        let head = fragment[fragment.len() - 1];
        if head == start {
            let mut nodes = fragment;
            nodes.reverse();
            complete.push(Path(nodes));
            continue;
        }
        for parent in network.predecessors(head) {
            if reachable[parent.index()] {
                let mut extended = Vec::with_capacity(fragment.len() + 1);
                extended.extend_from_slice(&fragment);
                extended.push(parent);
                fragments.push(extended);
            }
        }
    }

    complete.sort();
    complete
}

/// Number of paths from `start` to `end`, without materializing them.
///
/// Saturates at `u128::MAX`.
pub fn count_paths_between(network: &SupplyNetwork, start: NodeId, end: NodeId) -> u128 {
    if !network.contains(start) || !network.contains(end) {
        return 0;
    }
    let mut counts = vec![0u128; network.node_count()];
    counts[start.index()] = 1;
    for &node in network.topological_order() {
        let here = counts[node.index()];
        if here == 0 {
            continue;
        }
        for next in network.successors(node) {
            counts[next.index()] = counts[next.index()].saturating_add(here);
        }
    }
    counts[end.index()]
}

/// Path from `start` to `end` with the least total transport distance.
pub fn shortest_path(network: &SupplyNetwork, start: NodeId, end: NodeId) -> Option<WeightedPath> {
    let (path, distance) = dag_shortest_path(network, start, end, |edge| Some(edge.distance))?;
    Some(WeightedPath { path, distance })
}

/// Path from `start` to `end` with the highest probability.
///
/// Each edge probability `w` is mapped to the cost `1 - ln(w)` and the
/// cheapest path is taken. Zero-probability edges are never traversable.
/// When every hop crosses one stage boundary all `start -> end` paths have
/// the same hop count and the per-hop constant does not change the ranking;
/// intra-stage hops are charged one extra unit each. The returned probability
/// is the product of the original edge probabilities.
pub fn most_probable_path(
    network: &SupplyNetwork,
    start: NodeId,
    end: NodeId,
) -> Option<ProbablePath> {
    let (path, _) = dag_shortest_path(network, start, end, probability_cost)?;
    let probability = path_probability(network, &path)?;
    Some(ProbablePath { path, probability })
}

/// Product of edge probabilities along `path`, or `None` if a hop is not an edge.
pub fn path_probability(network: &SupplyNetwork, path: &Path) -> Option<f64> {
    path.hops().try_fold(1.0, |acc, (from, to)| {
        network.edge_between(from, to).map(|e| acc * e.probability)
    })
}

fn probability_cost(edge: &EdgeData) -> Option<f64> {
    (edge.probability > 0.0).then(|| 1.0 - edge.probability.ln())
}

/// Single-pair shortest path by relaxing edges in topological order.
///
/// `cost` returns `None` for edges that must not be traversed. Ties keep the
/// first relaxation, which makes the result deterministic.
fn dag_shortest_path(
    network: &SupplyNetwork,
    start: NodeId,
    end: NodeId,
    cost: impl Fn(&EdgeData) -> Option<f64>,
) -> Option<(Path, f64)> {
    if !network.contains(start) || !network.contains(end) {
        return None;
    }
    let n = network.node_count();
    let mut best = vec![f64::INFINITY; n];
    let mut via: Vec<Option<NodeId>> = vec![None; n];
    best[start.index()] = 0.0;

    for &node in network.topological_order() {
        let here = best[node.index()];
        if !here.is_finite() {
            continue;
        }
        if node == end {
            break;
        }
        for edge in network.outgoing(node) {
            let Some(w) = cost(edge) else {
                continue;
            };
            let candidate = here + w;
            if candidate < best[edge.dst.index()] {
                best[edge.dst.index()] = candidate;
                via[edge.dst.index()] = Some(node);
            }
        }
    }

    if !best[end.index()].is_finite() {
        return None;
    }
    let mut nodes = vec![end];
    let mut cursor = end;
    while let Some(prev) = via[cursor.index()] {
        nodes.push(prev);
        cursor = prev;
    }
    nodes.reverse();
    Some((Path(nodes), best[end.index()]))
}
