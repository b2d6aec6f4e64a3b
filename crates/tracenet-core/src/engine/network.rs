//! # Supply-Chain Network
//!
//! A stage-partitioned, weighted, directed acyclic graph. Nodes are numbered
//! `0..N` and grouped into consecutive stages: `stage_ends[i]` is the index of
//! the last node of stage `i`, so stage 0 holds the candidate sources
//! (`0..=stage_ends[0]`) and the last stage holds the terminal nodes.
//!
//! ## Design
//!
//! - Edges live in an arena (`Vec<EdgeData>`) indexed by [`EdgeId`]; a
//!   `(from, to)` index gives O(1) lookup in place of matrix indexing.
//! - Incoming and outgoing adjacency lists use `SmallVec` inline storage since
//!   supply-chain nodes usually have a handful of trading partners.
//! - Only positive flow entries become edges. A zero-probability entry is not
//!   traversable, so it is never stored.
//! - A topological order is computed once at construction; construction fails
//!   on cycles.
//!
//! The network is immutable once built and is shared read-only by every
//! estimator.

use std::collections::VecDeque;
use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::TraceError;

/// Maximum size for inline storage of adjacency lists.
const INLINE_ADJ_SIZE: usize = 8;

type AdjList = SmallVec<[EdgeId; INLINE_ADJ_SIZE]>;

/// A node of the supply-chain network.
///
/// Implements Ord for stable, deterministic iteration.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node in `0..N`.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// An edge of the network; doubles as the column index of incidence matrices.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EdgeId(pub u32);

impl EdgeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A sparse flow-matrix entry together with its transport distance.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FlowEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// Probability mass leaving `from` that arrives at `to`.
    pub probability: f64,
    /// Transport distance, used to derive the mean transit time.
    #[cfg_attr(feature = "serde", serde(default))]
    pub distance: f64,
}

impl FlowEdge {
    pub fn new(from: u32, to: u32, probability: f64, distance: f64) -> Self {
        Self {
            from: NodeId(from),
            to: NodeId(to),
            probability,
            distance,
        }
    }
}

/// A stored edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeData {
    pub id: EdgeId,
    pub src: NodeId,
    pub dst: NodeId,
    pub probability: f64,
    pub distance: f64,
}

/// Stage-partitioned directed acyclic supply-chain network.
#[derive(Debug, Clone)]
pub struct SupplyNetwork {
    stage_ends: Vec<usize>,
    edges: Vec<EdgeData>,
    edge_index: FxHashMap<(NodeId, NodeId), EdgeId>,
    outgoing: Vec<AdjList>,
    incoming: Vec<AdjList>,
    topo_order: Vec<NodeId>,
}

impl SupplyNetwork {
    /// Builds a network from stage boundaries and sparse flow entries.
    ///
    /// Entries with zero probability are dropped. Returns
    /// [`TraceError::Validation`] for malformed stages, out-of-range or
    /// duplicate edges, probabilities outside `[0, 1]`, negative or
    /// non-finite distances, and cycles.
    pub fn new(
        stage_ends: Vec<usize>,
        flows: impl IntoIterator<Item = FlowEdge>,
    ) -> Result<Self, TraceError> {
        validate_stage_ends(&stage_ends)?;
        let node_count = stage_ends[stage_ends.len() - 1] + 1;

        let mut edges: Vec<EdgeData> = Vec::new();
        let mut edge_index = FxHashMap::default();
        let mut outgoing = vec![AdjList::new(); node_count];
        let mut incoming = vec![AdjList::new(); node_count];

        for flow in flows {
            if flow.from.index() >= node_count || flow.to.index() >= node_count {
                return Err(TraceError::Validation(format!(
                    "edge {} -> {} references a node outside 0..{}",
                    flow.from, flow.to, node_count
                )));
            }
            if flow.from == flow.to {
                return Err(TraceError::Validation(format!(
                    "self-loop on node {}",
                    flow.from
                )));
            }
            if !flow.probability.is_finite() || !(0.0..=1.0).contains(&flow.probability) {
                return Err(TraceError::Validation(format!(
                    "edge {} -> {} has probability {} outside [0, 1]",
                    flow.from, flow.to, flow.probability
                )));
            }
            if !flow.distance.is_finite() || flow.distance < 0.0 {
                return Err(TraceError::Validation(format!(
                    "edge {} -> {} has invalid distance {}",
                    flow.from, flow.to, flow.distance
                )));
            }
            if flow.probability == 0.0 {
                continue;
            }

            let id = EdgeId(edges.len() as u32);
            if edge_index.insert((flow.from, flow.to), id).is_some() {
                return Err(TraceError::Validation(format!(
                    "duplicate edge {} -> {}",
                    flow.from, flow.to
                )));
            }
            edges.push(EdgeData {
                id,
                src: flow.from,
                dst: flow.to,
                probability: flow.probability,
                distance: flow.distance,
            });
            outgoing[flow.from.index()].push(id);
            incoming[flow.to.index()].push(id);
        }

        let topo_order = topological_order(node_count, &edges, &outgoing, &incoming)?;

        Ok(Self {
            stage_ends,
            edges,
            edge_index,
            outgoing,
            incoming,
            topo_order,
        })
    }

    /// Builds a network from dense `N x N` flow and distance matrices.
    ///
    /// Entry `(i, j)` of `flow` is the transition probability from `i` to `j`;
    /// zero entries are not edges. `distance` must have the same shape.
    pub fn from_dense(
        stage_ends: Vec<usize>,
        flow: &[Vec<f64>],
        distance: &[Vec<f64>],
    ) -> Result<Self, TraceError> {
        validate_stage_ends(&stage_ends)?;
        let n = stage_ends[stage_ends.len() - 1] + 1;
        if flow.len() != n || distance.len() != n {
            return Err(TraceError::Validation(format!(
                "expected {} matrix rows, got flow={} distance={}",
                n,
                flow.len(),
                distance.len()
            )));
        }

        let mut flows = Vec::new();
        for (i, (flow_row, dist_row)) in flow.iter().zip(distance).enumerate() {
            if flow_row.len() != n || dist_row.len() != n {
                return Err(TraceError::Validation(format!(
                    "row {} must have {} columns",
                    i, n
                )));
            }
            for (j, (&p, &d)) in flow_row.iter().zip(dist_row).enumerate() {
                if p != 0.0 {
                    flows.push(FlowEdge::new(i as u32, j as u32, p, d));
                }
            }
        }

        Self::new(stage_ends, flows)
    }

    /// Number of nodes `N`.
    pub fn node_count(&self) -> usize {
        self.outgoing.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn stage_count(&self) -> usize {
        self.stage_ends.len()
    }

    pub fn stage_ends(&self) -> &[usize] {
        &self.stage_ends
    }

    pub fn contains(&self, node: NodeId) -> bool {
        node.index() < self.node_count()
    }

    /// Zero-based stage of `node`, or `None` if the node is out of range.
    pub fn stage_of(&self, node: NodeId) -> Option<usize> {
        if !self.contains(node) {
            return None;
        }
        Some(self.stage_ends.partition_point(|&end| end < node.index()))
    }

    /// Nodes of the zero-based `stage`.
    pub fn stage_nodes(&self, stage: usize) -> impl Iterator<Item = NodeId> + '_ {
        let (start, end) = match stage {
            s if s >= self.stage_ends.len() => (1, 0),
            0 => (0, self.stage_ends[0]),
            s => (self.stage_ends[s - 1] + 1, self.stage_ends[s]),
        };
        (start..=end).map(|i| NodeId(i as u32))
    }

    /// Candidate sources: the nodes of the first stage.
    pub fn sources(&self) -> Vec<NodeId> {
        self.stage_nodes(0).collect()
    }

    pub fn source_count(&self) -> usize {
        self.stage_ends[0] + 1
    }

    pub fn is_source(&self, node: NodeId) -> bool {
        node.index() <= self.stage_ends[0]
    }

    pub fn is_terminal(&self, node: NodeId) -> bool {
        self.stage_of(node) == Some(self.stage_ends.len() - 1)
    }

    /// All edges in id order.
    pub fn edges(&self) -> &[EdgeData] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> Option<&EdgeData> {
        self.edges.get(id.index())
    }

    /// The edge from `from` to `to`, if one exists.
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<&EdgeData> {
        self.edge_index
            .get(&(from, to))
            .map(|id| &self.edges[id.index()])
    }

    /// Edges leaving `node`.
    pub fn outgoing(&self, node: NodeId) -> impl Iterator<Item = &EdgeData> + '_ {
        self.outgoing
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|id| &self.edges[id.index()])
    }

    /// Edges entering `node`.
    pub fn incoming(&self, node: NodeId) -> impl Iterator<Item = &EdgeData> + '_ {
        self.incoming
            .get(node.index())
            .into_iter()
            .flatten()
            .map(|id| &self.edges[id.index()])
    }

    /// Direct predecessors of `node`.
    pub fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.incoming(node).map(|e| e.src)
    }

    /// Direct successors of `node`.
    pub fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.outgoing(node).map(|e| e.dst)
    }

    pub fn has_predecessors(&self, node: NodeId) -> bool {
        self.incoming
            .get(node.index())
            .is_some_and(|adj| !adj.is_empty())
    }

    /// Nodes in an order where every edge points forward.
    pub fn topological_order(&self) -> &[NodeId] {
        &self.topo_order
    }
}

fn validate_stage_ends(stage_ends: &[usize]) -> Result<(), TraceError> {
    if stage_ends.is_empty() {
        return Err(TraceError::Validation(
            "network needs at least one stage".into(),
        ));
    }
    if stage_ends.windows(2).any(|w| w[1] <= w[0]) {
        return Err(TraceError::Validation(format!(
            "stage ends must be strictly increasing, got {:?}",
            stage_ends
        )));
    }
    if stage_ends[stage_ends.len() - 1] >= u32::MAX as usize {
        return Err(TraceError::Validation("too many nodes".into()));
    }
    Ok(())
}

/// Kahn's algorithm; fails if the edges contain a cycle.
fn topological_order(
    node_count: usize,
    edges: &[EdgeData],
    outgoing: &[AdjList],
    incoming: &[AdjList],
) -> Result<Vec<NodeId>, TraceError> {
    let mut in_degree: Vec<usize> = incoming.iter().map(|adj| adj.len()).collect();
    let mut ready: VecDeque<usize> = (0..node_count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(node_count);

    while let Some(i) = ready.pop_front() {
        order.push(NodeId(i as u32));
        for id in &outgoing[i] {
            let dst = edges[id.index()].dst.index();
            in_degree[dst] -= 1;
            if in_degree[dst] == 0 {
                ready.push_back(dst);
            }
        }
    }

    if order.len() != node_count {
        return Err(TraceError::Validation(
            "flow network contains a cycle".into(),
        ));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_stage() -> SupplyNetwork {
        // stage 0: {0, 1}, stage 1: {2}, stage 2: {3, 4}
        SupplyNetwork::new(
            vec![1, 2, 4],
            vec![
                FlowEdge::new(0, 2, 1.0, 100.0),
                FlowEdge::new(1, 2, 1.0, 200.0),
                FlowEdge::new(2, 3, 0.25, 50.0),
                FlowEdge::new(2, 4, 0.75, 80.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn stages_partition_the_nodes() {
        let net = three_stage();
        assert_eq!(net.node_count(), 5);
        assert_eq!(net.stage_count(), 3);
        assert_eq!(net.sources(), vec![NodeId(0), NodeId(1)]);
        assert_eq!(net.stage_of(NodeId(2)), Some(1));
        assert_eq!(net.stage_of(NodeId(4)), Some(2));
        assert_eq!(net.stage_of(NodeId(5)), None);
        assert!(net.is_terminal(NodeId(3)));
        assert!(!net.is_terminal(NodeId(2)));
        assert_eq!(net.stage_nodes(2).collect::<Vec<_>>(), vec![NodeId(3), NodeId(4)]);
        assert_eq!(net.stage_nodes(7).count(), 0);
    }

    #[test]
    fn edge_lookup_by_endpoints() {
        let net = three_stage();
        let edge = net.edge_between(NodeId(2), NodeId(4)).unwrap();
        assert_eq!(edge.probability, 0.75);
        assert_eq!(edge.distance, 80.0);
        assert!(net.edge_between(NodeId(4), NodeId(2)).is_none());

        let mut parents: Vec<_> = net.predecessors(NodeId(2)).collect();
        parents.sort();
        assert_eq!(parents, vec![NodeId(0), NodeId(1)]);
    }

    #[test]
    fn zero_probability_entries_are_not_edges() {
        let net = SupplyNetwork::new(
            vec![0, 1],
            vec![FlowEdge::new(0, 1, 0.0, 10.0)],
        )
        .unwrap();
        assert_eq!(net.edge_count(), 0);
        assert!(net.edge_between(NodeId(0), NodeId(1)).is_none());
    }

    #[test]
    fn dense_matrices_are_sparsified() {
        let flow = vec![
            vec![0.0, 0.0, 0.6],
            vec![0.0, 0.0, 0.4],
            vec![0.0, 0.0, 0.0],
        ];
        let distance = vec![
            vec![0.0, 0.0, 630.0],
            vec![0.0, 0.0, 1260.0],
            vec![0.0, 0.0, 0.0],
        ];
        let net = SupplyNetwork::from_dense(vec![1, 2], &flow, &distance).unwrap();
        assert_eq!(net.edge_count(), 2);
        assert_eq!(net.edge_between(NodeId(1), NodeId(2)).unwrap().distance, 1260.0);
    }

    #[test]
    fn rejects_cycles_and_bad_entries() {
        let cyclic = SupplyNetwork::new(
            vec![0, 2],
            vec![
                FlowEdge::new(0, 1, 1.0, 1.0),
                FlowEdge::new(1, 2, 1.0, 1.0),
                FlowEdge::new(2, 1, 1.0, 1.0),
            ],
        );
        assert!(matches!(cyclic, Err(TraceError::Validation(_))));

        let out_of_range = SupplyNetwork::new(vec![0, 1], vec![FlowEdge::new(0, 9, 1.0, 1.0)]);
        assert!(matches!(out_of_range, Err(TraceError::Validation(_))));

        let bad_prob = SupplyNetwork::new(vec![0, 1], vec![FlowEdge::new(0, 1, 1.5, 1.0)]);
        assert!(matches!(bad_prob, Err(TraceError::Validation(_))));

        let bad_stages = SupplyNetwork::new(vec![3, 3], Vec::new());
        assert!(matches!(bad_stages, Err(TraceError::Validation(_))));
    }

    #[test]
    fn topological_order_respects_edges() {
        let net = three_stage();
        let position: Vec<usize> = {
            let mut pos = vec![0; net.node_count()];
            for (i, n) in net.topological_order().iter().enumerate() {
                pos[n.index()] = i;
            }
            pos
        };
        for edge in net.edges() {
            assert!(position[edge.src.index()] < position[edge.dst.index()]);
        }
    }
}
