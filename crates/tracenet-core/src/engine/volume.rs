//! Volume evidence: how much of a source's output reaches each observed node.
//!
//! Treating the flow matrix as a Markov chain whose terminal-stage nodes are
//! absorbing, `A = (I − Q)⁻¹·R` gives the probability mass that leaves a
//! source and is absorbed at each terminal node, summed over every path. The
//! network is acyclic, so the same quantity is obtained by pushing mass
//! forward from the source in topological order; that sparse propagation is
//! what the estimators use. For a non-terminal node the propagated mass is its
//! expected visitation from the source, the matching entry of `(I − Q)⁻¹`.
//!
//! The volume likelihood of a source is the product of the reached mass over
//! every report, repeated reports included.

use nalgebra::DMatrix;

use crate::engine::errors::TraceError;
use crate::engine::network::{NodeId, SupplyNetwork};
use crate::engine::parallel::map_sources;
use crate::engine::reports::Reports;

/// Mass reaching every node from `source`, indexed by node.
pub fn reach_probabilities(network: &SupplyNetwork, source: NodeId) -> Vec<f64> {
    let mut mass = vec![0.0; network.node_count()];
    if !network.contains(source) {
        return mass;
    }
    mass[source.index()] = 1.0;
    for &node in network.topological_order() {
        let here = mass[node.index()];
        if here == 0.0 {
            continue;
        }
        for edge in network.outgoing(node) {
            mass[edge.dst.index()] += here * edge.probability;
        }
    }
    mass
}

/// Log volume likelihood of `source`: `Σ ln A[source, node]` over all reports.
pub fn volume_log_likelihood(network: &SupplyNetwork, source: NodeId, reports: &Reports) -> f64 {
    let reach = reach_probabilities(network, source);
    reports
        .iter()
        .map(|r| reach.get(r.node.index()).copied().unwrap_or(0.0).ln())
        .sum()
}

/// Log volume likelihood for each of `sources`, in order.
pub fn volume_log_likelihoods(
    network: &SupplyNetwork,
    sources: &[NodeId],
    reports: &Reports,
) -> Vec<f64> {
    map_sources(sources, |s| volume_log_likelihood(network, s, reports))
}

/// Volume likelihood for each of `sources`, in order.
pub fn exact_volume_component(
    network: &SupplyNetwork,
    sources: &[NodeId],
    reports: &Reports,
) -> Vec<f64> {
    map_sources(sources, |s| {
        let reach = reach_probabilities(network, s);
        reports
            .iter()
            .map(|r| reach.get(r.node.index()).copied().unwrap_or(0.0))
            .product::<f64>()
    })
}

/// Dense absorption probabilities `(I − Q)⁻¹·R`.
#[derive(Debug, Clone)]
pub struct AbsorptionMatrix {
    /// Row labels: the non-terminal nodes.
    pub transient: Vec<NodeId>,
    /// Column labels: the terminal-stage nodes.
    pub absorbing: Vec<NodeId>,
    pub values: DMatrix<f64>,
}

impl AbsorptionMatrix {
    /// Absorption probability from `from` into terminal node `to`.
    pub fn get(&self, from: NodeId, to: NodeId) -> Option<f64> {
        let i = self.transient.binary_search(&from).ok()?;
        let j = self.absorbing.binary_search(&to).ok()?;
        Some(self.values[(i, j)])
    }
}

/// Computes the fundamental-matrix form with a dense LU solve.
///
/// Quadratic in the number of nodes; intended for small networks and for
/// cross-checking [`reach_probabilities`].
pub fn absorption_matrix(network: &SupplyNetwork) -> Result<AbsorptionMatrix, TraceError> {
    let last_stage = network.stage_count() - 1;
    let transient: Vec<NodeId> = (0..last_stage)
        .flat_map(|s| network.stage_nodes(s))
        .collect();
    let absorbing: Vec<NodeId> = network.stage_nodes(last_stage).collect();
    let t = transient.len();

    let mut i_minus_q = DMatrix::<f64>::identity(t, t);
    let mut r = DMatrix::<f64>::zeros(t, absorbing.len());
    for edge in network.edges() {
        let row = edge.src.index();
        if row >= t {
            continue;
        }
        let col = edge.dst.index();
        if col < t {
            i_minus_q[(row, col)] -= edge.probability;
        } else {
            r[(row, col - t)] += edge.probability;
        }
    }

    let values = i_minus_q.lu().solve(&r).ok_or_else(|| {
        TraceError::Numerical("I - Q is singular; the transient chain does not drain".into())
    })?;
    Ok(AbsorptionMatrix {
        transient,
        absorbing,
        values,
    })
}
