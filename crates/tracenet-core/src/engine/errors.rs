//! Error types for traceback inference.

use thiserror::Error;

use crate::engine::network::NodeId;

/// Errors that can occur while validating inputs or running an estimator.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Variants split into two groups. Global failures abort the whole call:
/// [`DegenerateFeasibleSet`](Self::DegenerateFeasibleSet),
/// [`ZeroPosteriorMass`](Self::ZeroPosteriorMass), [`Cancelled`](Self::Cancelled)
/// and [`Validation`](Self::Validation). The remaining variants are local to one
/// candidate source; the orchestrator records them in
/// [`SourceFailure`](crate::engine::traceback::SourceFailure) and carries on.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    /// No stage-1 node reaches the required fraction of contaminated nodes.
    #[error(
        "no feasible source: no stage-1 node reaches {fraction} of the {contaminated} contaminated nodes"
    )]
    DegenerateFeasibleSet { fraction: f64, contaminated: usize },

    /// The feasible set is non-empty but every source has zero likelihood.
    #[error("posterior mass is zero across all feasible sources")]
    ZeroPosteriorMass,

    /// The observation covariance for a source is not positive-definite.
    #[error("observation covariance is singular for source {node}")]
    SingularCovariance { node: NodeId },

    /// A path steps across a node pair that is not an edge of the network.
    #[error("no edge from node {from} to node {to}")]
    MissingEdge { from: NodeId, to: NodeId },

    /// The trajectory space of a source exceeds the configured enumeration limit.
    #[error("source {node} has {trajectories} diffusion trajectories, above the limit of {limit}")]
    CombinatorialOverflow {
        node: NodeId,
        trajectories: u128,
        limit: u128,
    },

    /// An enumeration observer asked the exact estimator to stop.
    #[error("enumeration cancelled while scoring source {node}")]
    Cancelled { node: NodeId },

    /// Malformed input (network, reports, prior or configuration).
    #[error("validation error: {0}")]
    Validation(String),

    /// Numerical stability error (NaN/Inf, invalid probabilities).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TraceError {
    /// Whether this failure can be confined to a single candidate source.
    pub fn is_source_local(&self) -> bool {
        matches!(
            self,
            TraceError::SingularCovariance { .. }
                | TraceError::MissingEdge { .. }
                | TraceError::CombinatorialOverflow { .. }
                | TraceError::Numerical(_)
        )
    }
}
