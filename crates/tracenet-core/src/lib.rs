//! # Tracenet Core
//!
//! Source inference for contamination events spreading through multi-stage
//! supply-chain networks. Given a stage-partitioned flow network and a set of
//! `(node, detection time)` reports, [`traceback`] returns a posterior over the
//! first-stage nodes and, for point-estimate estimators, the most likely start
//! time per source.
//!
//! ```
//! use tracenet_core::{traceback, Estimator, FlowEdge, Reports, SupplyNetwork, TracebackConfig};
//!
//! let network = SupplyNetwork::new(
//!     vec![1, 2],
//!     vec![FlowEdge::new(0, 2, 0.6, 630.0), FlowEdge::new(1, 2, 0.4, 630.0)],
//! )?;
//! let reports = Reports::from_parallel(&[2], &[10.0])?;
//! let config = TracebackConfig::default().with_estimator(Estimator::Volume);
//! let result = traceback(&network, &[0.5, 0.5], &reports, &config)?;
//! assert!(result.posterior[0] > result.posterior[1]);
//! # Ok::<(), tracenet_core::TraceError>(())
//! ```

pub mod engine;

// Re-export commonly used types
pub use engine::errors::TraceError;
pub use engine::exact::{EnumerationObserver, EnumerationProgress, ExactEstimator, ExactMode};
pub use engine::heuristic::{HeuristicEstimator, PathRule};
pub use engine::network::{FlowEdge, NodeId, SupplyNetwork};
pub use engine::reports::{ContaminationReport, Reports};
pub use engine::time_model::{CovarianceFallback, TimeMode, TimeModelConfig};
pub use engine::traceback::{
    traceback, traceback_with_observer, trajectory_counts, Estimator, SourceFailure,
    TracebackConfig, TracebackResult,
};
