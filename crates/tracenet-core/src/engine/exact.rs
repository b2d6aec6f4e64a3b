//! # Exact Estimator
//!
//! Scores a source by summing over every diffusion trajectory: one path per
//! report, drawn from all source-to-node paths. Repeated reports of the same
//! node each choose their own path. The trajectory space of a source is the
//! Cartesian product of the per-report path sets and is walked with a
//! mixed-radix odometer.
//!
//! For each trajectory the incidence matrix is assembled and the travel-time
//! model gives its start-time-integrated likelihood. In
//! [`ExactMode::TimeAndVolume`] it is additionally weighted by the product of
//! the flow probabilities of the chosen edges. The source's score is the sum
//! over trajectories.
//!
//! ## Complexity
//!
//! The trajectory count is `∏ paths(source, node_o)` over all `O` reports, so
//! the running time is exponential in the number of reports and in network
//! depth. Only small or sparse networks are tractable. The count is available
//! up front through [`ExactEstimator::trajectory_count`]; an optional limit
//! turns oversized sources into [`TraceError::CombinatorialOverflow`], and an
//! [`EnumerationObserver`] can watch progress and cancel.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, trace};

use crate::engine::errors::TraceError;
use crate::engine::incidence::{EdgeList, IncidenceMatrix, IncidenceRow};
use crate::engine::network::{NodeId, SupplyNetwork};
use crate::engine::numeric::LogSumExp;
use crate::engine::parallel::map_sources;
use crate::engine::paths::{all_paths_between, count_paths_between};
use crate::engine::reports::Reports;
use crate::engine::time_model::{GaussianTimeModel, TimeModelConfig};

/// Default number of trajectories between progress callbacks.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 100_000;

/// Which evidence the exact estimator combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExactMode {
    /// Travel-time likelihood only.
    TimeOnly,
    /// Travel-time likelihood weighted by trajectory flow probability.
    TimeAndVolume,
}

/// Snapshot passed to an [`EnumerationObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationProgress {
    pub source: NodeId,
    /// Trajectories scored so far for this source.
    pub visited: u128,
    /// Size of this source's trajectory space.
    pub total: u128,
}

/// Progress and cancellation hook for trajectory enumeration.
///
/// Called from worker threads when the `parallel` feature is enabled. A
/// single `Break` is enough: the estimator then stops every source, including
/// those already running on other workers.
pub trait EnumerationObserver: Sync {
    /// Return `ControlFlow::Break(())` to abort the traceback.
    fn on_progress(&self, progress: EnumerationProgress) -> ControlFlow<()>;
}

impl<F> EnumerationObserver for F
where
    F: Fn(EnumerationProgress) -> ControlFlow<()> + Sync,
{
    fn on_progress(&self, progress: EnumerationProgress) -> ControlFlow<()> {
        self(progress)
    }
}

/// Logs progress at trace level and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EnumerationObserver for TracingObserver {
    fn on_progress(&self, progress: EnumerationProgress) -> ControlFlow<()> {
        trace!(
            source = %progress.source,
            visited = %progress.visited,
            total = %progress.total,
            "enumerating diffusion trajectories"
        );
        ControlFlow::Continue(())
    }
}

/// Mixed-radix counter over per-observation path indices.
///
/// The last digit is least significant; digit `i` has place value
/// `∏ radices[i+1..]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrajectoryOdometer {
    radices: Vec<usize>,
    digits: Vec<usize>,
    exhausted: bool,
}

impl TrajectoryOdometer {
    /// Starts at all-zero digits. Any zero radix makes the space empty.
    pub fn new(radices: Vec<usize>) -> Self {
        let exhausted = radices.iter().any(|&r| r == 0);
        Self {
            digits: vec![0; radices.len()],
            radices,
            exhausted,
        }
    }

    /// Current digits, or `None` once every combination has been visited.
    pub fn digits(&self) -> Option<&[usize]> {
        (!self.exhausted).then_some(self.digits.as_slice())
    }

    /// Steps to the next combination; returns `false` after the last one.
    pub fn advance(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        for i in (0..self.digits.len()).rev() {
            self.digits[i] += 1;
            if self.digits[i] < self.radices[i] {
                return true;
            }
            self.digits[i] = 0;
        }
        self.exhausted = true;
        false
    }

    /// Place value of each digit, saturating at `u128::MAX`.
    pub fn place_values(&self) -> Vec<u128> {
        let mut values = vec![1u128; self.radices.len()];
        for i in (0..self.radices.len().saturating_sub(1)).rev() {
            values[i] = values[i + 1].saturating_mul(self.radices[i + 1] as u128);
        }
        values
    }

    /// Number of combinations, saturating at `u128::MAX`.
    pub fn total(&self) -> u128 {
        self.radices
            .iter()
            .fold(1u128, |acc, &r| acc.saturating_mul(r as u128))
    }

    /// Jumps to the combination with linear `index`; `false` if out of range.
    pub fn seek(&mut self, index: u128) -> bool {
        if self.radices.iter().any(|&r| r == 0) || index >= self.total() {
            self.exhausted = true;
            return false;
        }
        let places = self.place_values();
        let mut rest = index;
        for (digit, place) in self.digits.iter_mut().zip(places) {
            *digit = (rest / place) as usize;
            rest %= place;
        }
        self.exhausted = false;
        true
    }
}

/// Paths from one source to one contaminated node, pre-resolved to edge columns.
#[derive(Debug)]
struct NodePaths {
    rows: Vec<IncidenceRow>,
}

/// Exhaustive trajectory-sum estimator.
pub struct ExactEstimator<'a> {
    network: &'a SupplyNetwork,
    edges: EdgeList,
    model: GaussianTimeModel,
    mode: ExactMode,
    max_trajectories: Option<u128>,
    progress_interval: u64,
    observer: &'a dyn EnumerationObserver,
    cancelled: AtomicBool,
}

impl<'a> ExactEstimator<'a> {
    pub fn new(
        network: &'a SupplyNetwork,
        time_config: TimeModelConfig,
        mode: ExactMode,
    ) -> Result<Self, TraceError> {
        let edges = EdgeList::from_network(network);
        let model = GaussianTimeModel::new(&edges, time_config)?;
        Ok(Self {
            network,
            edges,
            model,
            mode,
            max_trajectories: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            observer: &TracingObserver,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Fails sources whose trajectory count exceeds `limit`.
    pub fn with_trajectory_limit(mut self, limit: Option<u128>) -> Self {
        self.max_trajectories = limit;
        self
    }

    /// Calls `observer` every `interval` trajectories (0 disables callbacks).
    pub fn with_observer(mut self, observer: &'a dyn EnumerationObserver, interval: u64) -> Self {
        self.observer = observer;
        self.progress_interval = interval;
        self
    }

    /// Whether an observer has cancelled enumeration on this estimator.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Size of the trajectory space of `source`, saturating at `u128::MAX`.
    pub fn trajectory_count(&self, source: NodeId, reports: &Reports) -> u128 {
        trajectory_space_size(self.network, source, reports)
    }

    /// Log of the summed trajectory likelihood for each source, in order.
    pub fn score_sources(
        &self,
        sources: &[NodeId],
        reports: &Reports,
    ) -> Vec<Result<f64, TraceError>> {
        map_sources(sources, |s| self.score_source(s, reports))
    }

    /// Log of the summed trajectory likelihood of `source`.
    ///
    /// Returns `NEG_INFINITY` when the source cannot reach a reported node.
    pub fn score_source(&self, source: NodeId, reports: &Reports) -> Result<f64, TraceError> {
        if self.is_cancelled() {
            return Err(TraceError::Cancelled { node: source });
        }
        let total = self.trajectory_count(source, reports);
        if let Some(limit) = self.max_trajectories {
            if total > limit {
                return Err(TraceError::CombinatorialOverflow {
                    node: source,
                    trajectories: total,
                    limit,
                });
            }
        }
        if total == 0 {
            debug!(source = %source, "source cannot reach every reported node");
            return Ok(f64::NEG_INFINITY);
        }
        debug!(source = %source, trajectories = %total, "enumerating trajectory space");

        let mut node_paths: BTreeMap<NodeId, NodePaths> = BTreeMap::new();
        for node in reports.distinct_nodes() {
            let rows = all_paths_between(self.network, source, node)
                .iter()
                .map(|p| self.edges.path_columns(p))
                .collect::<Result<Vec<_>, _>>()?;
            node_paths.insert(node, NodePaths { rows });
        }

        let choices: Vec<&NodePaths> = reports
            .iter()
            .map(|r| {
                node_paths.get(&r.node).ok_or_else(|| {
                    TraceError::Internal(format!("no path set for reported node {}", r.node))
                })
            })
            .collect::<Result<_, _>>()?;
        let times = reports.times();

        let mut odometer = TrajectoryOdometer::new(choices.iter().map(|c| c.rows.len()).collect());
        let mut sum = LogSumExp::default();
        let mut visited: u128 = 0;
        while let Some(digits) = odometer.digits() {
            if self.is_cancelled() {
                return Err(TraceError::Cancelled { node: source });
            }
            let rows = choices
                .iter()
                .zip(digits)
                .map(|(c, &d)| c.rows[d].clone())
                .collect();
            let c = IncidenceMatrix::from_rows(rows, self.edges.len())?;

            let mut log_term = self.model.integrated_log_likelihood(source, &c, &times)?;
            if self.mode == ExactMode::TimeAndVolume {
                log_term += c.log_path_probability(&self.edges);
            }
            if log_term.is_nan() {
                return Err(TraceError::Numerical(format!(
                    "trajectory likelihood is NaN for source {}",
                    source
                )));
            }
            sum.add(log_term);

            visited += 1;
            if self.progress_interval > 0 && visited % self.progress_interval as u128 == 0 {
                let progress = EnumerationProgress {
                    source,
                    visited,
                    total,
                };
                if self.observer.on_progress(progress).is_break() {
                    self.cancelled.store(true, Ordering::Relaxed);
                    return Err(TraceError::Cancelled { node: source });
                }
            }
            odometer.advance();
        }

        Ok(sum.value())
    }
}

/// `∏ paths(source, node)` over every report, saturating at `u128::MAX`.
pub fn trajectory_space_size(network: &SupplyNetwork, source: NodeId, reports: &Reports) -> u128 {
    let per_node: BTreeMap<NodeId, u128> = reports
        .distinct_nodes()
        .into_iter()
        .map(|node| (node, count_paths_between(network, source, node)))
        .collect();
    reports
        .iter()
        .fold(1u128, |acc, r| acc.saturating_mul(per_node[&r.node]))
}
