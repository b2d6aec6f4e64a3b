//! # Traceback Orchestrator
//!
//! Runs one of eleven estimator configurations end to end:
//!
//! 1. validate the configuration, prior and reports,
//! 2. filter feasible sources (fails with
//!    [`TraceError::DegenerateFeasibleSet`] when none qualify),
//! 3. score every feasible source with the selected evidence models,
//! 4. add the log prior and normalize over all stage-1 nodes.
//!
//! Infeasible sources get posterior exactly 0. A feasible source whose scoring
//! fails with a source-local error is recorded in
//! [`TracebackResult::failures`] and also gets posterior 0.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::engine::errors::TraceError;
use crate::engine::exact::{
    trajectory_space_size, EnumerationObserver, ExactEstimator, ExactMode, TracingObserver,
    DEFAULT_PROGRESS_INTERVAL,
};
use crate::engine::feasibility::feasible_sources;
use crate::engine::heuristic::{HeuristicEstimator, PathRule};
use crate::engine::network::{NodeId, SupplyNetwork};
use crate::engine::numeric::{normalize_log_weights, NORMALIZATION_EPSILON};
use crate::engine::reports::Reports;
use crate::engine::time_model::{TimeMode, TimeModelConfig};
use crate::engine::volume::volume_log_likelihoods;

/// Default feasibility fraction `P`.
pub const DEFAULT_FEASIBILITY_FRACTION: f64 = 1.0;

/// The eleven estimator configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Estimator {
    Volume,
    ExactTime,
    ExactTimeVolume,
    BfsTime,
    BfsTimePoint,
    BfsTimeVolume,
    BfsTimeVolumePoint,
    #[cfg_attr(feature = "serde", serde(rename = "maxp-time"))]
    MaxPTime,
    #[cfg_attr(feature = "serde", serde(rename = "maxp-time-point"))]
    MaxPTimePoint,
    #[cfg_attr(feature = "serde", serde(rename = "maxp-time-volume"))]
    MaxPTimeVolume,
    #[cfg_attr(feature = "serde", serde(rename = "maxp-time-volume-point"))]
    MaxPTimeVolumePoint,
}

/// Which evidence models an [`Estimator`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidencePlan {
    Volume,
    Exact(ExactMode),
    Heuristic {
        rule: PathRule,
        mode: TimeMode,
        with_volume: bool,
    },
}

impl Estimator {
    pub const ALL: [Estimator; 11] = [
        Estimator::Volume,
        Estimator::ExactTime,
        Estimator::ExactTimeVolume,
        Estimator::BfsTime,
        Estimator::BfsTimePoint,
        Estimator::BfsTimeVolume,
        Estimator::BfsTimeVolumePoint,
        Estimator::MaxPTime,
        Estimator::MaxPTimePoint,
        Estimator::MaxPTimeVolume,
        Estimator::MaxPTimeVolumePoint,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Estimator::Volume => "volume",
            Estimator::ExactTime => "exact-time",
            Estimator::ExactTimeVolume => "exact-time-volume",
            Estimator::BfsTime => "bfs-time",
            Estimator::BfsTimePoint => "bfs-time-point",
            Estimator::BfsTimeVolume => "bfs-time-volume",
            Estimator::BfsTimeVolumePoint => "bfs-time-volume-point",
            Estimator::MaxPTime => "maxp-time",
            Estimator::MaxPTimePoint => "maxp-time-point",
            Estimator::MaxPTimeVolume => "maxp-time-volume",
            Estimator::MaxPTimeVolumePoint => "maxp-time-volume-point",
        }
    }

    pub fn plan(self) -> EvidencePlan {
        use EvidencePlan::Heuristic;
        let heuristic = |rule, mode, with_volume| Heuristic {
            rule,
            mode,
            with_volume,
        };
        match self {
            Estimator::Volume => EvidencePlan::Volume,
            Estimator::ExactTime => EvidencePlan::Exact(ExactMode::TimeOnly),
            Estimator::ExactTimeVolume => EvidencePlan::Exact(ExactMode::TimeAndVolume),
            Estimator::BfsTime => heuristic(PathRule::Bfs, TimeMode::Integrated, false),
            Estimator::BfsTimePoint => heuristic(PathRule::Bfs, TimeMode::PointEstimate, false),
            Estimator::BfsTimeVolume => heuristic(PathRule::Bfs, TimeMode::Integrated, true),
            Estimator::BfsTimeVolumePoint => {
                heuristic(PathRule::Bfs, TimeMode::PointEstimate, true)
            }
            Estimator::MaxPTime => heuristic(PathRule::MaxP, TimeMode::Integrated, false),
            Estimator::MaxPTimePoint => heuristic(PathRule::MaxP, TimeMode::PointEstimate, false),
            Estimator::MaxPTimeVolume => heuristic(PathRule::MaxP, TimeMode::Integrated, true),
            Estimator::MaxPTimeVolumePoint => {
                heuristic(PathRule::MaxP, TimeMode::PointEstimate, true)
            }
        }
    }

    /// Whether the estimator produces a start-time estimate per source.
    pub fn yields_start_time(self) -> bool {
        matches!(
            self.plan(),
            EvidencePlan::Heuristic {
                mode: TimeMode::PointEstimate,
                ..
            }
        )
    }

    /// Whether the estimator enumerates the full trajectory space.
    pub fn is_exact(self) -> bool {
        matches!(self.plan(), EvidencePlan::Exact(_))
    }
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Estimator {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Estimator::ALL
            .into_iter()
            .find(|e| e.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TraceError::Validation(format!("unknown estimator '{}'", s)))
    }
}

/// Configuration for [`traceback`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TracebackConfig {
    pub estimator: Estimator,
    /// Fraction `P` of distinct contaminated nodes a source must reach.
    pub feasibility_fraction: f64,
    pub time_model: TimeModelConfig,
    /// Per-source trajectory limit for exact estimators (`None`: unbounded).
    pub max_trajectories: Option<u128>,
    /// Trajectories between enumeration progress callbacks.
    pub progress_interval: u64,
}

impl Default for TracebackConfig {
    fn default() -> Self {
        Self {
            estimator: Estimator::MaxPTimeVolumePoint,
            feasibility_fraction: DEFAULT_FEASIBILITY_FRACTION,
            time_model: TimeModelConfig::default(),
            max_trajectories: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl TracebackConfig {
    pub fn with_estimator(mut self, estimator: Estimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_feasibility_fraction(mut self, fraction: f64) -> Self {
        self.feasibility_fraction = fraction;
        self
    }

    pub fn validate(self) -> Result<Self, TraceError> {
        if !self.feasibility_fraction.is_finite() || self.feasibility_fraction <= 0.0 {
            return Err(TraceError::Validation(format!(
                "feasibility_fraction must be finite and > 0, got {}",
                self.feasibility_fraction
            )));
        }
        if self.progress_interval == 0 {
            return Err(TraceError::Validation(
                "progress_interval must be at least 1".into(),
            ));
        }
        self.time_model.validate()?;
        Ok(self)
    }
}

/// A feasible source that could not be scored.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFailure {
    pub source: NodeId,
    pub error: TraceError,
}

/// Posterior over stage-1 nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct TracebackResult {
    pub estimator: Estimator,
    /// Posterior probability per stage-1 node, indexed by node.
    pub posterior: Vec<f64>,
    /// `ts*` per stage-1 node; `None` where undefined.
    pub start_times: Vec<Option<f64>>,
    /// Sorted feasible sources.
    pub feasible: Vec<NodeId>,
    pub failures: Vec<SourceFailure>,
}

impl TracebackResult {
    /// Sources by descending posterior; equal posteriors keep node order.
    pub fn ranked(&self) -> Vec<(NodeId, f64)> {
        let mut ranked: Vec<(NodeId, f64)> = self
            .posterior
            .iter()
            .enumerate()
            .map(|(i, &p)| (NodeId(i as u32), p))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }

    pub fn most_likely_source(&self) -> Option<NodeId> {
        self.ranked().first().map(|&(node, _)| node)
    }

    pub fn probability(&self, source: NodeId) -> f64 {
        self.posterior.get(source.index()).copied().unwrap_or(0.0)
    }

    pub fn start_time(&self, source: NodeId) -> Option<f64> {
        self.start_times.get(source.index()).copied().flatten()
    }
}

/// Runs a traceback with the default tracing progress observer.
pub fn traceback(
    network: &SupplyNetwork,
    prior: &[f64],
    reports: &Reports,
    config: &TracebackConfig,
) -> Result<TracebackResult, TraceError> {
    traceback_with_observer(network, prior, reports, config, &TracingObserver)
}

/// Runs a traceback, reporting exact-enumeration progress to `observer`.
pub fn traceback_with_observer(
    network: &SupplyNetwork,
    prior: &[f64],
    reports: &Reports,
    config: &TracebackConfig,
    observer: &dyn EnumerationObserver,
) -> Result<TracebackResult, TraceError> {
    let config = config.validate()?;
    validate_prior(network, prior)?;
    reports.check_against(network)?;

    let contaminated = reports.distinct_nodes();
    let feasible = feasible_sources(network, &contaminated, config.feasibility_fraction)?;
    if feasible.is_empty() {
        return Err(TraceError::DegenerateFeasibleSet {
            fraction: config.feasibility_fraction,
            contaminated: contaminated.len(),
        });
    }
    debug!(
        estimator = %config.estimator,
        feasible = feasible.sources.len(),
        contaminated = contaminated.len(),
        reports = reports.len(),
        "feasibility filter done"
    );

    let scores = score_sources(network, &feasible.sources, reports, &config, observer)?;

    let source_count = network.source_count();
    let mut log_weights = vec![f64::NEG_INFINITY; source_count];
    let mut start_times = vec![None; source_count];
    let mut failures = Vec::new();
    for (&source, score) in feasible.sources.iter().zip(scores) {
        let outcome = score.and_then(|(ll, ts)| {
            if ll.is_nan() {
                Err(TraceError::Numerical(format!(
                    "log-likelihood is NaN for source {}",
                    source
                )))
            } else {
                Ok((ll, ts))
            }
        });
        match outcome {
            Ok((ll, ts)) => {
                log_weights[source.index()] = ll + prior[source.index()].ln();
                start_times[source.index()] = ts;
            }
            Err(error) if error.is_source_local() => {
                warn!(source = %source, error = %error, "excluding source from posterior");
                failures.push(SourceFailure { source, error });
            }
            Err(error) => return Err(error),
        }
    }

    let posterior = normalize_log_weights(&log_weights).ok_or(TraceError::ZeroPosteriorMass)?;
    debug!(failures = failures.len(), "posterior normalized");

    Ok(TracebackResult {
        estimator: config.estimator,
        posterior,
        start_times,
        feasible: feasible.sources,
        failures,
    })
}

type SourceScore = Result<(f64, Option<f64>), TraceError>;

/// Log-likelihood and optional `ts*` per source, in order.
///
/// The outer error aborts the call; inner errors belong to one source.
fn score_sources(
    network: &SupplyNetwork,
    sources: &[NodeId],
    reports: &Reports,
    config: &TracebackConfig,
    observer: &dyn EnumerationObserver,
) -> Result<Vec<SourceScore>, TraceError> {
    let scores = match config.estimator.plan() {
        EvidencePlan::Volume => volume_log_likelihoods(network, sources, reports)
            .into_iter()
            .map(|ll| Ok((ll, None)))
            .collect(),
        EvidencePlan::Exact(mode) => ExactEstimator::new(network, config.time_model, mode)?
            .with_trajectory_limit(config.max_trajectories)
            .with_observer(observer, config.progress_interval)
            .score_sources(sources, reports)
            .into_iter()
            .map(|r| r.map(|ll| (ll, None)))
            .collect(),
        EvidencePlan::Heuristic {
            rule,
            mode,
            with_volume,
        } => {
            let time = HeuristicEstimator::new(network, config.time_model, rule, mode)?
                .score_sources(sources, reports);
            let volume = if with_volume {
                volume_log_likelihoods(network, sources, reports)
            } else {
                vec![0.0; sources.len()]
            };
            time.into_iter()
                .zip(volume)
                .map(|(score, v)| score.map(|s| (s.log_likelihood + v, s.start_time)))
                .collect()
        }
    };
    Ok(scores)
}

fn validate_prior(network: &SupplyNetwork, prior: &[f64]) -> Result<(), TraceError> {
    if prior.len() != network.source_count() {
        return Err(TraceError::Validation(format!(
            "prior has {} entries but the network has {} stage-1 nodes",
            prior.len(),
            network.source_count()
        )));
    }
    if let Some((i, p)) = prior
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || **p < 0.0)
    {
        return Err(TraceError::Validation(format!(
            "prior entry {} is not a finite non-negative number: {}",
            i, p
        )));
    }
    let total: f64 = prior.iter().sum();
    if (total - 1.0).abs() > NORMALIZATION_EPSILON {
        warn!(total, "prior does not sum to 1; the posterior is normalized regardless");
    }
    Ok(())
}

/// Trajectory-space size of every feasible source, for sizing exact runs.
pub fn trajectory_counts(
    network: &SupplyNetwork,
    reports: &Reports,
    feasibility_fraction: f64,
) -> Result<Vec<(NodeId, u128)>, TraceError> {
    reports.check_against(network)?;
    let feasible = feasible_sources(network, &reports.distinct_nodes(), feasibility_fraction)?;
    Ok(feasible
        .sources
        .into_iter()
        .map(|s| (s, trajectory_space_size(network, s, reports)))
        .collect())
}
