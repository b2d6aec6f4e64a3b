//! # Heuristic Estimators
//!
//! Instead of summing over every diffusion trajectory, pick one
//! representative path and one representative time per distinct contaminated
//! node and evaluate the travel-time model once per source.
//!
//! - [`PathRule::Bfs`]: shortest-distance path, earliest report time.
//! - [`PathRule::MaxP`]: most probable path, mean report time.

use tracing::debug;

use crate::engine::errors::TraceError;
use crate::engine::incidence::{EdgeList, IncidenceMatrix};
use crate::engine::network::{NodeId, SupplyNetwork};
use crate::engine::parallel::map_sources;
use crate::engine::paths::{most_probable_path, shortest_path, Path};
use crate::engine::reports::Reports;
use crate::engine::time_model::{GaussianTimeModel, TimeMode, TimeModelConfig};

/// How the representative path and time of a contaminated node are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PathRule {
    Bfs,
    MaxP,
}

impl PathRule {
    /// Representative path from `source` to `node`, or `None` if unreachable.
    pub fn path(self, network: &SupplyNetwork, source: NodeId, node: NodeId) -> Option<Path> {
        match self {
            PathRule::Bfs => shortest_path(network, source, node).map(|w| w.path),
            PathRule::MaxP => most_probable_path(network, source, node).map(|p| p.path),
        }
    }

    /// Representative report time at `node`.
    pub fn time(self, reports: &Reports, node: NodeId) -> Option<f64> {
        match self {
            PathRule::Bfs => reports.min_time(node),
            PathRule::MaxP => reports.mean_time(node),
        }
    }
}

/// Time evidence for one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicScore {
    pub log_likelihood: f64,
    /// `ts*`, present only in point-estimate mode for reachable sources.
    pub start_time: Option<f64>,
}

impl HeuristicScore {
    fn unreachable() -> Self {
        Self {
            log_likelihood: f64::NEG_INFINITY,
            start_time: None,
        }
    }
}

/// One-path-per-node travel-time estimator.
#[derive(Debug, Clone)]
pub struct HeuristicEstimator<'a> {
    network: &'a SupplyNetwork,
    edges: EdgeList,
    model: GaussianTimeModel,
    rule: PathRule,
    mode: TimeMode,
}

impl<'a> HeuristicEstimator<'a> {
    pub fn new(
        network: &'a SupplyNetwork,
        time_config: TimeModelConfig,
        rule: PathRule,
        mode: TimeMode,
    ) -> Result<Self, TraceError> {
        let edges = EdgeList::from_network(network);
        let model = GaussianTimeModel::new(&edges, time_config)?;
        Ok(Self {
            network,
            edges,
            model,
            rule,
            mode,
        })
    }

    pub fn rule(&self) -> PathRule {
        self.rule
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    /// Representative `(path, time)` per distinct reported node, in node order.
    ///
    /// `None` when `source` cannot reach one of the nodes.
    pub fn representatives(
        &self,
        source: NodeId,
        reports: &Reports,
    ) -> Option<Vec<(Path, f64)>> {
        reports
            .distinct_nodes()
            .into_iter()
            .map(|node| {
                let path = self.rule.path(self.network, source, node)?;
                let time = self.rule.time(reports, node)?;
                Some((path, time))
            })
            .collect()
    }

    pub fn score_source(
        &self,
        source: NodeId,
        reports: &Reports,
    ) -> Result<HeuristicScore, TraceError> {
        let Some(chosen) = self.representatives(source, reports) else {
            debug!(source = %source, rule = ?self.rule, "source cannot reach every reported node");
            return Ok(HeuristicScore::unreachable());
        };
        let c = IncidenceMatrix::build(chosen.iter().map(|(p, _)| p), &self.edges)?;
        let times: Vec<f64> = chosen.iter().map(|&(_, t)| t).collect();
        let (log_likelihood, start_time) = self.model.evaluate(self.mode, source, &c, &times)?;
        Ok(HeuristicScore {
            log_likelihood,
            start_time,
        })
    }

    /// Scores every source, in order.
    pub fn score_sources(
        &self,
        sources: &[NodeId],
        reports: &Reports,
    ) -> Vec<Result<HeuristicScore, TraceError>> {
        map_sources(sources, |s| self.score_source(s, reports))
    }
}
