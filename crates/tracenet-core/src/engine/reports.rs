//! Contamination reports: `(node, detection time)` observations.
//!
//! A node may be reported more than once. Estimators differ in how they use
//! repeats: the exact estimator and the volume model treat every report as
//! its own observation, while the heuristic estimator collapses the reports of
//! a node into one representative time (earliest or mean).

use std::collections::BTreeMap;

use crate::engine::errors::TraceError;
use crate::engine::network::{NodeId, SupplyNetwork};

/// A single detection of contamination at a node.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContaminationReport {
    pub node: NodeId,
    /// Detection time in days.
    pub time: f64,
}

impl ContaminationReport {
    pub fn new(node: u32, time: f64) -> Self {
        Self {
            node: NodeId(node),
            time,
        }
    }
}

/// An ordered, non-empty collection of contamination reports.
#[derive(Debug, Clone, PartialEq)]
pub struct Reports {
    reports: Vec<ContaminationReport>,
    /// Report positions grouped by node, in node order.
    by_node: BTreeMap<NodeId, Vec<usize>>,
}

impl Reports {
    /// Validates and indexes the reports. Times must be finite.
    pub fn new(reports: Vec<ContaminationReport>) -> Result<Self, TraceError> {
        if reports.is_empty() {
            return Err(TraceError::Validation(
                "at least one contamination report is required".into(),
            ));
        }
        let mut by_node: BTreeMap<NodeId, Vec<usize>> = BTreeMap::new();
        for (i, report) in reports.iter().enumerate() {
            if !report.time.is_finite() {
                return Err(TraceError::Validation(format!(
                    "report {} at node {} has non-finite time {}",
                    i, report.node, report.time
                )));
            }
            by_node.entry(report.node).or_default().push(i);
        }
        Ok(Self { reports, by_node })
    }

    /// Builds reports from parallel node and time sequences.
    pub fn from_parallel(nodes: &[u32], times: &[f64]) -> Result<Self, TraceError> {
        if nodes.len() != times.len() {
            return Err(TraceError::Validation(format!(
                "got {} report nodes but {} report times",
                nodes.len(),
                times.len()
            )));
        }
        Self::new(
            nodes
                .iter()
                .zip(times)
                .map(|(&node, &time)| ContaminationReport::new(node, time))
                .collect(),
        )
    }

    /// Checks that every reported node exists in `network`.
    pub fn check_against(&self, network: &SupplyNetwork) -> Result<(), TraceError> {
        match self.by_node.keys().find(|n| !network.contains(**n)) {
            Some(node) => Err(TraceError::Validation(format!(
                "report references node {} outside the network of {} nodes",
                node,
                network.node_count()
            ))),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContaminationReport> + '_ {
        self.reports.iter()
    }

    pub fn as_slice(&self) -> &[ContaminationReport] {
        &self.reports
    }

    /// Detection times in report order.
    pub fn times(&self) -> Vec<f64> {
        self.reports.iter().map(|r| r.time).collect()
    }

    /// Distinct contaminated nodes, sorted.
    pub fn distinct_nodes(&self) -> Vec<NodeId> {
        self.by_node.keys().copied().collect()
    }

    pub fn distinct_count(&self) -> usize {
        self.by_node.len()
    }

    /// Number of reports at `node`.
    pub fn count_at(&self, node: NodeId) -> usize {
        self.by_node.get(&node).map_or(0, Vec::len)
    }

    /// Earliest detection time at `node`.
    pub fn min_time(&self, node: NodeId) -> Option<f64> {
        self.times_at(node).reduce(f64::min)
    }

    /// Mean detection time at `node`.
    pub fn mean_time(&self, node: NodeId) -> Option<f64> {
        let count = self.count_at(node);
        if count == 0 {
            return None;
        }
        Some(self.times_at(node).sum::<f64>() / count as f64)
    }

    fn times_at(&self, node: NodeId) -> impl Iterator<Item = f64> + '_ {
        self.by_node
            .get(&node)
            .into_iter()
            .flatten()
            .map(|&i| self.reports[i].time)
    }
}
