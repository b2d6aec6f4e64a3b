//! Feasibility filtering of candidate sources.
//!
//! A stage-1 node is a feasible source when the contaminated nodes whose
//! ancestry traces back to it make up at least a fraction `P` of all distinct
//! contaminated nodes. Only feasible sources are scored by the estimators.

use std::collections::BTreeMap;

use crate::engine::errors::TraceError;
use crate::engine::network::{NodeId, SupplyNetwork};
use crate::engine::paths::root_ancestors;

/// Outcome of the feasibility filter.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibleSet {
    /// Feasible sources, sorted.
    pub sources: Vec<NodeId>,
    /// Number of distinct contaminated nodes each stage-1 node reaches.
    pub reach_counts: BTreeMap<NodeId, usize>,
    /// Minimum reach count a source needed.
    pub threshold: f64,
}

impl FeasibleSet {
    pub fn contains(&self, node: NodeId) -> bool {
        self.sources.binary_search(&node).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Computes the feasible sources for a set of distinct contaminated nodes.
///
/// `fraction` must be finite and positive. Values above 1 are accepted and
/// produce an empty set; turning that into
/// [`TraceError::DegenerateFeasibleSet`] is the caller's decision.
pub fn feasible_sources(
    network: &SupplyNetwork,
    contaminated: &[NodeId],
    fraction: f64,
) -> Result<FeasibleSet, TraceError> {
    if !fraction.is_finite() || fraction <= 0.0 {
        return Err(TraceError::Validation(format!(
            "feasibility fraction must be finite and > 0, got {}",
            fraction
        )));
    }

    let mut reach_counts: BTreeMap<NodeId, usize> =
        network.sources().into_iter().map(|s| (s, 0)).collect();
    for &node in contaminated {
        if !network.contains(node) {
            return Err(TraceError::Validation(format!(
                "contaminated node {} is outside the network",
                node
            )));
        }
        for root in root_ancestors(network, node) {
            if let Some(count) = reach_counts.get_mut(&root) {
                *count += 1;
            }
        }
    }

    // Compare the reached share rather than `count >= fraction * total`:
    // the product rounds up past integral counts (0.28 * 25 > 7).
    let total = contaminated.len() as f64;
    let threshold = fraction * total;
    let sources = reach_counts
        .iter()
        .filter(|(_, &count)| count > 0 && count as f64 / total >= fraction)
        .map(|(&node, _)| node)
        .collect();

    Ok(FeasibleSet {
        sources,
        reach_counts,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::network::FlowEdge;

    /// Sources 0, 1, 2; terminals 3, 4. Source 2 ships nowhere.
    fn network() -> SupplyNetwork {
        SupplyNetwork::new(
            vec![2, 4],
            vec![
                FlowEdge::new(0, 3, 0.5, 1.0),
                FlowEdge::new(0, 4, 0.5, 1.0),
                FlowEdge::new(1, 4, 1.0, 1.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn full_coverage_required_at_fraction_one() {
        let net = network();
        let set = feasible_sources(&net, &[NodeId(3), NodeId(4)], 1.0).unwrap();
        assert_eq!(set.sources, vec![NodeId(0)]);
        assert_eq!(set.reach_counts[&NodeId(1)], 1);
        assert_eq!(set.reach_counts[&NodeId(2)], 0);
    }

    #[test]
    fn partial_coverage_admits_more_sources() {
        let net = network();
        let set = feasible_sources(&net, &[NodeId(3), NodeId(4)], 0.5).unwrap();
        assert_eq!(set.sources, vec![NodeId(0), NodeId(1)]);
        assert!(!set.contains(NodeId(2)));
    }

    #[test]
    fn unreachable_fraction_gives_empty_set() {
        let net = network();
        let set = feasible_sources(&net, &[NodeId(3), NodeId(4)], 1.01).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn exact_share_meets_fraction() {
        // Source 0 reaches 2 of 3 terminals, source 1 reaches 1.
        let net = SupplyNetwork::new(
            vec![1, 4],
            vec![
                FlowEdge::new(0, 2, 0.5, 1.0),
                FlowEdge::new(0, 3, 0.5, 1.0),
                FlowEdge::new(1, 4, 1.0, 1.0),
            ],
        )
        .unwrap();
        let contaminated = [NodeId(2), NodeId(3), NodeId(4)];
        let set = feasible_sources(&net, &contaminated, 2.0 / 3.0).unwrap();
        assert_eq!(set.sources, vec![NodeId(0)]);
    }

    #[test]
    fn rejects_non_positive_fraction() {
        let net = network();
        assert!(feasible_sources(&net, &[NodeId(3)], 0.0).is_err());
        assert!(feasible_sources(&net, &[NodeId(3)], f64::NAN).is_err());
    }
}
