//! Per-source fan-out.
//!
//! Each candidate source is scored independently from shared, read-only
//! inputs, so the per-source loops map over the source list. With the
//! `parallel` feature the map runs on the rayon pool; results always come back
//! in source order, so both builds produce identical output.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::network::NodeId;

/// Applies `score` to every source, preserving order.
#[cfg(feature = "parallel")]
pub(crate) fn map_sources<T, F>(sources: &[NodeId], score: F) -> Vec<T>
where
    T: Send,
    F: Fn(NodeId) -> T + Sync + Send,
{
    sources.par_iter().map(|&s| score(s)).collect()
}

/// Sequential fallback.
#[cfg(not(feature = "parallel"))]
pub(crate) fn map_sources<T, F>(sources: &[NodeId], score: F) -> Vec<T>
where
    F: Fn(NodeId) -> T,
{
    sources.iter().map(|&s| score(s)).collect()
}
