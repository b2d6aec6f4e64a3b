//! Edge-incidence matrices.
//!
//! For `O` observations and `K` enumerated edges, the incidence matrix `C` is
//! the `O x K` binary matrix with `C[o, k] = 1` iff edge `k` lies on the path
//! attributed to observation `o`. Rows are stored sparsely as sorted column
//! lists; [`IncidenceMatrix::to_dense`] materializes the full matrix.

use nalgebra::DMatrix;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::TraceError;
use crate::engine::network::{EdgeData, NodeId, SupplyNetwork};
use crate::engine::paths::Path;

/// Inline capacity for incidence rows; supply chains are a few stages deep.
const INLINE_ROW_SIZE: usize = 8;

/// Column indices of the edges on one observation's path.
pub type IncidenceRow = SmallVec<[usize; INLINE_ROW_SIZE]>;

/// The enumerated edges that index incidence-matrix columns.
#[derive(Debug, Clone)]
pub struct EdgeList {
    edges: Vec<EdgeData>,
    columns: FxHashMap<(NodeId, NodeId), usize>,
}

impl EdgeList {
    /// Enumerates the edges of `network`; column `k` is `EdgeId(k)`.
    pub fn from_network(network: &SupplyNetwork) -> Self {
        Self::new(network.edges().to_vec())
    }

    pub fn new(edges: Vec<EdgeData>) -> Self {
        let columns = edges
            .iter()
            .enumerate()
            .map(|(k, e)| ((e.src, e.dst), k))
            .collect();
        Self { edges, columns }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn edges(&self) -> &[EdgeData] {
        &self.edges
    }

    /// Column of the edge `from -> to`.
    pub fn column(&self, from: NodeId, to: NodeId) -> Option<usize> {
        self.columns.get(&(from, to)).copied()
    }

    /// Column indices of the edges along `path`.
    ///
    /// Fails with [`TraceError::MissingEdge`] on the first hop that is not in
    /// the list.
    pub fn path_columns(&self, path: &Path) -> Result<IncidenceRow, TraceError> {
        let mut row: IncidenceRow = path
            .hops()
            .map(|(from, to)| {
                self.column(from, to)
                    .ok_or(TraceError::MissingEdge { from, to })
            })
            .collect::<Result<_, _>>()?;
        row.sort_unstable();
        row.dedup();
        Ok(row)
    }
}

/// Binary `O x K` matrix of edges traversed per observation.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidenceMatrix {
    rows: Vec<IncidenceRow>,
    edge_count: usize,
}

impl IncidenceMatrix {
    /// Builds the matrix for one path per observation.
    pub fn build<'p>(
        paths: impl IntoIterator<Item = &'p Path>,
        edges: &EdgeList,
    ) -> Result<Self, TraceError> {
        let rows = paths
            .into_iter()
            .map(|p| edges.path_columns(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            rows,
            edge_count: edges.len(),
        })
    }

    /// Assembles a matrix from precomputed rows of sorted, unique columns.
    pub fn from_rows(rows: Vec<IncidenceRow>, edge_count: usize) -> Result<Self, TraceError> {
        for (o, row) in rows.iter().enumerate() {
            if row.iter().any(|&k| k >= edge_count) {
                return Err(TraceError::Internal(format!(
                    "incidence row {} references a column outside 0..{}",
                    o, edge_count
                )));
            }
            if row.windows(2).any(|w| w[0] >= w[1]) {
                return Err(TraceError::Internal(format!(
                    "incidence row {} is not sorted and unique",
                    o
                )));
            }
        }
        Ok(Self { rows, edge_count })
    }

    /// Number of observations `O`.
    pub fn observation_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of edge columns `K`.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn row(&self, observation: usize) -> &[usize] {
        &self.rows[observation]
    }

    pub fn rows(&self) -> &[IncidenceRow] {
        &self.rows
    }

    pub fn get(&self, observation: usize, edge: usize) -> bool {
        self.rows
            .get(observation)
            .is_some_and(|row| row.binary_search(&edge).is_ok())
    }

    /// `1ᵀ·C·log(p)`: log of the product of the chosen edges' probabilities,
    /// counted once per observation that traverses them.
    pub fn log_path_probability(&self, edges: &EdgeList) -> f64 {
        self.rows
            .iter()
            .flatten()
            .map(|&k| edges.edges[k].probability.ln())
            .sum()
    }

    /// The full `O x K` matrix of zeros and ones.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.rows.len(), self.edge_count);
        for (o, row) in self.rows.iter().enumerate() {
            for &k in row {
                dense[(o, k)] = 1.0;
            }
        }
        dense
    }
}
