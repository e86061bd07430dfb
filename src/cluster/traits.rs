use ndarray::Array2;

use crate::AppResult;

/// Trait for grouping the rows of an embedding matrix.
pub trait Clusterer: Send + Sync {
    /// Cluster the given embeddings (one row per line).
    /// Returns clusters of row indices, largest first; rows in no cluster are left out.
    fn cluster(&self, embeddings: &Array2<f64>) -> AppResult<Vec<Vec<usize>>>;
}
