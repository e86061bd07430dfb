use ndarray::prelude::*;
use tracing::trace;

use crate::{AppError, AppResult};

/// Stack per-line embeddings into an `(lines, dims)` matrix.
#[tracing::instrument(name = "Converting embeddings", level = "debug", skip(embs))]
pub fn embeddings_to_ndarray(embs: &[Vec<f32>]) -> AppResult<Array2<f64>> {
    let rows = embs.len();
    let cols = embs.first().map_or(0, Vec::len);
    let mut arr: Array2<f64> = Array2::<f64>::zeros((rows, cols));
    trace!("Initialized ndarray with shape: {:?}", arr.dim());
    for (i, mut row) in arr.axis_iter_mut(Axis(0)).enumerate() {
        if embs[i].len() != cols {
            return Err(AppError::RaggedEmbeddings {
                index: i,
                expected: cols,
                found: embs[i].len(),
            });
        }
        for (val, src) in row.iter_mut().zip(&embs[i]) {
            *val = f64::from(*src);
        }
    }
    Ok(arr)
}
