use ndarray::prelude::*;
use ndarray::{OwnedRepr, RemoveAxis};

pub fn row_norms<D>(
    x: &ArrayBase<OwnedRepr<f64>, D>,
    squared: bool,
) -> ArrayBase<OwnedRepr<f64>, D::Smaller>
where
    D: Dimension + RemoveAxis,
{
    let prod: ArrayBase<OwnedRepr<f64>, D> = x * x;
    let sum: ArrayBase<OwnedRepr<f64>, D::Smaller> = prod.sum_axis(Axis(1));
    if !squared { sum.sqrt() } else { sum }
}

/// Scale every row to unit length. All-zero rows stay zero.
#[tracing::instrument(name = "Normalizing embeddings", level = "debug", skip(data))]
pub fn normalize_rows(mut data: Array2<f64>) -> Array2<f64> {
    let norms = row_norms(&data, false);
    for (mut row, norm) in data.axis_iter_mut(Axis(0)).zip(norms.iter()) {
        if *norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    data
}

/// Pairwise cosine similarities between rows, `(n, n)`.
pub fn cosine_similarity_matrix(data: &Array2<f64>) -> Array2<f64> {
    let unit = normalize_rows(data.clone());
    unit.dot(&unit.t())
}

/// Euclidean distances between the rows of `a` and the rows of `b`, `(n_a, n_b)`.
pub fn euclidean_distances(a: &Array2<f64>, b: &Array2<f64>, squared: bool) -> Array2<f64> {
    let aa = row_norms(a, true).insert_axis(Axis(1));
    let bb = row_norms(b, true).insert_axis(Axis(0));
    let mut distances: Array2<f64> = -2.0 * a.dot(&b.t());
    distances += &aa;
    distances += &bb;
    distances.mapv_inplace(|d| if d > 0.0 { d } else { 0.0 });
    if !squared {
        distances.mapv_inplace(|d| d.sqrt());
    }
    distances
}

/// `1 - cosine similarity` between the rows of `a` and the rows of `b`, `(n_a, n_b)`.
/// A zero row is at distance 1 from everything.
pub fn cosine_distances(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let a = normalize_rows(a.clone());
    let b = normalize_rows(b.clone());
    let mut distances = a.dot(&b.t());
    distances.mapv_inplace(|sim| (1.0 - sim).clamp(0.0, 2.0));
    distances
}
