//! In-memory nearest-neighbour index over embedded lines.

use ndarray::prelude::*;
use tracing::{debug, trace};

use crate::cluster::convert::embeddings_to_ndarray;
use crate::cluster::linalg::{cosine_distances, euclidean_distances};
use crate::embed::Embedder;
use crate::{AppError, AppResult};

/// Neighbours returned by [`VectorStore::query`] unless asked otherwise.
pub const DEFAULT_K: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Metric {
    /// `1 - cosine similarity`, in `[0, 2]`.
    #[default]
    Cosine,
    Euclidean,
}

/// Exact (brute force) k-nearest-neighbour search.
#[derive(Debug, Clone)]
pub struct NearestNeighbors {
    metric: Metric,
    points: Array2<f64>,
}

impl NearestNeighbors {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            points: Array2::zeros((0, 0)),
        }
    }

    /// Replace the indexed points.
    pub fn fit(&mut self, points: Array2<f64>) -> &mut Self {
        self.points = points;
        self
    }

    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Up to `k` `(row, distance)` pairs, nearest first, ties broken by row order.
    pub fn kneighbors(&self, query: ArrayView1<f64>, k: usize) -> AppResult<Vec<(usize, f64)>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.points.ncols() {
            return Err(AppError::InvalidArgument(format!(
                "query has {} dimensions but the index holds {}-dimensional vectors",
                query.len(),
                self.points.ncols()
            )));
        }

        let query = query.to_owned().insert_axis(Axis(0));
        let distances = match self.metric {
            Metric::Cosine => cosine_distances(&query, &self.points),
            Metric::Euclidean => euclidean_distances(&query, &self.points, false),
        };

        let mut ranked: Vec<(usize, f64)> = distances.row(0).iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        ranked.truncate(k);
        Ok(ranked)
    }
}

impl Default for NearestNeighbors {
    fn default() -> Self {
        Self::new(Metric::default())
    }
}

/// Texts, their embeddings, and an index over the embeddings. The three always have the
/// same length.
pub struct VectorStore<E> {
    embedder: E,
    texts: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    index: NearestNeighbors,
}

impl<E: Embedder> VectorStore<E> {
    pub fn new(embedder: E) -> Self {
        Self::with_metric(embedder, Metric::default())
    }

    pub fn with_metric(embedder: E, metric: Metric) -> Self {
        Self {
            embedder,
            texts: Vec::new(),
            embeddings: Vec::new(),
            index: NearestNeighbors::new(metric),
        }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// Embed and append `texts`, then rebuild the index over everything stored.
    /// On any error the store is left as it was.
    #[tracing::instrument(name = "Adding texts to the vector store", level = "debug", skip_all, fields(count = texts.len()))]
    pub async fn add(&mut self, texts: &[String]) -> AppResult<()> {
        if texts.is_empty() {
            return Ok(());
        }
        let new = self.embedder.embed(texts).await?;
        if new.len() != texts.len() {
            return Err(AppError::EmbeddingCount {
                expected: texts.len(),
                received: new.len(),
            });
        }

        let mut embeddings = self.embeddings.clone();
        embeddings.extend(new);
        let points = embeddings_to_ndarray(&embeddings)?;

        self.index.fit(points);
        self.embeddings = embeddings;
        self.texts.extend_from_slice(texts);
        debug!("Vector store now holds {} texts", self.texts.len());
        Ok(())
    }

    /// Stored texts nearest to `text`, nearest first. `k` is clamped to the store size;
    /// with a `distance_threshold`, only results at distance `<=` the threshold are kept.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        distance_threshold: Option<f64>,
    ) -> AppResult<Vec<String>> {
        Ok(self
            .query_with_distances(text, k, distance_threshold)
            .await?
            .into_iter()
            .map(|(text, _)| text)
            .collect())
    }

    #[tracing::instrument(name = "Querying the vector store", level = "debug", skip(self, text))]
    pub async fn query_with_distances(
        &self,
        text: &str,
        k: usize,
        distance_threshold: Option<f64>,
    ) -> AppResult<Vec<(String, f64)>> {
        let k = k.min(self.len());
        if k == 0 {
            return Ok(Vec::new());
        }

        let query = vec![text.to_string()];
        let embedded = self.embedder.embed(&query).await?;
        if embedded.len() != 1 {
            return Err(AppError::EmbeddingCount {
                expected: 1,
                received: embedded.len(),
            });
        }
        let vector: Array1<f64> = embedded[0].iter().copied().map(f64::from).collect();

        let neighbours = self.index.kneighbors(vector.view(), k)?;
        trace!("Nearest neighbours: {:?}", neighbours);
        Ok(neighbours
            .into_iter()
            .filter(|(_, distance)| distance_threshold.is_none_or(|t| *distance <= t))
            .map(|(i, distance)| (self.texts[i].clone(), distance))
            .collect())
    }
}
