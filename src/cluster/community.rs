use ndarray::Array2;
use tracing::{debug, trace};

use crate::cluster::linalg::cosine_similarity_matrix;
use crate::cluster::traits::Clusterer;
use crate::{AppError, AppResult};

pub const DEFAULT_MIN_CLUSTER_SIZE: usize = 5;
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// Threshold community detection over cosine similarity.
///
/// Every line with at least `min_cluster_size` neighbours (itself included) at similarity
/// `>= threshold` seeds a candidate community. Neighbours join in order of decreasing
/// similarity to the seed, and only if they are within the threshold of every member that
/// joined before them, so each returned community is a clique at `threshold`. Overlaps are
/// then resolved greedily in favour of larger communities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommunityDetection {
    pub min_cluster_size: usize,
    pub threshold: f64,
}

impl Default for CommunityDetection {
    fn default() -> Self {
        Self {
            min_cluster_size: DEFAULT_MIN_CLUSTER_SIZE,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl CommunityDetection {
    pub fn new(min_cluster_size: usize, threshold: f64) -> Self {
        Self {
            min_cluster_size,
            threshold,
        }
    }

    fn candidate(&self, sim: &Array2<f64>, seed: usize) -> Option<Vec<usize>> {
        let n = sim.nrows();
        let min_size = self.min_cluster_size.max(1);

        if !has_direction(sim, seed) || sim[[seed, seed]] < self.threshold {
            return None;
        }
        let mut neighbours: Vec<usize> = (0..n)
            .filter(|&j| j != seed && has_direction(sim, j) && sim[[seed, j]] >= self.threshold)
            .collect();
        if neighbours.len() + 1 < min_size {
            return None;
        }
        neighbours.sort_by(|&a, &b| {
            sim[[seed, b]]
                .total_cmp(&sim[[seed, a]])
                .then(a.cmp(&b))
        });

        let mut community = vec![seed];
        for j in neighbours {
            if community.iter().all(|&m| sim[[m, j]] >= self.threshold) {
                community.push(j);
            }
        }
        (community.len() >= min_size).then_some(community)
    }

    /// Communities over a precomputed `(n, n)` cosine similarity matrix of row-normalized
    /// embeddings. Rows with zero self-similarity (zero vectors) are always outliers.
    pub fn communities(&self, sim: &Array2<f64>) -> Vec<Vec<usize>> {
        let n = sim.nrows();
        let min_size = self.min_cluster_size.max(1);
        if n < min_size {
            debug!("Only {n} lines, fewer than the minimum cluster size {min_size}");
            return Vec::new();
        }

        let mut candidates: Vec<Vec<usize>> =
            (0..n).filter_map(|i| self.candidate(sim, i)).collect();
        trace!("{} candidate communities", candidates.len());
        candidates.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut claimed = vec![false; n];
        let mut communities = Vec::new();
        for candidate in candidates {
            let unclaimed: Vec<usize> = candidate.into_iter().filter(|&m| !claimed[m]).collect();
            if unclaimed.len() >= min_size {
                for &m in &unclaimed {
                    claimed[m] = true;
                }
                communities.push(unclaimed);
            }
        }
        communities.sort_by(|a, b| b.len().cmp(&a.len()));
        communities
    }
}

/// Zero vectors normalize to zero and have no self-similarity; every other row has ~1.
fn has_direction(sim: &Array2<f64>, i: usize) -> bool {
    sim[[i, i]] > 0.0
}

impl Clusterer for CommunityDetection {
    #[tracing::instrument(name = "Detecting communities", level = "debug", skip(self, embeddings))]
    fn cluster(&self, embeddings: &Array2<f64>) -> AppResult<Vec<Vec<usize>>> {
        if !self.threshold.is_finite() {
            return Err(AppError::InvalidArgument(format!(
                "similarity threshold must be a finite number, got {}",
                self.threshold
            )));
        }
        let sim = cosine_similarity_matrix(embeddings);
        let communities = self.communities(&sim);
        debug!(
            "Found {} communities among {} lines",
            communities.len(),
            embeddings.nrows()
        );
        Ok(communities)
    }
}
