pub mod community;
pub(crate) mod convert;
pub(crate) mod linalg;
pub mod traits;

use std::collections::HashSet;

use tracing::{info, warn};

use crate::embed::Embedder;
use crate::text::strip_site;
use crate::{AppError, AppResult};
pub use community::CommunityDetection;
pub use traits::Clusterer;

/// Lines of a batch of documents, their embeddings, and the clusters found among them.
#[derive(Debug, Clone)]
pub struct ClusteredLines {
    pub lines: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    /// Indices into `lines`, largest cluster first.
    pub clusters: Vec<Vec<usize>>,
}

impl ClusteredLines {
    pub fn top_keywords(&self, num_clusters: usize, num_terms: usize) -> Vec<Vec<String>> {
        top_keywords(&self.clusters, &self.lines, num_clusters, num_terms)
    }
}

#[derive(Debug, Clone)]
pub enum ClusterOutcome {
    /// The documents held no visible text.
    NoContent,
    Clustered(ClusteredLines),
}

/// Clustering engine: normalizes documents into lines, embeds them in one batch and hands
/// the matrix to a [`Clusterer`].
pub struct SiteClusterer<E, C> {
    embedder: E,
    clusterer: C,
}

impl<E: Embedder, C: Clusterer> SiteClusterer<E, C> {
    pub fn new(embedder: E, clusterer: C) -> Self {
        Self {
            embedder,
            clusterer,
        }
    }

    #[tracing::instrument(
        name = "Clustering site contents",
        level = "info",
        skip_all,
        fields(documents = documents.len())
    )]
    pub async fn cluster_sites<S: AsRef<str>>(&self, documents: &[S]) -> AppResult<ClusterOutcome> {
        let lines: Vec<String> = documents
            .iter()
            .flat_map(|doc| strip_site(doc.as_ref(), true))
            .collect();
        if lines.is_empty() {
            warn!("No text content found in the given sites");
            return Ok(ClusterOutcome::NoContent);
        }

        let embeddings = self.embedder.embed(&lines).await?;
        if embeddings.len() != lines.len() {
            return Err(AppError::EmbeddingCount {
                expected: lines.len(),
                received: embeddings.len(),
            });
        }

        let matrix = convert::embeddings_to_ndarray(&embeddings)?;
        let clusters = self.clusterer.cluster(&matrix)?;
        info!(
            "Grouped {} lines into {} clusters",
            lines.len(),
            clusters.len()
        );

        Ok(ClusterOutcome::Clustered(ClusteredLines {
            lines,
            embeddings,
            clusters,
        }))
    }
}

/// Representative lines of the first `num_clusters` clusters: up to `num_terms` distinct
/// lines each, in member order.
pub fn top_keywords(
    clusters: &[Vec<usize>],
    lines: &[String],
    num_clusters: usize,
    num_terms: usize,
) -> Vec<Vec<String>> {
    clusters
        .iter()
        .take(num_clusters)
        .map(|members| {
            let mut seen = HashSet::new();
            let mut terms = Vec::with_capacity(num_terms);
            for line in members.iter().filter_map(|&i| lines.get(i)) {
                if terms.len() >= num_terms {
                    break;
                }
                if seen.insert(line.as_str()) {
                    terms.push(line.clone());
                }
            }
            terms
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::WordHashEmbedder;

    fn page(body: &str) -> String {
        format!("<html><body>{body}</body></html>")
    }

    #[tokio::test]
    async fn duplicates_cluster_and_outlier_does_not() {
        let body = [
            "<p>buy cheap red shoes</p>",
            "<p>buy cheap red shoes now</p>",
            "<p>buy cheap red shoes today</p>",
            "<p>cats weather</p>",
        ]
        .concat();
        let docs = vec![page(&body), page(&body)];

        let engine = SiteClusterer::new(WordHashEmbedder::default(), CommunityDetection::default());
        let ClusterOutcome::Clustered(result) = engine.cluster_sites(&docs).await.unwrap() else {
            panic!("expected clusters");
        };

        assert_eq!(result.lines.len(), 8);
        assert_eq!(result.embeddings.len(), 8);
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].len(), 6);
        for &i in &result.clusters[0] {
            assert!(result.lines[i].starts_with("buy cheap red shoes"));
        }
    }

    #[tokio::test]
    async fn small_batch_with_singleton_clusters() {
        let docs = vec![
            page("Buy shoes now"),
            page("Buy shoes now"),
            page("Totally different topic"),
        ];
        let engine = SiteClusterer::new(WordHashEmbedder::default(), CommunityDetection::new(1, 0.75));
        let ClusterOutcome::Clustered(result) = engine.cluster_sites(&docs).await.unwrap() else {
            panic!("expected clusters");
        };

        assert_eq!(result.clusters.len(), 2);
        let top = &result.clusters[0];
        assert_eq!(result.lines[top[0]], "Buy shoes now");
        assert_eq!(result.lines[top[1]], "Buy shoes now");
        assert_eq!(result.lines[result.clusters[1][0]], "Totally different topic");
    }

    #[tokio::test]
    async fn empty_documents_have_no_content() {
        let embedder = WordHashEmbedder::default();
        let engine = SiteClusterer::new(&embedder, CommunityDetection::default());
        let docs = vec![page(""), page("<script>var x = 1;</script>  ")];
        let outcome = engine.cluster_sites(&docs).await.unwrap();
        assert!(matches!(outcome, ClusterOutcome::NoContent));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn whole_batch_is_embedded_at_once() {
        let embedder = WordHashEmbedder::default();
        let engine = SiteClusterer::new(&embedder, CommunityDetection::default());
        let docs = vec![page("<p>one</p><p>two</p>"), page("<p>three</p>")];
        engine.cluster_sites(&docs).await.unwrap();
        assert_eq!(embedder.batch_sizes(), vec![3]);
    }

    #[test]
    fn top_keywords_dedupes_and_limits() {
        let lines: Vec<String> = ["a", "a", "b", "c", "d", "e", "f", "x", "y"]
            .into_iter()
            .map(String::from)
            .collect();
        let clusters = vec![vec![0, 1, 2, 3, 4, 5, 6], vec![7, 8], vec![1]];

        let keywords = top_keywords(&clusters, &lines, 2, 3);
        assert_eq!(
            keywords,
            vec![
                vec!["a".to_string(), "b".to_string(), "c".to_string()],
                vec!["x".to_string(), "y".to_string()],
            ]
        );
        for terms in &keywords {
            assert!(terms.len() <= 3);
            let unique: HashSet<_> = terms.iter().collect();
            assert_eq!(unique.len(), terms.len());
        }
    }

    #[test]
    fn top_keywords_of_nothing_is_empty() {
        assert!(top_keywords(&[], &[], 5, 5).is_empty());
        assert_eq!(top_keywords(&[vec![0]], &["z".to_string()], 5, 0), vec![Vec::<String>::new()]);
    }
}
