#[cfg(feature = "local-ml")]
pub mod local;
pub mod remote;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{Instrument, Span, debug, info_span};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

use crate::{AppError, AppResult};

/// Lines per embedding request unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 25;

/// Trait for converting lines of text into vector embeddings.
pub trait Embedder: Send + Sync {
    /// Embed a batch of lines. On success the result has one vector per line, in input order.
    fn embed<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>>;
}

impl<T: Embedder + ?Sized> Embedder for &T {
    fn embed<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        (**self).embed(lines)
    }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn embed<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        (**self).embed(lines)
    }
}

/// Splits a batch into fixed-size chunks and embeds them one after another.
///
/// Either every line gets a vector or the whole call fails: a failing chunk surfaces as
/// [`AppError::ChunkFailed`], a chunk answered with the wrong number of vectors as
/// [`AppError::EmbeddingCount`].
pub struct Chunked<E> {
    inner: E,
    chunk_size: usize,
}

impl<E: Embedder> Chunked<E> {
    pub fn new(inner: E, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl<E: Embedder> Embedder for Chunked<E> {
    fn embed<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        let span = info_span!("Embedding lines", lines = lines.len());
        span.pb_set_message("Embedding...");
        span.pb_set_finish_message("Embedding complete");
        span.pb_set_length(lines.len().div_ceil(self.chunk_size) as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} chunks")
        {
            span.pb_set_style(&style);
        }

        async move {
            let mut embeddings = Vec::with_capacity(lines.len());
            for (chunk, batch) in lines.chunks(self.chunk_size).enumerate() {
                let vectors =
                    self.inner
                        .embed(batch)
                        .await
                        .map_err(|e| AppError::ChunkFailed {
                            chunk,
                            source: Box::new(e),
                        })?;
                if vectors.len() != batch.len() {
                    return Err(AppError::EmbeddingCount {
                        expected: batch.len(),
                        received: vectors.len(),
                    });
                }
                debug!("Embedded chunk {chunk} ({} lines)", batch.len());
                embeddings.extend(vectors);
                Span::current().pb_inc(1);
            }
            Ok(embeddings)
        }
        .instrument(span)
        .boxed()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line number {i}")).collect()
    }

    #[tokio::test]
    async fn chunked_preserves_length_and_order() {
        let chunked = Chunked::new(WordHashEmbedder::default(), 25);
        let input = lines(60);
        let out = chunked.embed(&input).await.unwrap();
        assert_eq!(out.len(), input.len());
        for (line, vector) in input.iter().zip(&out) {
            assert_eq!(vector, &WordHashEmbedder::vector(line));
        }
        assert_eq!(chunked.inner.batch_sizes(), vec![25, 25, 10]);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_requests() {
        let chunked = Chunked::new(WordHashEmbedder::default(), 25);
        assert!(chunked.embed(&[]).await.unwrap().is_empty());
        assert_eq!(chunked.inner.calls(), 0);
    }

    #[test]
    fn chunk_size_is_at_least_one() {
        assert_eq!(Chunked::new(WordHashEmbedder::default(), 0).chunk_size(), 1);
    }

    #[tokio::test]
    async fn failing_chunk_fails_the_batch() {
        let chunked = Chunked::new(
            FailingEmbedder {
                fail_on: 1,
                inner: WordHashEmbedder::default(),
            },
            10,
        );
        let err = chunked.embed(&lines(30)).await.unwrap_err();
        assert!(matches!(err, AppError::ChunkFailed { chunk: 1, .. }));
        // The third chunk is never sent.
        assert_eq!(chunked.inner.inner.calls(), 2);
    }

    #[tokio::test]
    async fn short_response_is_an_error() {
        let chunked = Chunked::new(ShortEmbedder, 5);
        let err = chunked.embed(&lines(7)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::EmbeddingCount {
                expected: 5,
                received: 4
            }
        ));
    }

    #[tokio::test]
    async fn boxed_embedders_delegate() {
        let boxed: Box<dyn Embedder> = Box::new(WordHashEmbedder::default());
        let out = boxed.embed(&lines(3)).await.unwrap();
        assert_eq!(out.len(), 3);
    }
}
