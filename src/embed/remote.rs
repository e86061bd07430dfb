use std::time::Duration;

use async_openai::types::embeddings::CreateEmbeddingRequestArgs;
use async_openai::{Client, config::Config};
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::trace;

use crate::embed::Embedder;
use crate::{AppError, AppResult};

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint.
pub struct RemoteEmbedder {
    client: Client<Box<dyn Config>>,
    model: String,
    timeout: Duration,
}

impl RemoteEmbedder {
    pub fn new(client: Client<Box<dyn Config>>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Embedder for RemoteEmbedder {
    fn embed<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        async move {
            if lines.is_empty() {
                return Ok(Vec::new());
            }
            let request = CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(lines.to_vec())
                .build()?;

            let response = tokio::time::timeout(
                self.timeout,
                self.client.embeddings().create(request),
            )
            .await
            .map_err(|_| AppError::Timeout(self.timeout))??;
            trace!(
                "Embedding response from {}: {} vectors",
                response.model,
                response.data.len()
            );

            let mut data = response.data;
            data.sort_by_key(|d| d.index);
            if data.len() != lines.len() {
                return Err(AppError::EmbeddingCount {
                    expected: lines.len(),
                    received: data.len(),
                });
            }
            Ok(data.into_iter().map(|d| d.embedding).collect())
        }
        .boxed()
    }
}
