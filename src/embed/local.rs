use futures::FutureExt;
use futures::future::BoxFuture;
use simsites_local_embedder::BertEmbedder;
use tokio::sync::OnceCell;
use tracing::info;

use crate::AppResult;
use crate::embed::Embedder;

/// On-device sentence encoder. The model is downloaded and loaded on the first call to
/// [`Embedder::embed`] and dropped together with this value.
pub struct LocalEmbedder {
    model_name: String,
    inner: OnceCell<BertEmbedder>,
}

impl LocalEmbedder {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            inner: OnceCell::new(),
        }
    }

    async fn model(&self) -> AppResult<&BertEmbedder> {
        let model = self
            .inner
            .get_or_try_init(|| async {
                info!("Loading local embedding model {}", self.model_name);
                BertEmbedder::new_from_pretrained(&self.model_name).await
            })
            .await?;
        Ok(model)
    }
}

impl Embedder for LocalEmbedder {
    fn embed<'a>(&'a self, lines: &'a [String]) -> BoxFuture<'a, AppResult<Vec<Vec<f32>>>> {
        async move {
            if lines.is_empty() {
                return Ok(Vec::new());
            }
            let model = self.model().await?;
            Ok(model.embed_texts(lines).await?)
        }
        .boxed()
    }
}
