//! On-device sentence embeddings with a BERT-family encoder running on candle.

pub mod cache;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use futures::StreamExt;
use tokenizers::{Tokenizer, TruncationParams};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info_span, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

use crate::cache::EmbeddingCache;

/// Sentence-transformers model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Token budget per line; longer lines are truncated before the forward pass.
const MAX_TOKENS: usize = 256;

const MODEL_FILES: [&str; 3] = ["config.json", "model.safetensors", "tokenizer.json"];

#[derive(thiserror::Error, Debug)]
pub enum EmbedderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Download error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Download of {url} failed with status {status}")]
    DownloadStatus { url: String, status: u16 },
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Cache decode error: {0}")]
    Bincode(#[from] bincode::error::DecodeError),
    #[error("Cache encode error: {0}")]
    BincodeEncode(#[from] bincode::error::EncodeError),
    #[error("Int parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("Header value error: {0}")]
    HeaderValue(#[from] reqwest::header::ToStrError),
    #[error("No cache directory could be resolved; set SIMSITES_CACHE_DIR")]
    CacheDirNotFound,
    #[error("Embedding worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, EmbedderError>;

/// BERT sentence encoder: mean-pooled, L2-normalized embeddings per line.
#[derive(Clone)]
pub struct BertEmbedder {
    device: Device,
    model: Arc<BertModel>,
    tokenizer: Arc<Tokenizer>,
    cache: Option<EmbeddingCache>,
}

impl BertEmbedder {
    fn create_device() -> Result<Device> {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            Ok(Device::new_metal(0)?)
        }

        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            Ok(Device::Cpu)
        }
    }

    /// Download (once) and load a model from the Hugging Face hub.
    #[tracing::instrument(name = "Loading local embedding model", level = "info")]
    pub async fn new_from_pretrained<S: AsRef<str> + std::fmt::Debug>(
        model_name: S,
    ) -> Result<Self> {
        let root = cache::cache_root()?;
        let model_dir = cache::model_dir(&root, model_name.as_ref());
        tokio::fs::create_dir_all(&model_dir).await?;

        let base_url = format!(
            "https://huggingface.co/{}/resolve/main/",
            model_name.as_ref()
        );

        let client = reqwest::ClientBuilder::new()
            .user_agent(format!("simsites-embedder/{}", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .referer(true)
            .build()?;

        for file in MODEL_FILES {
            let file_path = model_dir.join(file);
            if !file_path.exists() {
                download_file(&client, &format!("{base_url}{file}"), &file_path).await?;
            }
        }

        let mut embedder = Self::new_from_dir(model_dir)?;
        embedder.cache = Some(EmbeddingCache::open(&root, model_name.as_ref())?);
        Ok(embedder)
    }

    /// Load a model from a directory holding `config.json`, `model.safetensors` and
    /// `tokenizer.json`. No embedding cache is attached.
    #[tracing::instrument(
        name = "Loading embedding model from directory",
        level = "debug",
        skip(model_dir)
    )]
    pub fn new_from_dir<P: AsRef<Path>>(model_dir: P) -> Result<Self> {
        let model_dir = model_dir.as_ref();

        let mut tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;

        let config_bytes = std::fs::read(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_slice(&config_bytes)?;

        let device = Self::create_device()?;

        let weights_data = std::fs::read(model_dir.join("model.safetensors"))?;
        let vb = VarBuilder::from_slice_safetensors(&weights_data, DType::F32, &device)?;
        let model = BertModel::load(vb, &config)?;

        Ok(Self {
            device,
            model: Arc::new(model),
            tokenizer: Arc::new(tokenizer),
            cache: None,
        })
    }

    /// Embed one line on the calling thread.
    pub fn embed_text_blocking(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(text)? {
                return Ok(hit);
            }
        }

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| EmbedderError::Tokenizer(e.to_string()))?;

        let ids = encoding.get_ids();
        let seq_len = ids.len();

        let input_ids = Tensor::new(ids, &self.device)?.reshape((1, seq_len))?;
        let token_type_ids =
            Tensor::new(encoding.get_type_ids(), &self.device)?.reshape((1, seq_len))?;
        let attention_mask =
            Tensor::new(encoding.get_attention_mask(), &self.device)?.reshape((1, seq_len))?;

        // [1, seq_len, hidden]
        let outputs = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))?;

        // Single unpadded sequence, so a plain mean over tokens is the masked mean.
        let tokens = outputs.dim(1)?;
        let mean = (outputs.sum(1)? / (tokens as f64))?;
        let embedding = l2_normalize(mean.squeeze(0)?.to_vec1::<f32>()?);

        if let Some(cache) = &self.cache {
            cache.put(text, &embedding)?;
        }

        Ok(embedding)
    }

    /// Embed a batch of lines in a blocking worker; output order matches input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = self.clone();
        let texts: Vec<String> = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let span = info_span!("Embedding lines locally");
            span.pb_set_message("Embedding...");
            span.pb_set_finish_message("Embedding complete");
            span.pb_set_length(texts.len() as u64);
            if let Ok(style) =
                ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            {
                span.pb_set_style(&style);
            }
            let _enter = span.enter();

            let mut embeddings = Vec::with_capacity(texts.len());
            for text in &texts {
                embeddings.push(embedder.embed_text_blocking(text)?);
                span.pb_inc(1);
            }
            Ok(embeddings)
        })
        .await?
    }
}

fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Stream one model file to disk with a progress bar.
async fn download_file(client: &reqwest::Client, url: &str, path: &PathBuf) -> Result<()> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(EmbedderError::DownloadStatus {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }

    let span = info_span!("Downloading model file", url = %url);
    span.pb_set_message("Downloading...");
    span.pb_set_finish_message("Download complete");
    if let Some(content_length) = resp.headers().get(reqwest::header::CONTENT_LENGTH) {
        let file_size: u64 = content_length.to_str()?.parse()?;
        debug!("Expected file size: {} bytes", file_size);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        {
            span.pb_set_style(&style);
        }
        span.pb_set_length(file_size);
    } else {
        warn!("Content-Length header not found for {url}");
        if let Ok(style) = ProgressStyle::default_spinner().template("{msg} {spinner}") {
            span.pb_set_style(&style);
        }
    }
    let _enter = span.enter();

    // Write to a sibling file first so an interrupted download is never mistaken for a model.
    let partial = path.with_extension("partial");
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = resp.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        span.pb_inc(chunk.len() as u64);
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&partial, path).await?;
    Ok(())
}
