use std::env;
use std::io::{BufReader, BufWriter, Cursor};
use std::path::{Path, PathBuf};

use murmur3::murmur3_x86_128;
use tracing::trace;

use crate::{EmbedderError, Result};

/// Application name used to namespace the cache directory.
pub static APP_NAME: &str = "simsites";

/// Resolve the cache root: `SIMSITES_CACHE_DIR`, then `XDG_CACHE_HOME`, then `~/.cache`.
pub fn cache_root() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("SIMSITES_CACHE_DIR") {
        Ok(PathBuf::from(dir))
    } else if let Some(dir) = env::var_os("XDG_CACHE_HOME") {
        Ok(PathBuf::from(dir).join(APP_NAME))
    } else if let Some(home) = env::var_os("HOME") {
        Ok(PathBuf::from(home).join(".cache").join(APP_NAME))
    } else if let Some(profile) = env::var_os("USERPROFILE") {
        Ok(PathBuf::from(profile).join(".cache").join(APP_NAME))
    } else {
        Err(EmbedderError::CacheDirNotFound)
    }
}

/// Directory holding the downloaded files for a Hugging Face model.
pub fn model_dir(root: &Path, model_name: &str) -> PathBuf {
    root.join("huggingface")
        .join("transformers")
        .join(slug(model_name))
}

fn slug(model_name: &str) -> String {
    model_name.replace(['/', '\\', ':'], "_")
}

/// On-disk cache of sentence embeddings, one bincode file per (model, text) pair.
#[derive(Clone, Debug)]
pub struct EmbeddingCache {
    dir: PathBuf,
    model_name: String,
}

impl EmbeddingCache {
    pub fn open(root: &Path, model_name: &str) -> Result<Self> {
        let dir = root.join("embeddings").join(slug(model_name));
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            model_name: model_name.to_string(),
        })
    }

    fn path_for(&self, text: &str) -> Result<PathBuf> {
        let key = format!("{}\n{}", self.model_name, text);
        let hash = murmur3_x86_128(&mut Cursor::new(key.as_bytes()), 0)?;
        Ok(self.dir.join(format!("{hash:032x}.bin")))
    }

    pub fn get(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let path = self.path_for(text)?;
        if !path.is_file() {
            return Ok(None);
        }
        let mut reader = BufReader::new(std::fs::File::open(&path)?);
        let vec: Vec<f32> = bincode::decode_from_std_read(&mut reader, bincode::config::standard())?;
        trace!("Embedding cache hit: {}", path.display());
        Ok(Some(vec))
    }

    pub fn put(&self, text: &str, embedding: &[f32]) -> Result<()> {
        let path = self.path_for(text)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);
        bincode::encode_into_std_write(embedding, &mut writer, bincode::config::standard())?;
        Ok(())
    }
}
