use thiserror::Error;

/// Unified application error type to simplify bubbling errors through async flows.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Errored while handling a file. {0}")]
    Io(#[from] std::io::Error),
    #[error("Error serializing json. {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error communicating with the AI. {0}")]
    AIClient(#[from] async_openai::error::OpenAIError),
    #[error("Error accessing the internet. {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("Unexpected response shape at `{path}`: {message}")]
    MalformedResponse { path: String, message: String },
    #[error("The model returned no content")]
    EmptyResponse,
    #[error("Embedding chunk {chunk} failed. {source}")]
    ChunkFailed {
        chunk: usize,
        #[source]
        source: Box<AppError>,
    },
    #[error("Expected {expected} embeddings but received {received}")]
    EmbeddingCount { expected: usize, received: usize },
    #[error("Embedding {index} has {found} dimensions, expected {expected}")]
    RaggedEmbeddings {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Invalid argument. {0}")]
    InvalidArgument(String),
    #[error("Search failed. {0}")]
    Search(String),
    #[error("Error while running the local embedding model. {0}")]
    LocalModel(String),
    #[error("Error parsing the duration string. {0}")]
    DurationParse(#[from] humantime::DurationError),
    #[error("{0}")]
    Other(String),
}

impl<T> From<serde_path_to_error::Error<T>> for AppError
where
    T: std::fmt::Display,
{
    fn from(e: serde_path_to_error::Error<T>) -> Self {
        AppError::MalformedResponse {
            path: e.path().to_string(),
            message: e.inner().to_string(),
        }
    }
}

#[cfg(feature = "local-ml")]
impl From<simsites_local_embedder::EmbedderError> for AppError {
    fn from(e: simsites_local_embedder::EmbedderError) -> Self {
        AppError::LocalModel(e.to_string())
    }
}

/// Convenience alias for results that bubble `AppError`.
pub type AppResult<T> = Result<T, AppError>;
