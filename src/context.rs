use std::time::Duration;

use tracing::{debug, info};

use crate::ai::{self, LlmClient, Provider};
use crate::cli::BackendArgs;
use crate::embed::remote::RemoteEmbedder;
use crate::embed::{Chunked, Embedder};
use crate::search::fetch::http_client;
use crate::{AppError, AppResult};

/// Everything a command needs to talk to the outside world, built once from the
/// command-line options.
pub struct Context {
    pub http: reqwest::Client,
    pub llm: LlmClient,
    pub embedder: Box<dyn Embedder>,
    pub timeout: Duration,
}

impl Context {
    #[tracing::instrument(name = "Preparing clients", level = "debug", skip(args))]
    pub fn new(args: &BackendArgs) -> AppResult<Self> {
        let timeout = args.timeout()?;
        let http = http_client(timeout)?;
        let provider = args.provider;
        let api_base = args.api_base.as_deref().unwrap_or(provider.api_base());
        let api_key = args.resolve_api_key();
        if api_key.is_none() && provider.api_key_env().is_some() {
            return Err(AppError::InvalidArgument(format!(
                "no API key for {provider}; pass --api-key or set {}",
                provider.api_key_env().unwrap_or("SIMSITES_API_KEY")
            )));
        }

        let chat_model = args.chat_model.as_deref().unwrap_or(provider.chat_model());
        info!("Using {chat_model} at {api_base}");
        let llm = LlmClient::new(
            ai::build_client(api_base, api_key.as_deref()),
            chat_model,
            timeout,
        );

        let embedder = Self::embedder(args, provider, api_base, api_key.as_deref(), timeout)?;
        Ok(Self {
            http,
            llm,
            embedder,
            timeout,
        })
    }

    fn embedder(
        args: &BackendArgs,
        provider: Provider,
        api_base: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> AppResult<Box<dyn Embedder>> {
        if args.local_embed {
            #[cfg(feature = "local-ml")]
            {
                info!("Using local embeddings model {}", args.local_model);
                let local = crate::embed::local::LocalEmbedder::new(args.local_model.clone());
                return Ok(Box::new(Chunked::new(local, args.chunk_size)));
            }
            #[cfg(not(feature = "local-ml"))]
            {
                return Err(AppError::InvalidArgument(
                    "--local-embed needs a build with the `local-ml` feature".to_string(),
                ));
            }
        }

        let model = args
            .embedding_model
            .as_deref()
            .unwrap_or(provider.embedding_model());
        debug!("Using remote embeddings model {model}");
        let remote = RemoteEmbedder::new(ai::build_client(api_base, api_key), model, timeout);
        Ok(Box::new(Chunked::new(remote, args.chunk_size)))
    }
}
