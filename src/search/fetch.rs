use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::trace;

use crate::search::PageFetcher;
use crate::{AppError, AppResult};

/// Timeout applied to every request unless overridden.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the single page fetched by the check flow.
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared HTTP client for searches and page fetches.
pub fn http_client(timeout: Duration) -> AppResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(format!(
            "Mozilla/5.0 (compatible; simsites/{})",
            env!("CARGO_PKG_VERSION")
        ))
        .redirect(reqwest::redirect::Policy::limited(10))
        .referer(true)
        .timeout(timeout)
        .build()?)
}

/// Plain `GET` page fetcher; any non-2xx status is an error.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, AppResult<String>> {
        async move {
            let resp = self.client.get(url).timeout(self.timeout).send().await?;
            let status = resp.status();
            trace!("GET {url} -> {status}");
            if !status.is_success() {
                return Err(AppError::HttpStatus {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            Ok(resp.text().await?)
        }
        .boxed()
    }
}
