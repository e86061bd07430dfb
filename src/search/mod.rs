pub mod ddg;
pub mod fetch;
pub mod serpapi;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::style::ProgressStyle;

use crate::AppResult;
pub use ddg::DuckDuckGo;
pub use fetch::HttpFetcher;
pub use serpapi::SerpApi;

/// One organic search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub link: String,
    pub snippet: String,
    pub title: String,
}

/// A web search backend.
pub trait SearchProvider: Send + Sync {
    /// Up to `max_results` results for `query`, best first.
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, AppResult<Vec<SearchResult>>>;
}

/// Retrieves the raw HTML behind a URL.
pub trait PageFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, AppResult<String>>;
}

/// HTML source of every result, in result order. A page that cannot be fetched is
/// replaced by its search snippet.
#[tracing::instrument(
    name = "Fetching search results",
    level = "info",
    skip_all,
    fields(results = results.len())
)]
pub async fn fetch_sources<F: PageFetcher + ?Sized>(
    fetcher: &F,
    results: &[SearchResult],
) -> Vec<String> {
    let span = Span::current();
    span.pb_set_message("Fetching...");
    span.pb_set_finish_message("Fetching complete");
    span.pb_set_length(results.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40.cyan/blue}] {pos}/{len}") {
        span.pb_set_style(&style);
    }

    let mut sources = Vec::with_capacity(results.len());
    for result in results {
        match fetcher.fetch(&result.link).await {
            Ok(html) => {
                debug!("Fetched {} ({} bytes)", result.link, html.len());
                sources.push(html);
            }
            Err(e) => {
                warn!("Could not fetch {}, using the search snippet instead. {e}", result.link);
                sources.push(result.snippet.clone());
            }
        }
        span.pb_inc(1);
    }
    sources
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::AppError;

    struct StaticFetcher;

    impl PageFetcher for StaticFetcher {
        fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, AppResult<String>> {
            async move {
                if url.contains("blocked") {
                    Err(AppError::HttpStatus {
                        url: url.to_string(),
                        status: 403,
                    })
                } else {
                    Ok(format!("<html><body>{url}</body></html>"))
                }
            }
            .boxed()
        }
    }

    fn result(link: &str, snippet: &str) -> SearchResult {
        SearchResult {
            link: link.to_string(),
            snippet: snippet.to_string(),
            title: String::new(),
        }
    }

    #[tokio::test]
    async fn failed_fetches_fall_back_to_snippets() {
        let results = vec![
            result("https://a.example", "first"),
            result("https://blocked.example", "second snippet"),
            result("https://c.example", "third"),
        ];
        let sources = fetch_sources(&StaticFetcher, &results).await;
        assert_eq!(
            sources,
            vec![
                "<html><body>https://a.example</body></html>".to_string(),
                "second snippet".to_string(),
                "<html><body>https://c.example</body></html>".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn no_results_fetch_nothing() {
        assert!(fetch_sources(&StaticFetcher, &[]).await.is_empty());
    }
}
