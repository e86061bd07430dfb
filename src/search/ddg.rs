use futures::FutureExt;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, trace};
use url::Url;

use crate::search::{SearchProvider, SearchResult};
use crate::{AppError, AppResult};

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";

static RESULT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.result:not(.result--ad)").expect("result selector"));
static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("a.result__a").expect("title selector"));
static SNIPPET: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result__snippet").expect("snippet selector"));

/// DuckDuckGo's JavaScript-free results page, limited to the past year.
pub struct DuckDuckGo {
    client: reqwest::Client,
}

impl DuckDuckGo {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl SearchProvider for DuckDuckGo {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, AppResult<Vec<SearchResult>>> {
        async move {
            debug!("Searching DuckDuckGo for {query:?}");
            let resp = self
                .client
                .post(ENDPOINT)
                .form(&[("q", query), ("df", "y"), ("kl", "us-en")])
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(AppError::HttpStatus {
                    url: ENDPOINT.to_string(),
                    status: status.as_u16(),
                });
            }
            let body = resp.text().await?;
            let results = parse_results(&body, max_results);
            if results.is_empty() && body.contains("anomaly") {
                return Err(AppError::Search(
                    "DuckDuckGo refused the request (rate limited)".to_string(),
                ));
            }
            Ok(results)
        }
        .boxed()
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result links are wrapped in a redirect (`//duckduckgo.com/l/?uddg=<target>`).
fn resolve_link(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).or_else(|_| Url::parse(ENDPOINT)?.join(href)).ok()?;
    if url.domain().is_some_and(|d| d.ends_with("duckduckgo.com")) && url.path().starts_with("/l/")
    {
        return url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    Some(url.into())
}

pub(crate) fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT)
        .filter_map(|result| {
            let anchor = result.select(&TITLE).next()?;
            let link = resolve_link(anchor.value().attr("href")?)?;
            let snippet = result.select(&SNIPPET).next().map(text_of).unwrap_or_default();
            trace!("DuckDuckGo result: {link}");
            Some(SearchResult {
                link,
                snippet,
                title: text_of(anchor),
            })
        })
        .take(max_results)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><div class="results">
      <div class="result results_links result--ad">
        <h2 class="result__title"><a class="result__a" href="https://ads.example/click">Sponsored</a></h2>
        <a class="result__snippet">Buy now</a>
      </div>
      <div class="result results_links results_links_deep web-result">
        <h2 class="result__title">
          <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fshoes.example%2Frunning%3Fa%3D1&amp;rut=abc">Best <b>Running</b> Shoes</a>
        </h2>
        <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">Our   <b>top picks</b> for 2024.</a>
      </div>
      <div class="result results_links web-result">
        <h2 class="result__title"><a class="result__a" href="https://trail.example/">Trail shoes</a></h2>
      </div>
      <div class="result results_links web-result">
        <h2 class="result__title"><a class="result__a" href="https://third.example/">Third</a></h2>
        <a class="result__snippet">Third snippet</a>
      </div>
    </div></body></html>"#;

    #[test]
    fn parses_organic_results() {
        let results = parse_results(PAGE, 10);
        assert_eq!(
            results,
            vec![
                SearchResult {
                    link: "https://shoes.example/running?a=1".to_string(),
                    snippet: "Our top picks for 2024.".to_string(),
                    title: "Best Running Shoes".to_string(),
                },
                SearchResult {
                    link: "https://trail.example/".to_string(),
                    snippet: String::new(),
                    title: "Trail shoes".to_string(),
                },
                SearchResult {
                    link: "https://third.example/".to_string(),
                    snippet: "Third snippet".to_string(),
                    title: "Third".to_string(),
                },
            ]
        );
    }

    #[test]
    fn honours_max_results() {
        assert_eq!(parse_results(PAGE, 1).len(), 1);
        assert!(parse_results(PAGE, 0).is_empty());
    }

    #[test]
    fn empty_page_has_no_results() {
        assert!(parse_results("<html></html>", 10).is_empty());
    }
}
