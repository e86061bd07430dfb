use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::search::{SearchProvider, SearchResult};
use crate::{AppError, AppResult};

const ENDPOINT: &str = "https://serpapi.com/search.json";

/// Google organic results through SerpApi.
pub struct SerpApi {
    client: reqwest::Client,
    api_key: String,
    location: Option<String>,
    country: String,
    language: String,
}

impl SerpApi {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            location: None,
            country: "us".to_string(),
            language: "en".to_string(),
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn params<'a>(&'a self, query: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![
            ("api_key", self.api_key.as_str()),
            ("engine", "google"),
            ("q", query),
            ("google_domain", "google.com"),
            ("gl", self.country.as_str()),
            ("hl", self.language.as_str()),
        ];
        if let Some(location) = &self.location {
            params.push(("location", location.as_str()));
        }
        params
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    title: String,
}

pub(crate) fn parse_results(body: &str, max_results: usize) -> AppResult<Vec<SearchResult>> {
    let jd = &mut serde_json::Deserializer::from_str(body);
    let response: SearchResponse = serde_path_to_error::deserialize(jd)?;
    if let Some(error) = response.error {
        return Err(AppError::Search(error));
    }
    if response.organic_results.is_empty() {
        warn!("SerpApi returned no organic results");
    }
    Ok(response
        .organic_results
        .into_iter()
        .take(max_results)
        .map(|r| SearchResult {
            link: r.link,
            snippet: r.snippet,
            title: r.title,
        })
        .collect())
}

impl SearchProvider for SerpApi {
    fn search<'a>(
        &'a self,
        query: &'a str,
        max_results: usize,
    ) -> BoxFuture<'a, AppResult<Vec<SearchResult>>> {
        async move {
            debug!("Searching Google via SerpApi for {query:?}");
            let resp = self
                .client
                .get(ENDPOINT)
                .query(&self.params(query))
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                // Error bodies carry a JSON `error` message worth surfacing.
                if let Err(e @ AppError::Search(_)) = parse_results(&body, 0) {
                    return Err(e);
                }
                return Err(AppError::HttpStatus {
                    url: ENDPOINT.to_string(),
                    status: status.as_u16(),
                });
            }
            parse_results(&body, max_results)
        }
        .boxed()
    }
}
