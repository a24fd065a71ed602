use async_trait::async_trait;
use elara_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SearchProvider, SearchResult};

pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// Tavily search API client.
#[derive(Clone)]
pub struct TavilyProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TavilyProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| TAVILY_BASE_URL.to_string()),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn provider_id(&self) -> &str {
        "tavily"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let url = format!("{}/search", self.base_url);
        debug!("tavily search: max_results={}", max_results);

        let body = TavilyRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: "basic",
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Search(format!("tavily request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Search(format!(
                "tavily API error: status={}, body={}",
                status.as_u16(),
                error_text
            )));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("failed to parse tavily response: {e}")))?;

        Ok(parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchResult {
                source_url: r.url,
                content: r.content,
            })
            .collect())
    }
}

#[derive(Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    content: String,
}
