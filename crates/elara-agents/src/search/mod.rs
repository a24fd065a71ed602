use std::sync::Arc;

use async_trait::async_trait;
use elara_common::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod tavily;
pub use tavily::TavilyProvider;

/// Trait for web search backends.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Return at most `max_results` results for `query`, best first.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// One snippet returned by a search provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub source_url: String,
    pub content: String,
}

/// Results of a single search call. Read-only once produced.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    results: Vec<SearchResult>,
}

impl SearchContext {
    pub fn new(results: Vec<SearchResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        self.results
    }

    /// Text block injected into prompts: one `Source`/`Content` pair per result,
    /// separated by blank lines. Empty when there are no results.
    pub fn to_context_block(&self) -> String {
        self.results
            .iter()
            .map(|r| format!("Source: {}\nContent: {}", r.source_url, r.content.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Web search adapter. Never fails: provider errors degrade to an empty context.
pub struct WebSearch {
    provider: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl WebSearch {
    pub fn new(provider: Arc<dyn SearchProvider>, max_results: usize) -> Self {
        Self {
            provider,
            max_results: max_results.max(1),
        }
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    pub async fn search(&self, query: &str) -> SearchContext {
        let query = query.trim();
        if query.is_empty() {
            return SearchContext::default();
        }

        match self.provider.search(query, self.max_results).await {
            Ok(mut results) => {
                results.truncate(self.max_results);
                info!(
                    "{} returned {} result(s) for web search",
                    self.provider.provider_id(),
                    results.len()
                );
                SearchContext::new(results)
            }
            Err(e) => {
                warn!(
                    "{} search failed, continuing without context: {}",
                    self.provider.provider_id(),
                    e
                );
                SearchContext::default()
            }
        }
    }
}
