use async_trait::async_trait;
use elara_common::Result;

use crate::search::SearchResult;

pub mod web_search;
pub use web_search::WebSearchTool;

/// A local function the model may invoke through a tool call.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn input_schema(&self) -> serde_json::Value;

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput>;
}

/// Per-exchange information handed to tools.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Raw text returned to the model as the tool result.
    pub content: String,
    /// Search results gathered while executing, surfaced to API callers.
    pub sources: Vec<SearchResult>,
}

impl ToolOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<SearchResult>) -> Self {
        self.sources = sources;
        self
    }
}
