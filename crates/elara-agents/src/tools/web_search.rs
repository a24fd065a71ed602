use std::sync::Arc;

use async_trait::async_trait;
use elara_common::{Error, Result};
use serde_json::json;
use tracing::info;

use crate::search::WebSearch;
use crate::tools::{Tool, ToolContext, ToolOutput};

pub const WEB_SEARCH_TOOL: &str = "web_search";

const NO_RESULTS: &str = "No web results were found for this query.";

/// Exposes the web search adapter to the model as the `web_search` tool.
pub struct WebSearchTool {
    search: Arc<WebSearch>,
}

impl WebSearchTool {
    pub fn new(search: Arc<WebSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &'static str {
        WEB_SEARCH_TOOL
    }

    fn description(&self) -> &'static str {
        "Search the web for current information such as news, weather, prices, scores or \
         anything that may have changed recently. Returns source URLs with content snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query, phrased the way you would type it into a search engine."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, context: &ToolContext, args: serde_json::Value) -> Result<ToolOutput> {
        let query = args
            .get("query")
            .and_then(|q| q.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| Error::Agent("missing or invalid 'query' argument".to_string()))?;

        info!(
            "web_search tool invoked (session {})",
            context.session_id.as_deref().unwrap_or("-")
        );

        let ctx = self.search.search(query).await;
        if ctx.is_empty() {
            return Ok(ToolOutput::text(NO_RESULTS));
        }
        let block = ctx.to_context_block();
        Ok(ToolOutput::text(block).with_sources(ctx.into_results()))
    }
}
