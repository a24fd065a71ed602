use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_SEARCH_BASE_URL: &str = "https://api.tavily.com";
pub const DEFAULT_DECISION_MODEL: &str = "llama-3.1-8b-instant";

/// Top-level configuration for the Elara service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gateway: GatewayConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub sessions: SessionConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Static HTML served at `/`. A plain liveness string is used when unset or unreadable.
    pub landing_page: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            landing_page: None,
        }
    }
}

/// Completion provider settings. Any OpenAI-compatible endpoint works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Candidate models, tried in order until one answers.
    pub models: Vec<String>,
    /// Fast model used to classify whether a query needs live information.
    pub decision_model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            models: vec![
                "llama-3.3-70b-versatile".to_string(),
                "llama-3.1-8b-instant".to_string(),
                "gemma2-9b-it".to_string(),
            ],
            decision_model: DEFAULT_DECISION_MODEL.to_string(),
            max_tokens: 1024,
            temperature: Some(0.7),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_results: usize,
    pub strategy: SearchStrategy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_SEARCH_BASE_URL.to_string(),
            max_results: 3,
            strategy: SearchStrategy::Tool,
        }
    }
}

/// How search results reach the model once a query is classified as needing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Declare a `web_search` tool and let the model issue the call.
    #[default]
    Tool,
    /// Search with the user's text up front and put the results in the system prompt.
    Inject,
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tool" => Ok(Self::Tool),
            "inject" => Ok(Self::Inject),
            other => Err(format!("unknown search strategy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of most recent turns sent to the model with each request.
    pub history_window: usize,
    /// Maximum number of distinct sessions kept before the least recently used is evicted.
    pub capacity: usize,
    /// Maximum number of turns retained per session.
    pub max_retained_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            capacity: 1024,
            max_retained_turns: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub persona: String,
    pub policy: String,
    /// IANA timezone used for the current-time context line.
    pub timezone: String,
    pub include_time: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            persona: "You are Elara AI, a friendly and knowledgeable assistant.".to_string(),
            policy: "Answer briefly and clearly in plain text. Be polite and direct. \
                     Stay on the user's topic, and when a question needs several steps, \
                     give a short summary first and then the steps as a numbered list. \
                     If you are not sure about something, say so instead of guessing."
                .to_string(),
            timezone: "Asia/Kolkata".to_string(),
            include_time: true,
        }
    }
}
