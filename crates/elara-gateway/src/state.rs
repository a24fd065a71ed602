use std::sync::Arc;
use std::time::Duration;

use elara_agents::{AgentRuntime, LlmProvider, OpenAiProvider, SearchProvider, TavilyProvider};
use elara_common::{Error, Result};
use elara_config::AppConfig;
use elara_db::SessionStore;
use reqwest::Client;
use tracing::{info, warn};

pub type SharedState = Arc<AppState>;

/// Shared gateway state, owned by the router.
pub struct AppState {
    pub config: AppConfig,
    pub sessions: Arc<SessionStore>,
    http: Client,
    /// Runtime built from configured credentials; `None` when no completion key is configured.
    default_runtime: Option<Arc<AgentRuntime>>,
}

/// Per-request credential overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    pub api_key: Option<&'a str>,
    pub search_api_key: Option<&'a str>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let sessions = Arc::new(SessionStore::new(
            config.sessions.capacity,
            config.sessions.max_retained_turns,
        ));
        Self::with_sessions(config, sessions)
    }

    pub fn with_sessions(config: AppConfig, sessions: Arc<SessionStore>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.llm.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                warn!("failed to build HTTP client with timeout, using defaults: {}", e);
                Client::new()
            });

        let mut state = Self {
            config,
            sessions,
            http,
            default_runtime: None,
        };
        let default_runtime = non_blank(state.config.llm.api_key.as_deref()).map(|key| {
            Arc::new(state.build_runtime(key, non_blank(state.config.search.api_key.as_deref())))
        });
        state.default_runtime = default_runtime;

        match &state.default_runtime {
            Some(runtime) => info!(
                "agent runtime ready: models={:?} web_search={}",
                runtime.models(),
                runtime.has_web_search()
            ),
            None => warn!("no completion API key configured; requests must supply api_key"),
        }
        state
    }

    /// Runtime for one request. Credentials supplied with the request take
    /// precedence over configured ones.
    ///
    /// Fails with `Error::Validation` before any upstream call when the
    /// completion key is missing, or when search is wanted without a search key.
    pub fn runtime_for(
        &self,
        credentials: Credentials<'_>,
        wants_search: bool,
    ) -> Result<Arc<AgentRuntime>> {
        let api_key = non_blank(credentials.api_key);
        let search_key = non_blank(credentials.search_api_key);

        if wants_search
            && search_key.is_none()
            && non_blank(self.config.search.api_key.as_deref()).is_none()
        {
            return Err(Error::Validation(
                "search requested but no search API key is configured (set TAVILY_API_KEY or pass search_api_key)"
                    .into(),
            ));
        }

        if api_key.is_none() && search_key.is_none() {
            if let Some(runtime) = &self.default_runtime {
                return Ok(Arc::clone(runtime));
            }
        }

        let key = api_key
            .or_else(|| non_blank(self.config.llm.api_key.as_deref()))
            .ok_or_else(|| {
                Error::Validation(
                    "missing completion API key (set GROQ_API_KEY or pass api_key)".into(),
                )
            })?;
        let search_key = search_key.or_else(|| non_blank(self.config.search.api_key.as_deref()));

        Ok(Arc::new(self.build_runtime(key, search_key)))
    }

    fn build_runtime(&self, api_key: &str, search_key: Option<&str>) -> AgentRuntime {
        let provider: Arc<dyn LlmProvider> = Arc::new(
            OpenAiProvider::new(api_key.to_string(), Some(self.config.llm.base_url.clone()))
                .with_client(self.http.clone()),
        );
        let search = search_key.map(|key| {
            Arc::new(
                TavilyProvider::new(key.to_string(), Some(self.config.search.base_url.clone()))
                    .with_client(self.http.clone()),
            ) as Arc<dyn SearchProvider>
        });
        AgentRuntime::from_config(&self.config, provider, search, Arc::clone(&self.sessions))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
