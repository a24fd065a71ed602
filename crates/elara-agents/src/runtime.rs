use std::sync::Arc;

use chrono::Utc;
use elara_common::{Error, Result, Turn};
use elara_config::model::DEFAULT_DECISION_MODEL;
use elara_config::{AppConfig, SearchStrategy};
use elara_db::SessionStore;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::decision::SearchDecider;
use crate::prompt::PromptBuilder;
use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, MessagePart, ToolChoice,
    ToolDefinition,
};
use crate::search::{SearchProvider, SearchResult, WebSearch};
use crate::tools::{Tool, ToolContext, WebSearchTool};

/// Recognizable prefix of the reply returned when every model candidate failed.
pub const BUSY_MARKER: &str = "System busy";

pub fn busy_message(last_error: &str) -> String {
    format!(
        "{BUSY_MARKER}: none of the AI models could answer right now. \
         Please try again in a moment. (last error: {last_error})"
    )
}

/// One inbound user message and how it should be handled.
#[derive(Debug, Clone, Copy)]
pub struct ChatTurn<'a> {
    pub session_id: Option<&'a str>,
    pub text: &'a str,
    /// Allow a web search when the decision function says the query needs one.
    pub search: bool,
    /// Preferred model, tried before the configured candidates.
    pub model: Option<&'a str>,
}

impl<'a> ChatTurn<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            session_id: None,
            text,
            search: false,
            model: None,
        }
    }

    pub fn with_session(mut self, session_id: &'a str) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_search(mut self, search: bool) -> Self {
        self.search = search;
        self
    }

    pub fn with_model(mut self, model: Option<&'a str>) -> Self {
        self.model = model;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub model: Option<String>,
    pub searched: bool,
    pub sources: Vec<SearchResult>,
    pub session_id: Option<String>,
    /// False when every model failed and `reply` is the busy message.
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAttempt {
    pub model: String,
    pub error: String,
}

/// Terminal state of a run over the model candidates.
#[derive(Debug, Clone)]
pub enum ExchangeOutcome {
    Done {
        content: String,
        model: String,
        used_tools: bool,
        sources: Vec<SearchResult>,
        failures: Vec<FailedAttempt>,
    },
    AllFailed {
        failures: Vec<FailedAttempt>,
    },
}

impl ExchangeOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn failures(&self) -> &[FailedAttempt] {
        match self {
            Self::Done { failures, .. } | Self::AllFailed { failures } => failures,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.failures().last().map(|f| f.error.as_str())
    }
}

/// Successful single-model exchange.
struct Completed {
    content: String,
    used_tools: bool,
    sources: Vec<SearchResult>,
}

/// Orchestrates search decision, prompt assembly, tool use and model fallback.
pub struct AgentRuntime {
    provider: Arc<dyn LlmProvider>,
    models: Vec<String>,
    decider: SearchDecider,
    search: Option<Arc<WebSearch>>,
    strategy: SearchStrategy,
    tools: Vec<Box<dyn Tool>>,
    prompt: PromptBuilder,
    sessions: Arc<SessionStore>,
    history_window: usize,
    include_time: bool,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
}

impl AgentRuntime {
    pub fn new(provider: Arc<dyn LlmProvider>, sessions: Arc<SessionStore>) -> Self {
        let decider = SearchDecider::new(Arc::clone(&provider), DEFAULT_DECISION_MODEL);
        let agent = elara_config::AgentConfig::default();
        Self {
            provider,
            models: Vec::new(),
            decider,
            search: None,
            strategy: SearchStrategy::default(),
            tools: Vec::new(),
            prompt: PromptBuilder::from_config(&agent),
            sessions,
            history_window: 6,
            include_time: agent.include_time,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Build a runtime wired the way the service runs it.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn LlmProvider>,
        search: Option<Arc<dyn SearchProvider>>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let mut runtime = Self::new(provider, sessions);
        runtime.set_models(&config.llm.models);
        runtime.set_decision_model(&config.llm.decision_model);
        runtime.set_prompt_builder(PromptBuilder::from_config(&config.agent));
        runtime.set_include_time(config.agent.include_time);
        runtime.set_history_window(config.sessions.history_window);
        runtime.set_max_tokens(config.llm.max_tokens);
        runtime.set_temperature(config.llm.temperature);
        runtime.set_search_strategy(config.search.strategy);
        if let Some(search) = search {
            runtime.set_web_search(Arc::new(WebSearch::new(search, config.search.max_results)));
        }
        runtime
    }

    /// Set the ordered model candidates. Blank and duplicate ids are dropped.
    pub fn set_models(&mut self, ids: &[String]) {
        self.models = dedup_models(ids.iter().map(String::as_str));
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn set_decision_model(&mut self, model: &str) {
        self.decider = SearchDecider::new(Arc::clone(&self.provider), model);
    }

    pub fn set_prompt_builder(&mut self, prompt: PromptBuilder) {
        self.prompt = prompt;
    }

    pub fn set_include_time(&mut self, include_time: bool) {
        self.include_time = include_time;
    }

    pub fn set_history_window(&mut self, window: usize) {
        self.history_window = window;
    }

    pub fn set_max_tokens(&mut self, max_tokens: u32) {
        self.max_tokens = Some(max_tokens);
    }

    pub fn set_temperature(&mut self, temperature: Option<f64>) {
        self.temperature = temperature;
    }

    pub fn set_search_strategy(&mut self, strategy: SearchStrategy) {
        self.strategy = strategy;
    }

    /// Attach the web search adapter and expose it to the model as the `web_search` tool.
    pub fn set_web_search(&mut self, search: Arc<WebSearch>) {
        self.tools
            .retain(|t| t.name() != crate::tools::web_search::WEB_SEARCH_TOOL);
        self.register_tool(Box::new(WebSearchTool::new(Arc::clone(&search))));
        self.search = Some(search);
        info!("web search attached to agent runtime");
    }

    pub fn has_web_search(&self) -> bool {
        self.search.is_some()
    }

    pub fn register_tool(&mut self, tool: Box<dyn Tool>) {
        info!("registered tool: {}", tool.name());
        self.tools.push(tool);
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    fn find_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Model candidates for one request: the preferred model (if any) first, then the configured list.
    pub fn candidate_models(&self, preferred: Option<&str>) -> Vec<String> {
        dedup_models(
            preferred
                .into_iter()
                .chain(self.models.iter().map(String::as_str)),
        )
    }

    /// Run the full conversation loop for one user message.
    ///
    /// The session (if any) stays locked until the reply is recorded, so
    /// concurrent messages for the same session are answered in arrival order.
    /// History is only updated when a model produced an answer.
    #[instrument(skip_all, fields(session = turn.session_id.unwrap_or("-")))]
    pub async fn process_message(&self, turn: ChatTurn<'_>) -> ChatReply {
        let mut guard = match turn.session_id {
            Some(id) => Some(self.sessions.lock(id).await),
            None => None,
        };
        let history = guard
            .as_ref()
            .map(|g| g.recent(self.history_window))
            .unwrap_or_default();

        let wants_search = if !turn.search {
            false
        } else if self.search.is_none() {
            debug!("search requested but no search provider is configured");
            false
        } else {
            self.decider.needs_search(turn.text).await
        };

        let mut tools = Vec::new();
        let mut search_block = None;
        let mut sources = Vec::new();
        let mut searched = false;
        if wants_search {
            match (self.strategy, &self.search) {
                (SearchStrategy::Inject, Some(search)) => {
                    let ctx = search.search(turn.text).await;
                    searched = true;
                    if !ctx.is_empty() {
                        search_block = Some(ctx.to_context_block());
                    }
                    sources = ctx.into_results();
                }
                _ => tools = self.tool_definitions(),
            }
        }

        let now = self.include_time.then(Utc::now);
        let system = self.prompt.system_prompt(now, search_block.as_deref());
        let messages =
            PromptBuilder::assemble(&system, &history, self.history_window, turn.text);
        let models = self.candidate_models(turn.model);
        let context = ToolContext {
            session_id: turn.session_id.map(str::to_string),
        };

        match self.run_exchange(&models, &messages, &tools, &context).await {
            ExchangeOutcome::Done {
                content,
                model,
                used_tools,
                sources: tool_sources,
                ..
            } => {
                if let Some(guard) = guard.as_mut() {
                    guard.push(Turn::user(turn.text));
                    guard.push(Turn::assistant(content.clone()));
                }
                sources.extend(tool_sources);
                ChatReply {
                    reply: content,
                    model: Some(model),
                    searched: searched || used_tools,
                    sources,
                    session_id: turn.session_id.map(str::to_string),
                    completed: true,
                }
            }
            outcome @ ExchangeOutcome::AllFailed { .. } => {
                let last_error = outcome.last_error().unwrap_or("unknown error");
                warn!("all {} model candidate(s) failed", models.len());
                ChatReply {
                    reply: busy_message(last_error),
                    model: None,
                    searched,
                    sources,
                    session_id: turn.session_id.map(str::to_string),
                    completed: false,
                }
            }
        }
    }

    /// Try each model in order until one completes the exchange.
    ///
    /// Any failure inside an attempt (provider error, unknown tool, malformed
    /// tool arguments, failed follow-up call) moves on to the next model and
    /// repeats the whole exchange, tool execution included.
    pub async fn run_exchange(
        &self,
        models: &[String],
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        context: &ToolContext,
    ) -> ExchangeOutcome {
        let mut failures: Vec<FailedAttempt> = Vec::new();
        if models.is_empty() {
            failures.push(FailedAttempt {
                model: String::new(),
                error: "no model candidates configured".to_string(),
            });
            return ExchangeOutcome::AllFailed { failures };
        }

        for (index, model) in models.iter().enumerate() {
            match self.attempt(model, messages, tools, context).await {
                Ok(completed) => {
                    if index > 0 {
                        info!("using fallback model '{}' after {} failure(s)", model, index);
                    }
                    return ExchangeOutcome::Done {
                        content: completed.content,
                        model: model.clone(),
                        used_tools: completed.used_tools,
                        sources: completed.sources,
                        failures,
                    };
                }
                Err(err) => {
                    match models.get(index + 1) {
                        Some(next) => warn!(
                            "model '{}' failed ({}); trying fallback '{}'",
                            model, err, next
                        ),
                        None => warn!("model '{}' failed ({}); no candidates left", model, err),
                    }
                    failures.push(FailedAttempt {
                        model: model.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        ExchangeOutcome::AllFailed { failures }
    }

    async fn attempt(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        context: &ToolContext,
    ) -> Result<Completed> {
        let request = self.build_request(model, messages.to_vec(), tools);
        let response = self.provider.complete(&request).await?;

        if !response.has_tool_use() {
            return Ok(Completed {
                content: non_empty_reply(response.text())?,
                used_tools: false,
                sources: Vec::new(),
            });
        }

        let mut extended = messages.to_vec();
        extended.push(ChatMessage {
            role: ChatRole::Assistant,
            content: MessagePart::Parts(response.content.clone()),
        });

        let mut sources = Vec::new();
        for block in &response.content {
            let ContentBlock::ToolUse { id, name, input } = block else {
                continue;
            };
            // Only tools declared on this request may run.
            let tool = tools
                .iter()
                .any(|t| t.name == *name)
                .then(|| self.find_tool(name))
                .flatten()
                .ok_or_else(|| Error::Agent(format!("model requested unknown tool '{name}'")))?;
            if !input.is_object() {
                return Err(Error::Agent(format!(
                    "malformed arguments for tool '{name}': {input}"
                )));
            }

            let output = tool.execute(context, input.clone()).await?;
            debug!("tool '{}' returned {} bytes", name, output.content.len());
            sources.extend(output.sources);
            extended.push(ChatMessage::tool_result(id.clone(), output.content));
        }

        let follow_up = self.build_request(model, extended, &[]);
        let final_response = self.provider.complete(&follow_up).await?;
        Ok(Completed {
            content: non_empty_reply(final_response.text())?,
            used_tools: true,
            sources,
        })
    }

    fn build_request(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> LlmRequest {
        LlmRequest {
            model: model.to_string(),
            messages,
            system: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tools: tools.to_vec(),
            tool_choice: (!tools.is_empty()).then_some(ToolChoice::Auto),
        }
    }
}

fn dedup_models<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut deduped: Vec<String> = Vec::new();
    for id in ids {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !deduped.iter().any(|existing| existing == trimmed) {
            deduped.push(trimmed.to_string());
        }
    }
    deduped
}

fn non_empty_reply(text: String) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::Agent("model returned an empty reply".to_string()));
    }
    Ok(trimmed.to_string())
}
