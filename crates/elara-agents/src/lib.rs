pub mod decision;
pub mod openai;
pub mod prompt;
pub mod providers;
pub mod runtime;
pub mod search;
pub mod tools;

pub use decision::SearchDecider;
pub use openai::OpenAiProvider;
pub use prompt::PromptBuilder;
pub use providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolChoice, ToolDefinition, Usage,
};
pub use runtime::{
    AgentRuntime, BUSY_MARKER, ChatReply, ChatTurn, ExchangeOutcome, FailedAttempt, busy_message,
};
pub use search::{SearchContext, SearchProvider, SearchResult, TavilyProvider, WebSearch};
pub use tools::{Tool, ToolContext, ToolOutput, WebSearchTool};
