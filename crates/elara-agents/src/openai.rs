use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolChoice, Usage,
};
use async_trait::async_trait;
use elara_common::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Client for OpenAI-compatible `/chat/completions` endpoints. Defaults to Groq.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    name: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| GROQ_BASE_URL.to_string()),
            name: "groq".to_string(),
        }
    }

    /// Reuse a shared HTTP client (connection pool, timeouts).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_id(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let openai_request = self.convert_request(request)?;
        debug!(
            "{} completion: model={} messages={} tools={}",
            self.name,
            request.model,
            openai_request.messages.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| Error::Agent(format!("{} request failed: {}", self.name, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!(
                "{} API error: status={}, body={}",
                self.name,
                status.as_u16(),
                error_text
            )));
        }

        let openai_response: OpenAiResponse = response.json().await.map_err(|e| {
            Error::Agent(format!("failed to parse {} response: {}", self.name, e))
        })?;

        self.convert_response(openai_response)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await;

        match response {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

impl OpenAiProvider {
    fn convert_request(&self, request: &LlmRequest) -> Result<OpenAiRequest> {
        let mut messages = Vec::new();

        if let Some(system_prompt) = &request.system {
            messages.push(OpenAiMessage::System {
                content: system_prompt.clone(),
            });
        }

        for msg in &request.messages {
            messages.push(self.convert_message(msg)?);
        }

        let (tools, tool_choice) = if request.tools.is_empty() {
            (None, None)
        } else {
            let tools = request
                .tools
                .iter()
                .map(|t| OpenAiTool {
                    kind: "function".to_string(),
                    function: OpenAiFunctionDefinition {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.input_schema.clone(),
                    },
                })
                .collect();
            (Some(tools), Some(request.tool_choice.unwrap_or(ToolChoice::Auto)))
        };

        Ok(OpenAiRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            tool_choice,
        })
    }

    fn convert_message(&self, msg: &ChatMessage) -> Result<OpenAiMessage> {
        match msg.role {
            ChatRole::System => Ok(OpenAiMessage::System {
                content: msg.text_content(),
            }),
            ChatRole::User => Ok(OpenAiMessage::User {
                content: msg.text_content(),
            }),
            ChatRole::Assistant => {
                let mut content_str = None;
                let mut tool_calls = Vec::new();

                match &msg.content {
                    MessagePart::Text(t) => {
                        content_str = Some(t.clone());
                    }
                    MessagePart::Parts(parts) => {
                        let mut text_parts = Vec::new();
                        for part in parts {
                            match part {
                                ContentBlock::Text { text } => text_parts.push(text.clone()),
                                ContentBlock::ToolUse { id, name, input } => {
                                    tool_calls.push(OpenAiToolCall {
                                        id: id.clone(),
                                        kind: "function".to_string(),
                                        function: OpenAiFunctionCall {
                                            name: name.clone(),
                                            arguments: serde_json::to_string(input)?,
                                        },
                                    });
                                }
                                ContentBlock::ToolResult { .. } => {}
                            }
                        }
                        if !text_parts.is_empty() {
                            content_str = Some(text_parts.join("\n"));
                        }
                    }
                }

                Ok(OpenAiMessage::Assistant {
                    content: content_str,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                })
            }
            ChatRole::Tool => {
                let (tool_call_id, content) = match &msg.content {
                    MessagePart::Parts(parts) => parts
                        .iter()
                        .find_map(|p| match p {
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                            } => Some((tool_use_id.clone(), content.clone())),
                            _ => None,
                        })
                        .ok_or_else(|| {
                            Error::Agent("Tool message missing ToolResult content".to_string())
                        })?,
                    _ => {
                        return Err(Error::Agent(
                            "Tool message must have Parts content with ToolResult".to_string(),
                        ));
                    }
                };

                Ok(OpenAiMessage::Tool {
                    tool_call_id,
                    content,
                })
            }
        }
    }

    fn convert_response(&self, response: OpenAiResponse) -> Result<LlmResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Agent(format!("no choices in {} response", self.name)))?;
        let message = choice.message;

        let mut content_blocks = Vec::new();

        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            content_blocks.push(ContentBlock::Text { text });
        }

        for tc in message.tool_calls.unwrap_or_default() {
            // Keep unparseable arguments as a raw string; the runtime rejects them.
            let input_json: serde_json::Value = serde_json::from_str(&tc.function.arguments)
                .unwrap_or(serde_json::Value::String(tc.function.arguments.clone()));

            content_blocks.push(ContentBlock::ToolUse {
                id: tc.id,
                name: tc.function.name,
                input: input_json,
            });
        }

        Ok(LlmResponse {
            content: content_blocks,
            model: response.model,
            usage: response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            stop_reason: choice.finish_reason,
        })
    }
}

// Request Types
#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum OpenAiMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<OpenAiToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionCall,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct OpenAiTool {
    #[serde(rename = "type")]
    kind: String,
    function: OpenAiFunctionDefinition,
}

#[derive(Serialize)]
struct OpenAiFunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// Response Types
#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
