use std::sync::Arc;

use tracing::{debug, warn};

use crate::providers::{ChatMessage, ChatRole, LlmProvider, LlmRequest};

const DECISION_INSTRUCTION: &str = "You decide whether a user's message needs live information \
from the internet to be answered well. Answer YES when it asks about current events, news, \
weather, prices, exchange rates, sports scores, schedules, recent releases, or anything that \
depends on today's date. Answer NO for general knowledge, advice, opinions, jokes, writing, \
math, coding and small talk. Reply with exactly one word: YES or NO.";

/// Classifies whether a query needs a live web search, using a fast model.
///
/// Fails closed: if the classifier call errors, no search is performed.
pub struct SearchDecider {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl SearchDecider {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn needs_search(&self, query: &str) -> bool {
        let mut request = LlmRequest::new(
            self.model.clone(),
            vec![ChatMessage::text(ChatRole::User, query)],
        );
        request.system = Some(DECISION_INSTRUCTION.to_string());
        request.temperature = Some(0.0);
        request.max_tokens = Some(5);

        match self.provider.complete(&request).await {
            Ok(response) => {
                let verdict = parse_decision(&response.text());
                debug!("search decision for query: {}", verdict);
                verdict
            }
            Err(e) => {
                warn!("search decision failed, skipping web search: {}", e);
                false
            }
        }
    }
}

/// `true` iff the classifier reply contains "YES" in any case.
pub fn parse_decision(reply: &str) -> bool {
    reply.to_ascii_uppercase().contains("YES")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ContentBlock, LlmResponse};
    use elara_common::{Error, Result};
    use std::sync::Mutex;

    struct ClassifierMock {
        reply: std::result::Result<&'static str, &'static str>,
        seen: Mutex<Vec<LlmRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for ClassifierMock {
        fn provider_id(&self) -> &str {
            "mock"
        }

        async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
            self.seen.lock().unwrap().push(request.clone());
            match self.reply {
                Ok(text) => Ok(LlmResponse {
                    content: vec![ContentBlock::Text { text: text.into() }],
                    model: request.model.clone(),
                    usage: None,
                    stop_reason: Some("stop".into()),
                }),
                Err(e) => Err(Error::Agent(e.into())),
            }
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    fn decider(reply: std::result::Result<&'static str, &'static str>) -> (SearchDecider, Arc<ClassifierMock>) {
        let mock = Arc::new(ClassifierMock {
            reply,
            seen: Mutex::new(Vec::new()),
        });
        (SearchDecider::new(mock.clone(), "fast-model"), mock)
    }

    #[test]
    fn parse_decision_is_case_insensitive() {
        assert!(parse_decision("YES"));
        assert!(parse_decision("yes."));
        assert!(parse_decision(" Yes"));
        assert!(!parse_decision("NO"));
        assert!(!parse_decision(""));
    }

    #[tokio::test]
    async fn yes_reply_requests_search() {
        let (decider, mock) = decider(Ok("YES"));
        assert!(decider.needs_search("What's the weather in Delhi today?").await);

        let seen = mock.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "fast-model");
        assert_eq!(seen[0].temperature, Some(0.0));
        assert!(seen[0].tools.is_empty());
    }

    #[tokio::test]
    async fn no_reply_skips_search() {
        let (decider, _) = decider(Ok("NO"));
        assert!(!decider.needs_search("Tell me a joke").await);
    }

    #[tokio::test]
    async fn provider_failure_fails_closed() {
        let (decider, _) = decider(Err("groq API error: status=503"));
        assert!(!decider.needs_search("latest news").await);
    }
}
