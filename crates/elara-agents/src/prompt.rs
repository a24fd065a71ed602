use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use elara_common::{Turn, TurnRole};
use elara_config::AgentConfig;
use tracing::warn;

use crate::providers::{ChatMessage, ChatRole};

const SEARCH_CONTEXT_INSTRUCTION: &str = "Live web search results for the user's question are \
below. Treat them as the ground truth for anything current, prefer them over what you \
remember, and mention a source when it helps the user.";

/// Builds the system instruction and the outbound message list.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    policy: String,
    timezone: Tz,
}

impl PromptBuilder {
    pub fn new(persona: impl Into<String>, policy: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            policy: policy.into(),
            timezone: Tz::UTC,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let timezone = config.timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!("unknown timezone '{}', using UTC", config.timezone);
            Tz::UTC
        });
        Self::new(config.persona.clone(), config.policy.clone()).with_timezone(timezone)
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Persona, policy, then the optional time line and search block, blank-line separated.
    pub fn system_prompt(&self, now: Option<DateTime<Utc>>, search_context: Option<&str>) -> String {
        let mut parts = Vec::new();
        if !self.persona.trim().is_empty() {
            parts.push(self.persona.clone());
        }
        if !self.policy.trim().is_empty() {
            parts.push(self.policy.clone());
        }
        if let Some(now) = now {
            let local = now.with_timezone(&self.timezone);
            parts.push(format!(
                "Current date and time: {} ({}).",
                local.format("%A, %d %B %Y, %I:%M %p"),
                self.timezone.name()
            ));
        }
        if let Some(ctx) = search_context.filter(|c| !c.trim().is_empty()) {
            parts.push(format!("{SEARCH_CONTEXT_INSTRUCTION}\n\n{ctx}"));
        }
        parts.join("\n\n")
    }

    /// `[system] + last `window` turns of history + [user]`. The new user message is always last.
    pub fn assemble(
        system: &str,
        history: &[Turn],
        window: usize,
        user_text: &str,
    ) -> Vec<ChatMessage> {
        let stored: Vec<&Turn> = history
            .iter()
            .filter(|t| t.role != TurnRole::System)
            .collect();
        let start = stored.len().saturating_sub(window);

        let mut messages = Vec::with_capacity(stored.len() - start + 2);
        messages.push(ChatMessage::text(ChatRole::System, system));
        messages.extend(stored[start..].iter().map(|t| ChatMessage::from(*t)));
        messages.push(ChatMessage::text(ChatRole::User, user_text));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn builder() -> PromptBuilder {
        PromptBuilder::new("You are Elara AI.", "Answer briefly.")
    }

    #[test]
    fn persona_precedes_policy() {
        let prompt = builder().system_prompt(None, None);
        assert_eq!(prompt, "You are Elara AI.\n\nAnswer briefly.");
    }

    #[test]
    fn time_line_uses_configured_timezone() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap();
        let prompt = builder()
            .with_timezone(chrono_tz::Asia::Kolkata)
            .system_prompt(Some(now), None);
        assert!(prompt.contains("Friday, 16 October 2026, 01:30 PM (Asia/Kolkata)"));
    }

    #[test]
    fn search_context_is_appended_verbatim_last() {
        let ctx = "Source: https://weather.example\nContent: 31C and sunny";
        let prompt = builder().system_prompt(None, Some(ctx));
        assert!(prompt.ends_with(ctx));
        assert!(prompt.contains("ground truth"));
    }

    #[test]
    fn empty_search_context_adds_nothing() {
        let prompt = builder().system_prompt(None, Some("  "));
        assert!(!prompt.contains("ground truth"));
    }

    #[test]
    fn from_config_falls_back_to_utc_on_bad_timezone() {
        let config = AgentConfig {
            timezone: "Mars/Olympus".into(),
            ..AgentConfig::default()
        };
        assert_eq!(PromptBuilder::from_config(&config).timezone(), Tz::UTC);
    }

    #[test]
    fn assemble_truncates_history_but_keeps_new_message() {
        let history: Vec<Turn> = (0..4)
            .flat_map(|i| [Turn::user(format!("q{i}")), Turn::assistant(format!("a{i}"))])
            .collect();

        let messages = PromptBuilder::assemble("sys", &history, 2, "new question");
        let texts: Vec<String> = messages.iter().map(|m| m.text_content()).collect();
        assert_eq!(texts, vec!["sys", "q3", "a3", "new question"]);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages.last().unwrap().role, ChatRole::User);
    }

    #[test]
    fn assemble_with_zero_window_sends_no_history() {
        let history = vec![Turn::user("old"), Turn::assistant("reply")];
        let messages = PromptBuilder::assemble("sys", &history, 0, "hi");
        assert_eq!(messages.len(), 2);
    }
}
