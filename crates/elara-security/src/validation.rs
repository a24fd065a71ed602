use elara_common::{Error, Result};

/// Maximum accepted length of a single user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 8000;

/// Maximum accepted length of a session identifier.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Checks applied to inbound request fields before any upstream call is made.
pub struct InputValidator;

impl InputValidator {
    /// Reject blank or oversized messages. Returns the trimmed message.
    pub fn validate_message(message: &str) -> Result<&str> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(Error::Validation("message must not be empty".into()));
        }
        let chars = trimmed.chars().count();
        if chars > MAX_MESSAGE_CHARS {
            return Err(Error::Validation(format!(
                "message is {chars} characters, the limit is {MAX_MESSAGE_CHARS}"
            )));
        }
        Ok(trimmed)
    }

    /// Session ids are opaque, but restricted to a URL-safe alphabet so they can sit in paths.
    pub fn validate_session_id(session_id: &str) -> Result<()> {
        if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::Validation(format!(
                "session id must be 1-{MAX_SESSION_ID_LEN} characters"
            )));
        }
        let valid = session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::Validation(
                "session id may only contain letters, digits, '-', '_' and '.'".into(),
            ));
        }
        Ok(())
    }
}
