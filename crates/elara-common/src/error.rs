/// Errors shared across Elara crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("agent error: {0}")]
    Agent(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("media error: {0}")]
    Media(String),

    #[error("session error: {0}")]
    Session(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category_and_detail() {
        let err = Error::Agent("openai API error: status=503".to_string());
        assert_eq!(err.to_string(), "agent error: openai API error: status=503");
    }

    #[test]
    fn serde_errors_convert() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
