use std::path::Path;

use elara_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Loads [`AppConfig`] from an optional YAML/TOML file followed by environment overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration the way the service does at startup: file (if any), then process env.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => AppConfig::default(),
        };
        Self::apply_env(&mut config, |key| std::env::var(key).ok())?;
        Self::validate(&config)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<AppConfig> {
        info!("loading config from {}", path.display());
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid TOML in {}: {e}", path.display())))
        } else {
            serde_yaml::from_str(&raw)
                .map_err(|e| Error::Config(format!("invalid YAML in {}: {e}", path.display())))
        }
    }

    /// Apply environment overrides using `lookup` as the variable source.
    pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GROQ_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Some(key) = get("TAVILY_API_KEY") {
            config.search.api_key = Some(key);
        }
        if let Some(host) = get("HOST") {
            config.gateway.host = host;
        }
        if let Some(port) = get("PORT") {
            config.gateway.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got '{port}'")))?;
        }
        if let Some(url) = get("ELARA_LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Some(models) = get("ELARA_MODELS") {
            config.llm.models = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(model) = get("ELARA_DECISION_MODEL") {
            config.llm.decision_model = model;
        }
        if let Some(strategy) = get("ELARA_SEARCH_STRATEGY") {
            config.search.strategy = strategy.parse().map_err(Error::Config)?;
        }
        if let Some(window) = get("ELARA_HISTORY_WINDOW") {
            config.sessions.history_window = window.trim().parse().map_err(|_| {
                Error::Config(format!("ELARA_HISTORY_WINDOW must be a number, got '{window}'"))
            })?;
        }
        if let Some(tz) = get("ELARA_TIMEZONE") {
            config.agent.timezone = tz;
        }

        debug!("environment overrides applied");
        Ok(())
    }

    pub fn validate(config: &AppConfig) -> Result<()> {
        if config.llm.models.iter().all(|m| m.trim().is_empty()) {
            return Err(Error::Config("llm.models must name at least one model".into()));
        }
        if config.sessions.capacity == 0 {
            return Err(Error::Config("sessions.capacity must be greater than zero".into()));
        }
        if config.search.max_results == 0 {
            return Err(Error::Config("search.max_results must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DEFAULT_PORT, SearchStrategy};
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.gateway.port, DEFAULT_PORT);
        assert_eq!(config.sessions.history_window, 6);
        assert_eq!(config.search.max_results, 3);
        assert!(ConfigLoader::validate(&config).is_ok());
    }

    #[test]
    fn env_overrides_keys_port_and_models() {
        let vars = env(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("TAVILY_API_KEY", "tvly-test"),
            ("PORT", "8080"),
            ("ELARA_MODELS", "model-a, model-b,,"),
            ("ELARA_SEARCH_STRATEGY", "inject"),
        ]);
        let mut config = AppConfig::default();
        ConfigLoader::apply_env(&mut config, |k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("gsk_test"));
        assert_eq!(config.search.api_key.as_deref(), Some("tvly-test"));
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.llm.models, vec!["model-a", "model-b"]);
        assert_eq!(config.search.strategy, SearchStrategy::Inject);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let vars = env(&[("GROQ_API_KEY", "   ")]);
        let mut config = AppConfig::default();
        ConfigLoader::apply_env(&mut config, |k| vars.get(k).cloned()).unwrap();
        assert!(config.llm.api_key.is_none());
    }

    #[test]
    fn invalid_port_is_a_config_error() {
        let vars = env(&[("PORT", "not-a-port")]);
        let mut config = AppConfig::default();
        let err = ConfigLoader::apply_env(&mut config, |k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn loads_yaml_file_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(
            file,
            "gateway:\n  port: 9000\nsessions:\n  history_window: 4\nsearch:\n  strategy: inject"
        )
        .unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.sessions.history_window, 4);
        assert_eq!(config.search.strategy, SearchStrategy::Inject);
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[llm]\nmodels = [\"only-model\"]\nmax_tokens = 256").unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.llm.models, vec!["only-model"]);
        assert_eq!(config.llm.max_tokens, 256);
    }

    #[test]
    fn empty_model_list_fails_validation() {
        let mut config = AppConfig::default();
        config.llm.models.clear();
        assert!(ConfigLoader::validate(&config).is_err());
    }
}
