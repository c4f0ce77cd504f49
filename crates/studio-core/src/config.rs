//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level studio configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Configuration for the model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_id")]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

fn default_provider_id() -> String {
    "anthropic".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            id: default_provider_id(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            model: None,
        }
    }
}

impl ProviderConfig {
    /// Resolve the API key: check `api_key` first, then `api_key_env`,
    /// then `ANTHROPIC_API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        let env = self
            .api_key_env
            .clone()
            .or_else(|| Some(DEFAULT_API_KEY_ENV.to_string()));
        resolve_secret_field(&self.api_key, &env)
    }
}

const DEFAULT_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tool_iterations: Option<u32>,

    /// Replaces the default identity line of the system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub restrict_to_workspace: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "studio_agent=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    static PATTERN: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").expect("static env-var pattern")
    });
    PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse config text (JSON5) after env-var substitution.
    pub fn parse(raw: &str) -> crate::error::Result<Self> {
        let substituted = substitute_env_vars(raw);
        json5::from_str(&substituted)
            .map_err(|e| crate::error::StudioError::Config(e.to_string()))
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    fn agent(&self) -> Option<&AgentConfig> {
        self.agent.as_ref()
    }

    /// Resolve the workspace directory tools operate in.
    pub fn workspace_dir(&self) -> PathBuf {
        self.agent()
            .and_then(|a| a.workspace.as_ref())
            .map(|w| {
                let expanded = shellexpand::tilde(w);
                PathBuf::from(expanded.as_ref())
            })
            .unwrap_or_else(|| data_dir().join("workspace"))
    }

    /// Model name, from the provider section or the built-in default.
    pub fn model(&self) -> String {
        self.provider
            .as_ref()
            .and_then(|p| p.model.clone())
            .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.agent().and_then(|a| a.max_tokens).unwrap_or(4096)
    }

    pub fn max_tool_iterations(&self) -> u32 {
        self.agent()
            .and_then(|a| a.max_tool_iterations)
            .unwrap_or(25)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.agent().and_then(|a| a.temperature)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.agent().and_then(|a| a.system_prompt.as_deref())
    }

    pub fn restrict_to_workspace(&self) -> bool {
        self.agent()
            .and_then(|a| a.restrict_to_workspace)
            .unwrap_or(true)
    }

    /// Provider section, falling back to defaults when absent.
    pub fn provider(&self) -> ProviderConfig {
        self.provider.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Get a config value by dotted path (e.g. "agent.max_tokens").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let provider = self.provider();
        if provider.resolve_api_key().is_none() {
            warnings.push(format!(
                "Provider '{}' has no API key configured",
                provider.id
            ));
        }
        if provider.id != "anthropic" {
            errors.push(format!("Unsupported provider '{}'", provider.id));
        }

        if let Some(agent) = &self.agent {
            if agent.max_tool_iterations == Some(0) {
                errors.push("agent.max_tool_iterations cannot be 0".to_string());
            }
            if agent.max_tokens == Some(0) {
                errors.push("agent.max_tokens cannot be 0".to_string());
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                errors.push(format!("Unknown log format '{}'", logging.format));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for studio data: `~/.studio/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".studio")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, the variable name is unique to this test
        unsafe { std::env::set_var("TEST_STUDIO_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_STUDIO_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_STUDIO_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_STUDIO_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert_eq!(result, r#"{"key": ""}"#);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_tokens(), 4096);
        assert_eq!(config.max_tool_iterations(), 25);
        assert_eq!(config.model(), "claude-sonnet-4-20250514");
        assert!(config.restrict_to_workspace());
        assert!(config.workspace_dir().ends_with(".studio/workspace"));
    }

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.provider.is_none());
    }

    #[test]
    fn test_load_json5_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                provider: { model: "claude-test", base_url: "http://localhost:9" },
                agent: { max_tool_iterations: 4, workspace: "/tmp/docs" },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.model(), "claude-test");
        assert_eq!(config.max_tool_iterations(), 4);
        assert_eq!(config.workspace_dir(), PathBuf::from("/tmp/docs"));
        assert_eq!(config.provider().id, "anthropic");
    }

    #[test]
    fn test_provider_resolve_api_key() {
        // SAFETY: test-only, the variable name is unique to this test
        unsafe { std::env::set_var("TEST_STUDIO_API_KEY", "from-env") };
        let provider = ProviderConfig {
            api_key_env: Some("TEST_STUDIO_API_KEY".into()),
            ..ProviderConfig::default()
        };
        assert_eq!(provider.resolve_api_key(), Some("from-env".into()));

        let provider2 = ProviderConfig {
            api_key_env: Some("TEST_STUDIO_API_KEY".into()),
            api_key: Some("direct-key".into()),
            ..ProviderConfig::default()
        };
        // Direct key takes priority
        assert_eq!(provider2.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_STUDIO_API_KEY") };
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = Config::parse(r#"{ "logging": {} }"#).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert_eq!(logging.output, "stderr");
        assert!(logging.filters.is_empty());
    }

    #[test]
    fn test_logging_config_filters() {
        let config = Config::parse(
            r#"{
                "logging": {
                    "format": "json",
                    "filters": ["studio_agent=debug", "studio_providers=trace"]
                }
            }"#,
        )
        .unwrap();
        let logging = config.logging();
        assert_eq!(logging.format, "json");
        assert_eq!(logging.filters.len(), 2);
        assert_eq!(logging.filters[0], "studio_agent=debug");
    }

    #[test]
    fn test_get_path() {
        let config = Config::parse(r#"{ agent: { max_tokens: 1024 } }"#).unwrap();
        assert_eq!(
            config.get_path("agent.max_tokens"),
            Some(serde_json::json!(1024))
        );
        assert!(config.get_path("agent.nope").is_none());
    }

    #[test]
    fn test_validate_zero_iterations_errors() {
        let config = Config {
            agent: Some(AgentConfig {
                max_tool_iterations: Some(0),
                ..AgentConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(
            errors.iter().any(|e| e.contains("max_tool_iterations")),
            "Expected an error about max_tool_iterations, got: {errors:?}"
        );
    }

    #[test]
    fn test_validate_bad_log_format() {
        let config = Config::parse(r#"{ logging: { format: "xml" } }"#).unwrap();
        let (_warnings, errors) = config.validate();
        assert!(errors.iter().any(|e| e.contains("xml")));
    }

    #[test]
    fn test_validate_missing_api_key_warns() {
        let config = Config {
            provider: Some(ProviderConfig {
                api_key_env: Some("NONEXISTENT_STUDIO_KEY_ENV".into()),
                ..ProviderConfig::default()
            }),
            ..Config::default()
        };
        let (warnings, _errors) = config.validate();
        assert!(
            warnings.iter().any(|w| w.contains("anthropic") && w.contains("API key")),
            "Expected a warning about missing API key, got: {warnings:?}"
        );
    }
}
