//! Supervisor configuration: defaults, optional TOML file, environment overrides

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escalation::engine::CoordinatorSettings;
use crate::escalation::triggers::TriggerThresholds;

/// Ten years; larger recent-escalation windows are rejected
pub const MAX_RECENT_WINDOW_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which implementation serves local intervention and passive analysis
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalBackend {
    #[default]
    RuleBased,
    LocalModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalModelConfig {
    pub backend: LocalBackend,
    /// OpenAI-compatible base URL including the version prefix
    pub base_url: String,
    pub model: String,
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            backend: LocalBackend::RuleBased,
            base_url: "http://localhost:1234/v1".to_string(),
            model: "llama-3.1-8b".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrongModelConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for StrongModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-3-opus-20240229".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub thresholds: TriggerThresholds,
    pub recent_escalation_window_secs: u64,
    pub history_retention: usize,
    pub interaction_retention: usize,
    pub local: LocalModelConfig,
    pub strong: StrongModelConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_webhook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_access_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_log_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            thresholds: TriggerThresholds::default(),
            recent_escalation_window_secs: 3600,
            history_retention: 500,
            interaction_retention: 500,
            local: LocalModelConfig::default(),
            strong: StrongModelConfig::default(),
            notification_webhook: None,
            remote_access_url: None,
            activity_log_path: Some(PathBuf::from("data/leo_activity.log")),
            request_timeout_secs: 120,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{name}={value:?} is not a valid number")))
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl SupervisorConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_with(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// TOML file, then environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env_with(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("LEODOCK_CONSECUTIVE_FAILURES") {
            self.thresholds.consecutive_failures = parse_var("LEODOCK_CONSECUTIVE_FAILURES", &v)?;
        }
        if let Some(v) = lookup("LEODOCK_FAILED_ATTEMPTS") {
            self.thresholds.failed_attempts = parse_var("LEODOCK_FAILED_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("LEODOCK_TIMEOUT_SECS") {
            self.thresholds.timeout_secs = parse_var("LEODOCK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LEODOCK_DEPENDENCY_ERRORS") {
            self.thresholds.dependency_errors = parse_var("LEODOCK_DEPENDENCY_ERRORS", &v)?;
        }
        if let Some(v) = lookup("LEODOCK_RECENT_WINDOW_SECS") {
            self.recent_escalation_window_secs = parse_var("LEODOCK_RECENT_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("LEODOCK_HISTORY_RETENTION") {
            self.history_retention = parse_var("LEODOCK_HISTORY_RETENTION", &v)?;
        }
        if let Some(v) = lookup("LEODOCK_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_var("LEODOCK_REQUEST_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("MOCK_LEO_SUPERVISOR") {
            self.local.backend = match v.trim().to_lowercase().as_str() {
                "false" | "0" | "no" => LocalBackend::LocalModel,
                _ => LocalBackend::RuleBased,
            };
        }
        if let Some(v) = lookup("LM_STUDIO_URL").and_then(non_empty) {
            self.local.base_url = v;
        }
        if let Some(v) = lookup("LM_STUDIO_MODEL").and_then(non_empty) {
            self.local.model = v;
        }
        if let Some(v) = lookup("LEODOCK_STRONG_URL").and_then(non_empty) {
            self.strong.base_url = v;
        }
        if let Some(v) = lookup("LEODOCK_STRONG_MODEL").and_then(non_empty) {
            self.strong.model = v;
        }
        if let Some(v) = lookup("ANTHROPIC_API_KEY").and_then(non_empty) {
            self.strong.api_key = Some(v);
        }
        if let Some(v) = lookup("ESCALATION_WEBHOOK_URL").and_then(non_empty) {
            self.notification_webhook = Some(v);
        }
        if let Some(v) = lookup("REMOTE_ACCESS_URL").and_then(non_empty) {
            self.remote_access_url = Some(v);
        }
        if let Some(v) = lookup("LEODOCK_ACTIVITY_LOG") {
            self.activity_log_path = non_empty(v).map(PathBuf::from);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        if t.consecutive_failures == 0 || t.failed_attempts == 0 || t.dependency_errors == 0 {
            return Err(ConfigError::Invalid(
                "trigger thresholds must be at least 1".to_string(),
            ));
        }
        if t.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_string()));
        }
        if self.recent_escalation_window_secs > MAX_RECENT_WINDOW_SECS {
            return Err(ConfigError::Invalid(format!(
                "recent_escalation_window_secs must be at most {MAX_RECENT_WINDOW_SECS}"
            )));
        }
        if self.history_retention == 0 || self.interaction_retention == 0 {
            return Err(ConfigError::Invalid("retention must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            thresholds: self.thresholds.clone(),
            recent_window_secs: self.recent_escalation_window_secs,
            history_retention: self.history_retention,
        }
    }

    /// Copy safe to print: the API key is masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.strong.api_key.is_some() {
            copy.strong.api_key = Some("***".to_string());
        }
        copy
    }
}
