//! Configuration management for goalrunner
//!
//! Provides TOML-based configuration with defaults and validation.
//! Location: ~/.goalrunner/config.toml

use crate::agent::OrchestratorConfig;
use crate::errors::{BotError, Result};
use crate::executor::ExecutorConfig;
use crate::planning::GoalConfig;
use crate::recovery::RecoveryConfig;
use crate::state::StateConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `api.token`
pub const TOKEN_ENV: &str = "GOALRUNNER_TOKEN";

/// Complete configuration for goalrunner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub actor: ActorConfig,
    pub executor: ExecutorConfig,
    pub goals: GoalConfig,
    pub state: StateConfig,
    pub orchestrator: OrchestratorConfig,
    pub paths: PathsConfig,
}

/// World API connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_secs: u64,
}

/// Controlled actor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    pub name: String,
}

/// File system paths configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub state_dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.artifactsmmo.com".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: "~/.goalrunner/state".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults, then apply the
    /// environment token override
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => Self::load_from_file(&config_path)?,
            None => Self::load_default()?,
        };
        config.apply_token_override(std::env::var(TOKEN_ENV).ok());
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BotError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| BotError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the standard location, or built-in defaults
    pub fn load_default() -> Result<Self> {
        match Self::config_path() {
            Some(config_path) if config_path.exists() => Self::load_from_file(&config_path),
            _ => Ok(Config::default()),
        }
    }

    /// Standard configuration file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".goalrunner").join("config.toml"))
    }

    /// A non-empty override replaces the configured token
    pub fn apply_token_override(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.api.token = Some(token);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| Err(BotError::ConfigError(message.to_string()));

        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            return Err(BotError::ConfigError(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }
        if self.api.timeout_secs == 0 {
            return invalid("api.timeout_secs must be greater than 0");
        }

        let goals = &self.goals;
        if !(0.0 < goals.critical_hp_fraction
            && goals.critical_hp_fraction < goals.low_hp_fraction
            && goals.low_hp_fraction <= 1.0)
        {
            return invalid("goals: expected 0 < critical_hp_fraction < low_hp_fraction <= 1");
        }
        if goals.history_window == 0 {
            return invalid("goals.history_window must be greater than 0");
        }
        if !(0.0 < goals.overselect_discount && goals.overselect_discount <= 1.0) {
            return invalid("goals.overselect_discount must be in (0, 1]");
        }

        let executor = &self.executor;
        if !(0.0 < executor.survival_hp_fraction
            && executor.survival_hp_fraction < executor.recovery_hp_fraction
            && executor.recovery_hp_fraction <= 1.0)
        {
            return invalid(
                "executor: expected 0 < survival_hp_fraction < recovery_hp_fraction <= 1",
            );
        }
        if executor.max_backoff_ms < executor.base_backoff_ms {
            return invalid("executor.max_backoff_ms must not be below base_backoff_ms");
        }
        if executor.max_cooldown_wait_ms == 0 {
            return invalid("executor.max_cooldown_wait_ms must be greater than 0");
        }

        if self.orchestrator.error_backoff_max_ms < self.orchestrator.error_backoff_base_ms {
            return invalid("orchestrator.error_backoff_max_ms must not be below error_backoff_base_ms");
        }

        Ok(())
    }

    /// Validation plus the settings only `run` needs
    pub fn validate_for_run(&self) -> Result<()> {
        self.validate()?;
        if self.actor.name.trim().is_empty() {
            return Err(BotError::ConfigError(
                "actor.name is required (set it in the config or pass --character)".to_string(),
            ));
        }
        if self.api.token.is_none() {
            return Err(BotError::ConfigError(format!(
                "an API token is required: set api.token or {}",
                TOKEN_ENV
            )));
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| BotError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BotError::ConfigError(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| BotError::ConfigError(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    /// Emergency thresholds follow the goal thresholds
    pub fn recovery(&self) -> RecoveryConfig {
        RecoveryConfig {
            critical_hp_fraction: self.goals.critical_hp_fraction,
            low_hp_fraction: self.goals.low_hp_fraction,
        }
    }

    /// Expand tilde in paths
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Get state directory path
    pub fn state_dir(&self) -> PathBuf {
        Self::expand_path(&self.paths.state_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::CooldownPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "https://api.artifactsmmo.com");
        assert_eq!(config.executor.max_retries, 3);
        assert_eq!(config.goals.cooldown_policy, CooldownPolicy::Filter);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_run_requires_actor_and_token() {
        let mut config = Config::default();
        assert!(config.validate_for_run().is_err());

        config.actor.name = "ada".to_string();
        assert!(config.validate_for_run().is_err());

        config.apply_token_override(Some("secret".to_string()));
        assert!(config.validate_for_run().is_ok());
    }

    #[test]
    fn test_blank_token_override_is_ignored() {
        let mut config = Config::default();
        config.api.token = Some("from-file".to_string());
        config.apply_token_override(Some("  ".to_string()));
        assert_eq!(config.api.token.as_deref(), Some("from-file"));
        config.apply_token_override(None);
        assert_eq!(config.api.token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_validation_hp_thresholds() {
        let mut config = Config::default();
        config.goals.critical_hp_fraction = 0.7;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.executor.recovery_hp_fraction = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_base_url() {
        let mut config = Config::default();
        config.api.base_url = "ftp://example.com".to_string();
        assert!(matches!(config.validate(), Err(BotError::ConfigError(_))));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[actor]
name = "ada"

[goals]
cooldown_policy = "defer"

[state]
safe_location = [4, 1]

[orchestrator]
max_cycles = 3
"#,
        )
        .unwrap();

        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.actor.name, "ada");
        assert_eq!(config.goals.cooldown_policy, CooldownPolicy::Defer);
        assert_eq!(config.state.safe_location, Some((4, 1)));
        assert_eq!(config.orchestrator.max_cycles, Some(3));
        assert_eq!(config.executor, ExecutorConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.actor.name = "ada".to_string();
        config.executor.max_subgoal_depth = 2;
        config.save(&path).unwrap();

        let loaded = Config::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[actor\nname = ").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(BotError::ConfigError(_))));
    }

    #[test]
    fn test_expand_path() {
        assert!(!Config::expand_path("~/.goalrunner").to_string_lossy().contains('~'));
        assert_eq!(Config::expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
