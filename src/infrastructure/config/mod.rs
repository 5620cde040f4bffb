//! Configuration loading and snapshots.
//!
//! Hierarchical merge of programmatic defaults, project YAML, and
//! environment variables. The running process consumes immutable `Arc`
//! snapshots; a reload swaps the snapshot atomically while in-flight
//! investigations keep the one they started with.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::domain::models::PolicyContext;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_turns: {0}. Must be between 1 and 100")]
    InvalidMaxTurns(usize),

    #[error("Invalid rate limit: {0}. Must be positive")]
    InvalidRateLimit(u32),

    #[error("Invalid event buffer: {0}. Must be at least 16")]
    InvalidEventBuffer(usize),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8460 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".faultline/faultline.db".to_string(), max_connections: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    /// Cheaper model for pairwise correlation classification.
    pub correlation_model: String,
    pub rate_limit_rps: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            model: "openai/gpt-4o-mini".to_string(),
            correlation_model: "openai/gpt-4o-mini".to_string(),
            rate_limit_rps: 10,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationConfig {
    /// Supervisor loop turn ceiling.
    pub max_turns: usize,
    /// Sub-agent iteration ceiling.
    pub agent_max_iterations: usize,
    /// Sub-agent wall-clock budget, seconds.
    pub agent_timeout_secs: u64,
    /// Approval rendezvous deadline, seconds.
    pub approval_timeout_secs: u64,
    /// Owner-reference traversal depth cap.
    pub max_owner_depth: usize,
    /// Candidate predecessors per FPG insertion.
    pub max_candidates: usize,
    /// Per-subscriber live event buffer.
    pub event_buffer: usize,
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            max_turns: 24,
            agent_max_iterations: 10,
            agent_timeout_secs: 300,
            approval_timeout_secs: 120,
            max_owner_depth: 5,
            max_candidates: 5,
            event_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Operator HTTP proxy base URL.
    pub operator_url: String,
    /// Default cluster context for requests that do not name one.
    pub default_context: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self { operator_url: "http://localhost:4688".to_string(), default_context: String::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    /// Optional log file directory; stdout only when unset.
    pub directory: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string(), directory: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub investigation: InvestigationConfig,
    pub cluster: ClusterConfig,
    pub logging: LoggingConfig,
    pub policy: PolicyContext,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.faultline/config.yaml`
    /// 3. `.faultline/local.yaml`
    /// 4. `FAULTLINE_`-prefixed environment variables
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".faultline/config.yaml"))
            .merge(Yaml::file(".faultline/local.yaml"))
            .merge(Env::prefixed("FAULTLINE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.investigation.max_turns == 0 || config.investigation.max_turns > 100 {
            return Err(ConfigError::InvalidMaxTurns(config.investigation.max_turns));
        }

        if config.llm.rate_limit_rps == 0 {
            return Err(ConfigError::InvalidRateLimit(config.llm.rate_limit_rps));
        }

        if config.investigation.event_buffer < 16 {
            return Err(ConfigError::InvalidEventBuffer(config.investigation.event_buffer));
        }

        Ok(())
    }
}

/// Atomically replaceable configuration snapshot. Readers clone the `Arc`;
/// a reload swaps the pointer without touching snapshots already handed out.
pub struct ConfigStore {
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    pub fn new(config: Config) -> Self {
        Self { current: RwLock::new(Arc::new(config)) }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.current.read().expect("config lock poisoned").clone()
    }

    pub fn replace(&self, config: Config) {
        *self.current.write().expect("config lock poisoned") = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        ConfigLoader::validate(&Config::default()).unwrap();
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = Config::default();
        config.logging.level = "chatty".to_string();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLogLevel(_))));

        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath)));

        let mut config = Config::default();
        config.investigation.max_turns = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidMaxTurns(0))));

        let mut config = Config::default();
        config.investigation.event_buffer = 4;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidEventBuffer(4))));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "server:\n  port: 9999\npolicy:\n  recon_mode: true\n  web_search_enabled: false\n  deny_list: []\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert!(config.policy.recon_mode);
        // Untouched sections keep their defaults
        assert_eq!(config.investigation.max_candidates, 5);
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let store = ConfigStore::new(Config::default());
        let snapshot = store.snapshot();

        let mut updated = Config::default();
        updated.policy.recon_mode = true;
        store.replace(updated);

        // The old snapshot is untouched; new readers see the new one.
        assert!(!snapshot.policy.recon_mode);
        assert!(store.snapshot().policy.recon_mode);
    }
}
