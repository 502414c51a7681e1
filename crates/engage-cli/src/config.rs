//! Engage CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Built-in defaults
//! - A TOML file (`engage.toml` in the working directory, or `--config`)
//! - Environment variables prefixed with `ENGAGE_`, nested with `__`
//!   (for example `ENGAGE_ENGINE__TRANSMIT__UNMUTE_DELAY_MS=250`)

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use engage_core::{types::generate_braced_id, EngineConfig, NodeId};

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "engage.toml";
const ENV_PREFIX: &str = "ENGAGE_";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the Engage CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Runtime configuration handed to the core logic task
    pub engine: EngineConfig,

    pub identity: IdentityConfig,

    pub replay: ReplayConfig,
}

/// Local node identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Fixed node id; a fresh braced id is generated when unset
    pub node_id: Option<String>,
}

/// Scripted replay behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Pause after each script step before collecting output
    pub settle_ms: u64,

    /// Print the engine effects produced by each step
    pub show_effects: bool,

    pub shutdown_timeout_secs: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            settle_ms: 50,
            show_effects: true,
            shutdown_timeout_secs: 5,
        }
    }
}

impl ReplayConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

// ----------------------------------------------------------------------------
// Loading
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Defaults, then `engage.toml` if present, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(DEFAULT_CONFIG_FILE))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Defaults, then the given file, then the environment
    ///
    /// Unlike [`AppConfig::load`], a missing file is an error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileSystem(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::FileSystem(format!("Failed to create config directory: {}", e)))?;
        }

        let text = self.to_toml()?;
        std::fs::write(path.as_ref(), text)
            .map_err(|e| ConfigError::FileSystem(format!("Failed to write config file: {}", e)))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialization(format!("Failed to serialize config: {}", e)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate().map_err(ConfigError::Validation)?;

        if let Some(node_id) = &self.identity.node_id {
            if node_id.trim().is_empty() || node_id.chars().any(char::is_whitespace) {
                return Err(ConfigError::Validation(format!("Invalid node id: {:?}", node_id)));
            }
        }

        if self.replay.shutdown_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "Replay shutdown timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Configured node id, or a freshly generated one
    pub fn node_id(&self) -> NodeId {
        match &self.identity.node_id {
            Some(id) => NodeId::new(id.clone()),
            None => NodeId::new(generate_braced_id()),
        }
    }

    /// Example configuration file content
    pub fn example_config() -> String {
        let example = AppConfig {
            identity: IdentityConfig {
                node_id: Some("{00000000-0000-0000-0000-000000000001}".to_string()),
            },
            ..Default::default()
        };
        example
            .to_toml()
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment error: {0}")]
    Environment(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("engage-cli-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.identity.node_id.is_none());
        assert_eq!(config.replay.settle(), Duration::from_millis(50));
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.identity.node_id = Some("has space".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = AppConfig::default();
        config.engine.health.interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = AppConfig::default();
        config.replay.shutdown_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_node_id_generation() {
        let mut config = AppConfig::default();
        let generated = config.node_id();
        assert!(generated.as_str().starts_with('{'));
        assert_ne!(generated, config.node_id());

        config.identity.node_id = Some("{me}".to_string());
        assert_eq!(config.node_id().as_str(), "{me}");
    }

    #[test]
    fn test_save_and_load_from_file() {
        let path = temp_path("roundtrip.toml");
        let mut config = AppConfig::default();
        config.identity.node_id = Some("{saved}".to_string());
        config.engine.transmit.unmute_delay_ms = 321;
        config.replay.show_effects = false;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.identity.node_id.as_deref(), Some("{saved}"));
        assert_eq!(loaded.engine.transmit.unmute_delay_ms, 321);
        assert!(!loaded.replay.show_effects);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let path = temp_path("partial.toml");
        std::fs::write(&path, "[replay]\nsettle_ms = 5\n").unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.replay.settle_ms, 5);
        assert_eq!(loaded.engine, EngineConfig::default());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let path = temp_path("invalid.toml");
        std::fs::write(&path, "[engine.health]\ninterval_ms = 0\n").unwrap();
        assert!(matches!(AppConfig::load_from_file(&path), Err(ConfigError::Validation(_))));
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            AppConfig::load_from_file(temp_path("missing.toml")),
            Err(ConfigError::FileSystem(_))
        ));
    }

    #[test]
    fn test_example_config_generation() {
        let example = AppConfig::example_config();
        assert!(example.contains("[identity]"));
        assert!(example.contains("[replay]"));
        assert!(example.contains("[engine.transmit]"));
    }
}
