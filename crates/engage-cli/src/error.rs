//! Error handling for the Engage CLI

use crate::config::ConfigError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Engage error: {0}")]
    Engage(#[from] engage_core::EngageError),

    #[error("Mission error: {0}")]
    Mission(#[from] engage_core::ConfigurationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Script error at line {line}: {reason}")]
    Script { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hex decoding error: {0}")]
    HexDecoding(#[from] hex::FromHexError),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

impl CliError {
    pub fn script(line: usize, reason: impl Into<String>) -> Self {
        CliError::Script {
            line,
            reason: reason.into(),
        }
    }
}
