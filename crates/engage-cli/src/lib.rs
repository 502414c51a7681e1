//! Engage CLI library
//!
//! Components behind the `engage` binary: argument parsing, layered
//! configuration, mission tooling and scripted session replay.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod script;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{AppConfig, ConfigError};
pub use error::{CliError, Result};
pub use script::{ScriptStep, ScriptedEngine};
