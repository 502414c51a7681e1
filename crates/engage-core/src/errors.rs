//! Error types for the Engage core
//!
//! This module contains the error taxonomy used throughout the core: mission
//! configuration errors, group lifecycle errors, transmit arbitration errors,
//! engine event decoding errors, and the `EngageError` type that unifies them.
//!
//! Connectivity problems are reported through connection flags and health
//! notifications, never as errors.

use crate::protocol::events::EventDecodeError;
use crate::protocol::lifecycle::StateTransitionError;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Malformed or incomplete mission/group configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Malformed configuration JSON: {reason}")]
    MalformedJson { reason: String },
    #[error("Missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },
    #[error("Unknown group type ordinal {ordinal} for group {group_id}")]
    UnknownGroupType { group_id: String, ordinal: i64 },
    #[error("Duplicate group id {group_id}")]
    DuplicateGroup { group_id: String },
    #[error("Dynamic group {group_id} collides with a statically configured group")]
    StaticGroupCollision { group_id: String },
    #[error("Mission database error: {reason}")]
    Database { reason: String },
}

/// Group create/join failures and invalid lifecycle requests
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("No mission is loaded")]
    NoMission,
    #[error("Group not found: {group_id}")]
    GroupNotFound { group_id: String },
    #[error("Group {group_id} has no usable transport in the current mission")]
    NoUsableTransport { group_id: String },
    #[error("Group {group_id} rejected request: {source}")]
    Rejected {
        group_id: String,
        #[source]
        source: StateTransitionError,
    },
}

/// Transmit requests that fail fast
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransmitError {
    #[error("A transmit is already pending or active on {active} group(s)")]
    AlreadyActive { active: usize },
    #[error("No groups are selected for transmit")]
    NoGroupsSelected,
    #[error("None of the {selected} selected group(s) is eligible for transmit")]
    NoEligibleGroups { selected: usize },
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Main error type for the Engage core
#[derive(Debug, thiserror::Error)]
pub enum EngageError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Transmit error: {0}")]
    Transmit(#[from] TransmitError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    #[error("Event decode error: {0}")]
    Decode(#[from] EventDecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel error: {message}")]
    Channel { message: String },

    #[error("Invalid engine configuration: {reason}")]
    EngineConfiguration { reason: String },
}

impl EngageError {
    /// Create an engine configuration error
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        Self::EngineConfiguration {
            reason: reason.into(),
        }
    }

    /// Create a channel error
    pub fn channel_error<T: Into<String>>(message: T) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Whether the core logic task cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngageError::Channel { .. } | EngageError::EngineConfiguration { .. }
        )
    }
}

/// Result type alias for Engage operations
pub type Result<T> = core::result::Result<T, EngageError>;

/// Alias kept for call sites that prefer an explicit name
pub type EngageResult<T> = Result<T>;
