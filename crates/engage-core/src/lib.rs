//! Engage Core
//!
//! Foundational types for the Engage push-to-talk group communication core:
//! the mission configuration model, presence descriptors, the per-group
//! lifecycle and transmit state machines, connection and failover tracking,
//! and the typed channel protocol spoken between the UI, the core logic task
//! and the engine.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod errors;
pub mod license;
pub mod mission;
pub mod presence;
pub mod protocol;
pub mod transport;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{AppEvent, ChannelError, Command, Effect, GroupSnapshot};
pub use config::{ConfigPresets, EngineConfig, EngineConfigBuilder, SharedEngineConfig};
pub use errors::{
    ConfigurationError, EngageError, EngageResult, LifecycleError, Result, TransmitError,
};
pub use license::{LicenseCredentials, LicenseDescriptor, LicenseState};
pub use mission::{GroupDescriptor, MissionConfiguration, MissionDatabase};
pub use presence::{GroupMembershipTracker, MemberStatus, PresenceDescriptor};
pub use protocol::{
    EngineEvent, EventDecodeError, GroupLifecycle, GroupRuntimeState, LifecycleState, RawEngineEvent,
    StateTransitionError, TxOutcome, TxState,
};
pub use transport::{ConnectionTracker, GroupConnectionState, TransportPlan};
pub use types::{GroupId, GroupType, NodeId, TimeSource, Timestamp, UiMode};
