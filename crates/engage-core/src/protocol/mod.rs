//! Protocol Module
//!
//! State machines and engine-facing message types:
//! - `lifecycle`: per-group create/join/leave lifecycle and runtime state
//! - `transmit`: transmit state, outcomes and begin-transmit parameters
//! - `events`: engine events and their validating decode

pub mod events;
pub mod lifecycle;
pub mod transmit;

pub use events::{
    BlobInfo, BlobPayloadType, EngineEvent, EventDecodeError, GroupCreationDetail, RawEngineEvent, NULL_NODE_ID,
};
pub use lifecycle::{
    AuditEntry, GroupLifecycle, GroupRuntimeState, LifecycleEvent, LifecycleState, StateTransition,
    StateTransitionError,
};
pub use transmit::{AdvancedTxParams, GroupTxDetail, TxEvent, TxOutcome, TxState, TxStatus};
