//! Session state managers
//!
//! Each manager owns one table of the session and is driven exclusively by
//! the core logic task:
//! - `groups`: active mission, per-group lifecycle and runtime state
//! - `connection`: per-group connectivity and failover tracking
//! - `presence`: the node table
//! - `transmit`: the cross-group transmit set

pub mod connection;
pub mod groups;
pub mod presence;
pub mod transmit;

pub use connection::{ConnectionAuditEntry, ConnectionManager, ConnectionStats};
pub use groups::{CreateRequest, GroupManager, GroupStats, MissionChange};
pub use presence::{PresenceManager, PresenceStats};
pub use transmit::{TransmitManager, TransmitStats, TxOutput};
