//! Transport Module
//!
//! Per-group transport decisions. The engine owns the sockets; this module
//! decides multicast versus rallypoint for each group and tracks what the
//! engine reports back about connectivity and failover.

pub mod failover;
pub mod plan;

pub use failover::{
    ConnectionChange, ConnectionDetail, ConnectionEventKind, ConnectionTracker, ConnectionType, DisconnectReason,
    FailoverDecision, GroupConnectionState,
};
pub use plan::{TransportPlan, ANONYMOUS_ALIAS, DEFAULT_NETWORK_QOS_PRIORITY, DEFAULT_NETWORK_TX_TTL};
