//! Per-group connection tracking and multicast failover evaluation
//!
//! The engine reports connect, connect-failed and disconnect events per
//! transport. A [`ConnectionTracker`] folds those reports into the group's
//! `{multicast, rallypoint, failover}` flags and remembers when multicast was
//! lost so the runtime can tell when a failover is due.

use crate::config::MulticastFailoverConfig;
use crate::types::{GroupId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

// ----------------------------------------------------------------------------
// Connection Detail
// ----------------------------------------------------------------------------

/// Transport named in a connection detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionType {
    #[default]
    Undefined,
    IpMulticast,
    Rallypoint,
}

impl ConnectionType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ConnectionType::IpMulticast,
            2 => ConnectionType::Rallypoint,
            _ => ConnectionType::Undefined,
        }
    }
}

/// Why a transport went away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DisconnectReason {
    #[default]
    NoReason,
    NoLink,
    Unregistered,
    NotAllowed,
    GeneralDenial,
}

impl DisconnectReason {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => DisconnectReason::NoLink,
            2 => DisconnectReason::Unregistered,
            3 => DisconnectReason::NotAllowed,
            4 => DisconnectReason::GeneralDenial,
            _ => DisconnectReason::NoReason,
        }
    }
}

/// `groupConnectionDetail` carried with connection events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDetail {
    pub id: String,
    pub connection_type: ConnectionType,
    pub peer: Option<String>,
    pub as_failover: bool,
    pub reason: DisconnectReason,
}

impl ConnectionDetail {
    pub fn new(id: impl Into<String>, connection_type: ConnectionType, as_failover: bool) -> Self {
        Self {
            id: id.into(),
            connection_type,
            peer: None,
            as_failover,
            reason: DisconnectReason::NoReason,
        }
    }

    /// Decode from event extra JSON, either nested under `groupConnectionDetail` or bare
    ///
    /// Returns `None` when the text is not JSON or names no transport.
    pub fn from_event_json(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let object = value
            .get("groupConnectionDetail")
            .and_then(Value::as_object)
            .or_else(|| value.as_object())?;

        let connection_type = ConnectionType::from_code(object.get("connectionType")?.as_i64()?);
        Some(Self {
            id: object
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            connection_type,
            peer: object.get("peer").and_then(Value::as_str).map(str::to_string),
            as_failover: object.get("asFailover").and_then(Value::as_bool).unwrap_or(false),
            reason: DisconnectReason::from_code(object.get("reason").and_then(Value::as_i64).unwrap_or(0)),
        })
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Transport flags of one group, independent of its join state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupConnectionState {
    pub has_multicast_connection: bool,
    pub has_rp_connection: bool,
    pub operating_in_multicast_failover: bool,
}

impl GroupConnectionState {
    pub fn is_connected_in_some_way(&self) -> bool {
        self.has_multicast_connection || self.has_rp_connection
    }
}

/// Kind of connection report from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEventKind {
    Connected,
    ConnectFailed,
    Disconnected,
}

/// What applying a report did to the tracked state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionChange {
    pub changed: bool,
    /// The report carried no usable detail
    pub ambiguous: bool,
}

/// Result of a failover evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverDecision {
    NotDue,
    FailoverDue { lost_for_ms: u64 },
}

// ----------------------------------------------------------------------------
// Connection Tracker
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTracker {
    pub group_id: GroupId,
    state: GroupConnectionState,
    multicast_lost_at: Option<Timestamp>,
    relay_planned: bool,
    failover_announced: bool,
}

impl ConnectionTracker {
    pub fn new(group_id: GroupId, relay_planned: bool) -> Self {
        Self {
            group_id,
            state: GroupConnectionState::default(),
            multicast_lost_at: None,
            relay_planned,
            failover_announced: false,
        }
    }

    pub fn state(&self) -> GroupConnectionState {
        self.state
    }

    pub fn is_connected_in_some_way(&self) -> bool {
        self.state.is_connected_in_some_way()
    }

    pub fn multicast_lost_at(&self) -> Option<Timestamp> {
        self.multicast_lost_at
    }

    pub fn relay_planned(&self) -> bool {
        self.relay_planned
    }

    pub fn set_relay_planned(&mut self, planned: bool) {
        self.relay_planned = planned;
    }

    /// Back to all-false, as after a fresh create
    pub fn reset(&mut self) {
        self.state = GroupConnectionState::default();
        self.multicast_lost_at = None;
        self.failover_announced = false;
    }

    /// Fold one engine connection report into the tracked state
    ///
    /// A connect report without detail still marks multicast as up so the
    /// group is never shown disconnected after a successful connect. A
    /// failure or disconnect without detail leaves the state untouched.
    pub fn apply(
        &mut self,
        kind: ConnectionEventKind,
        detail: Option<&ConnectionDetail>,
        now: Timestamp,
    ) -> ConnectionChange {
        let before = self.state;
        let connection_type = detail
            .map(|d| d.connection_type)
            .unwrap_or(ConnectionType::Undefined);
        let as_failover = detail.is_some_and(|d| d.as_failover);

        let ambiguous = match (kind, connection_type) {
            (ConnectionEventKind::Connected, ConnectionType::IpMulticast) => {
                self.multicast_restored();
                self.state.operating_in_multicast_failover = as_failover;
                false
            }
            (ConnectionEventKind::Connected, ConnectionType::Rallypoint) => {
                self.state.has_rp_connection = true;
                self.state.operating_in_multicast_failover = as_failover;
                false
            }
            (ConnectionEventKind::Connected, ConnectionType::Undefined) => {
                warn!(group_id = %self.group_id, "Connected without connection detail; assuming multicast");
                self.multicast_restored();
                true
            }
            (_, ConnectionType::IpMulticast) => {
                self.state.has_multicast_connection = false;
                self.state.operating_in_multicast_failover = false;
                if self.multicast_lost_at.is_none() {
                    self.multicast_lost_at = Some(now);
                }
                false
            }
            (_, ConnectionType::Rallypoint) => {
                self.state.has_rp_connection = false;
                self.state.operating_in_multicast_failover = false;
                false
            }
            (_, ConnectionType::Undefined) => {
                warn!(group_id = %self.group_id, ?kind, "Connection report without detail; keeping previous state");
                true
            }
        };

        let changed = before != self.state;
        if changed {
            debug!(group_id = %self.group_id, ?kind, state = ?self.state, "Connection state updated");
        }
        ConnectionChange { changed, ambiguous }
    }

    fn multicast_restored(&mut self) {
        self.state.has_multicast_connection = true;
        self.multicast_lost_at = None;
        self.failover_announced = false;
    }

    /// Whether multicast has been down long enough to fail over to the relay
    pub fn evaluate(&self, now: Timestamp, config: MulticastFailoverConfig) -> FailoverDecision {
        if !config.enabled || !self.relay_planned || self.state.operating_in_multicast_failover || self.failover_announced {
            return FailoverDecision::NotDue;
        }
        match self.multicast_lost_at {
            Some(lost_at) if now.duration_since(lost_at) >= config.threshold_ms() => FailoverDecision::FailoverDue {
                lost_for_ms: now.duration_since(lost_at),
            },
            _ => FailoverDecision::NotDue,
        }
    }

    /// Record that this loss episode has been reported
    pub fn mark_failover_announced(&mut self) {
        self.failover_announced = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConnectionTracker {
        ConnectionTracker::new(GroupId::new("{g}"), true)
    }

    fn detail(connection_type: ConnectionType, as_failover: bool) -> ConnectionDetail {
        ConnectionDetail::new("{g}", connection_type, as_failover)
    }

    #[test]
    fn test_multicast_connect() {
        let mut t = tracker();
        let change = t.apply(
            ConnectionEventKind::Connected,
            Some(&detail(ConnectionType::IpMulticast, false)),
            Timestamp::new(0),
        );
        assert!(change.changed && !change.ambiguous);
        assert!(t.state().has_multicast_connection);
        assert!(!t.state().operating_in_multicast_failover);
        assert!(t.is_connected_in_some_way());
    }

    #[test]
    fn test_relay_connect_as_failover_then_disconnect() {
        let mut t = tracker();
        t.apply(
            ConnectionEventKind::Connected,
            Some(&detail(ConnectionType::Rallypoint, true)),
            Timestamp::new(0),
        );
        assert!(t.state().has_rp_connection);
        assert!(t.state().operating_in_multicast_failover);

        t.apply(
            ConnectionEventKind::Disconnected,
            Some(&detail(ConnectionType::Rallypoint, false)),
            Timestamp::new(10),
        );
        assert_eq!(t.state(), GroupConnectionState::default());
    }

    #[test]
    fn test_missing_detail_on_connect_marks_some_connectivity() {
        let mut t = tracker();
        let change = t.apply(ConnectionEventKind::Connected, None, Timestamp::new(0));
        assert!(change.ambiguous);
        assert!(t.is_connected_in_some_way());
    }

    #[test]
    fn test_missing_detail_on_disconnect_preserves_state() {
        let mut t = tracker();
        t.apply(
            ConnectionEventKind::Connected,
            Some(&detail(ConnectionType::Rallypoint, false)),
            Timestamp::new(0),
        );
        let before = t.state();
        for kind in [ConnectionEventKind::Disconnected, ConnectionEventKind::ConnectFailed] {
            let change = t.apply(kind, None, Timestamp::new(5));
            assert!(change.ambiguous && !change.changed);
        }
        assert_eq!(t.state(), before);
    }

    #[test]
    fn test_failover_due_after_threshold() {
        let config = MulticastFailoverConfig {
            enabled: true,
            threshold_secs: 10,
        };
        let mut t = tracker();
        t.apply(
            ConnectionEventKind::Connected,
            Some(&detail(ConnectionType::IpMulticast, false)),
            Timestamp::new(0),
        );
        t.apply(
            ConnectionEventKind::Disconnected,
            Some(&detail(ConnectionType::IpMulticast, false)),
            Timestamp::new(1_000),
        );
        assert_eq!(t.multicast_lost_at(), Some(Timestamp::new(1_000)));
        assert_eq!(t.evaluate(Timestamp::new(10_999), config), FailoverDecision::NotDue);
        assert_eq!(
            t.evaluate(Timestamp::new(11_000), config),
            FailoverDecision::FailoverDue { lost_for_ms: 10_000 }
        );

        t.mark_failover_announced();
        assert_eq!(t.evaluate(Timestamp::new(20_000), config), FailoverDecision::NotDue);

        let disabled = MulticastFailoverConfig {
            enabled: false,
            ..config
        };
        let mut fresh = tracker();
        fresh.apply(
            ConnectionEventKind::ConnectFailed,
            Some(&detail(ConnectionType::IpMulticast, false)),
            Timestamp::new(0),
        );
        assert_eq!(fresh.evaluate(Timestamp::new(60_000), disabled), FailoverDecision::NotDue);
        fresh.set_relay_planned(false);
        assert_eq!(fresh.evaluate(Timestamp::new(60_000), config), FailoverDecision::NotDue);
    }

    #[test]
    fn test_recovery_clears_loss_episode() {
        let mut t = tracker();
        t.apply(
            ConnectionEventKind::Disconnected,
            Some(&detail(ConnectionType::IpMulticast, false)),
            Timestamp::new(0),
        );
        t.mark_failover_announced();
        t.apply(
            ConnectionEventKind::Connected,
            Some(&detail(ConnectionType::IpMulticast, false)),
            Timestamp::new(100),
        );
        assert!(t.multicast_lost_at().is_none());
    }

    #[test]
    fn test_detail_decoding() {
        let text = r#"{"groupConnectionDetail": {"id": "{g}", "connectionType": 2, "peer": "rp1", "asFailover": true, "reason": 1}}"#;
        let d = ConnectionDetail::from_event_json(text).unwrap();
        assert_eq!(d.connection_type, ConnectionType::Rallypoint);
        assert!(d.as_failover);
        assert_eq!(d.reason, DisconnectReason::NoLink);
        assert_eq!(d.peer.as_deref(), Some("rp1"));

        assert!(ConnectionDetail::from_event_json("{}").is_none());
        assert!(ConnectionDetail::from_event_json("not json").is_none());
    }
}
