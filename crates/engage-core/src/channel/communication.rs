//! Channel Communication Protocol Types
//!
//! Every interaction between the UI, the core logic task and the engine flows
//! through these message types:
//! - [`Command`]: UI → core logic
//! - [`RawEngineEvent`](crate::protocol::RawEngineEvent): engine → core logic
//! - [`Effect`]: core logic → engine
//! - [`AppEvent`]: core logic → UI

use crate::license::{LicenseCredentials, LicenseState};
use crate::mission::{GroupDescriptor, MissionConfiguration};
use crate::presence::PresenceDescriptor;
use crate::protocol::events::BlobInfo;
use crate::protocol::lifecycle::{GroupRuntimeState, LifecycleState};
use crate::protocol::transmit::{AdvancedTxParams, TxState, TxStatus};
use crate::transport::GroupConnectionState;
use crate::types::{GroupId, GroupType, NodeId, UiMode};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ----------------------------------------------------------------------------
// Command: UI/External → Core Logic
// ----------------------------------------------------------------------------

/// Commands sent from the UI to the core logic task
#[derive(Debug, Clone)]
pub enum Command {
    /// Replace the active mission
    ApplyMission {
        mission: Box<MissionConfiguration>,
    },
    /// Offer a group discovered at runtime
    AddDynamicGroup {
        group: Box<GroupDescriptor>,
    },
    CreateGroup {
        group_id: GroupId,
    },
    CreateAllGroups,
    JoinGroup {
        group_id: GroupId,
    },
    /// Join presence, raw and the audio groups selected for the current UI mode
    JoinSelectedGroups,
    LeaveGroup {
        group_id: GroupId,
    },
    LeaveAllGroups,
    DeleteGroup {
        group_id: GroupId,
    },
    SetUiMode {
        mode: UiMode,
    },
    SelectGroup {
        group_id: GroupId,
        view: SelectionView,
    },
    SetTxSelected {
        group_id: GroupId,
        selected: bool,
    },
    /// Push-to-talk pressed
    StartTx,
    /// Push-to-talk released
    EndTx,
    SetRxMuted {
        group_id: GroupId,
        muted: bool,
    },
    /// Publish our presence descriptor on the presence group
    UpdatePresence {
        descriptor_json: String,
        force: bool,
    },
    UpdateLicense {
        credentials: LicenseCredentials,
    },
    OpenCertStore {
        path: String,
        password: String,
    },
    QueryGroupTimeline {
        group_id: GroupId,
        query: TimelineQuery,
    },
    /// Request a session status report
    GetSessionStatus,
    /// Shutdown the core logic task gracefully
    Shutdown,
    /// Grant-tone delay expired for a transmit started under `generation`
    CompletePendingUnmute {
        group_id: GroupId,
        generation: u64,
    },
}

// ----------------------------------------------------------------------------
// Effect: Core Logic → Engine (External Side Effects Only)
// ----------------------------------------------------------------------------

/// Engine commands issued by the core logic task
///
/// Effects are fire-and-forget. Completion arrives later as an engine event.
#[derive(Debug, Clone)]
pub enum Effect {
    CreateGroup {
        group_id: GroupId,
        config_json: String,
    },
    DeleteGroup {
        group_id: GroupId,
    },
    JoinGroup {
        group_id: GroupId,
    },
    LeaveGroup {
        group_id: GroupId,
    },
    BeginTx {
        group_id: GroupId,
        params: AdvancedTxParams,
    },
    EndTx {
        group_id: GroupId,
    },
    UnmuteTx {
        group_id: GroupId,
    },
    MuteRx {
        group_id: GroupId,
    },
    UnmuteRx {
        group_id: GroupId,
    },
    UpdatePresenceDescriptor {
        group_id: GroupId,
        descriptor_json: String,
        force: bool,
    },
    UpdateLicense {
        credentials: LicenseCredentials,
    },
    OpenCertStore {
        path: String,
        password: String,
    },
    QueryGroupTimeline {
        group_id: GroupId,
        query_json: String,
    },
    /// Re-enter the core logic task with `command` after `delay`; handled locally
    ScheduleCommand {
        delay: Duration,
        command: Box<Command>,
    },
}

impl Effect {
    /// Group the effect targets, if any
    pub fn group_id(&self) -> Option<&GroupId> {
        match self {
            Effect::CreateGroup { group_id, .. }
            | Effect::DeleteGroup { group_id }
            | Effect::JoinGroup { group_id }
            | Effect::LeaveGroup { group_id }
            | Effect::BeginTx { group_id, .. }
            | Effect::EndTx { group_id }
            | Effect::UnmuteTx { group_id }
            | Effect::MuteRx { group_id }
            | Effect::UnmuteRx { group_id }
            | Effect::UpdatePresenceDescriptor { group_id, .. }
            | Effect::QueryGroupTimeline { group_id, .. } => Some(group_id),
            Effect::UpdateLicense { .. } | Effect::OpenCertStore { .. } | Effect::ScheduleCommand { .. } => None,
        }
    }

    /// Handled inside the runtime rather than by the engine
    pub fn is_local(&self) -> bool {
        matches!(self, Effect::ScheduleCommand { .. })
    }
}

// ----------------------------------------------------------------------------
// AppEvent: Core Logic → UI (State Changes Only)
// ----------------------------------------------------------------------------

/// Application events sent from the core logic task to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    MissionApplied {
        mission_id: String,
        group_count: usize,
    },
    /// Lifecycle, transmit or receive state of a group changed
    GroupStateChanged {
        snapshot: GroupSnapshot,
    },
    GroupConnectivityChanged {
        group_id: GroupId,
        connection: GroupConnectionState,
    },
    /// Joined groups with no connectivity at the last health check
    NetworkDegraded {
        group_ids: Vec<GroupId>,
    },
    /// Multicast has been down past the failover threshold
    FailoverPending {
        group_id: GroupId,
        lost_for_ms: u64,
    },
    AnyTxPending,
    AnyTxActive,
    AnyTxEnding,
    AllTxEnded,
    GroupTxFailed {
        group_id: GroupId,
        status: Option<TxStatus>,
    },
    GroupTxUsurped {
        group_id: GroupId,
        remote_priority: Option<i64>,
    },
    GroupTxMaxTimeExceeded {
        group_id: GroupId,
    },
    NodeJoined {
        node: PresenceDescriptor,
    },
    NodeUpdated {
        node: PresenceDescriptor,
    },
    NodeLeft {
        node_id: NodeId,
        friendly_name: String,
    },
    /// The node table was emptied
    PresenceCleared,
    LicenseChanged {
        state: LicenseState,
    },
    LicenseExpiring {
        seconds_left: u64,
    },
    LicenseExpired,
    TextMessageReceived {
        group_id: GroupId,
        from: NodeId,
        text: String,
    },
    BlobReceived {
        group_id: GroupId,
        info: BlobInfo,
        size: usize,
    },
    TimelineReport {
        group_id: GroupId,
        report_json: String,
    },
    TimelineReportFailed {
        group_id: GroupId,
    },
    /// Session status report in response to GetSessionStatus
    SessionStatus {
        report: SessionStatusReport,
    },
    EngineStarted,
    EngineStopped,
    GeneralError {
        error: String,
    },
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Which selection a select-group command changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionView {
    Single,
    Multi { selected: bool },
}

/// Timeline query parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineQuery {
    pub max_count: u32,
    pub most_recent_first: bool,
}

impl Default for TimelineQuery {
    fn default() -> Self {
        Self {
            max_count: 100,
            most_recent_first: true,
        }
    }
}

impl TimelineQuery {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Connectivity summary for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Connectivity {
    Disconnected,
    Multicast,
    Rallypoint,
    MulticastFailover,
}

impl From<GroupConnectionState> for Connectivity {
    fn from(state: GroupConnectionState) -> Self {
        if state.has_rp_connection && state.operating_in_multicast_failover {
            Connectivity::MulticastFailover
        } else if state.has_rp_connection {
            Connectivity::Rallypoint
        } else if state.has_multicast_connection {
            Connectivity::Multicast
        } else {
            Connectivity::Disconnected
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Disconnected => write!(f, "Disconnected"),
            Connectivity::Multicast => write!(f, "Multicast"),
            Connectivity::Rallypoint => write!(f, "Rallypoint"),
            Connectivity::MulticastFailover => write!(f, "Multicast failover"),
        }
    }
}

/// Read-side copy of one group's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub group_id: GroupId,
    pub name: String,
    pub group_type: GroupType,
    pub lifecycle: LifecycleState,
    pub tx: TxState,
    pub rx: bool,
    pub rx_muted: bool,
    pub connection: GroupConnectionState,
    pub inoperable_error: Option<i32>,
    pub member_count: usize,
}

impl GroupSnapshot {
    pub fn new(
        descriptor: &GroupDescriptor,
        runtime: &GroupRuntimeState,
        connection: GroupConnectionState,
    ) -> Self {
        Self {
            group_id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            group_type: descriptor.group_type,
            lifecycle: runtime.lifecycle,
            tx: runtime.tx,
            rx: runtime.rx,
            rx_muted: runtime.rx_muted,
            connection,
            inoperable_error: runtime.inoperable_error,
            member_count: runtime.members.len(),
        }
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connection.into()
    }

    pub fn joined(&self) -> bool {
        self.lifecycle == LifecycleState::Joined
    }
}

/// Session status for the UI
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionStatusReport {
    pub mission_id: Option<String>,
    pub engine_running: bool,
    pub group_count: usize,
    pub created_count: usize,
    pub joined_count: usize,
    pub connected_count: usize,
    pub tx_group_count: usize,
    pub node_count: usize,
    pub uptime_seconds: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_summary() {
        let mut state = GroupConnectionState::default();
        assert_eq!(Connectivity::from(state), Connectivity::Disconnected);
        state.has_multicast_connection = true;
        assert_eq!(Connectivity::from(state), Connectivity::Multicast);
        state.has_rp_connection = true;
        state.operating_in_multicast_failover = true;
        assert_eq!(Connectivity::from(state), Connectivity::MulticastFailover);
        assert_eq!(format!("{}", Connectivity::MulticastFailover), "Multicast failover");
    }

    #[test]
    fn test_timeline_query_json() {
        let query = TimelineQuery {
            max_count: 5,
            most_recent_first: false,
        };
        assert_eq!(query.to_json(), r#"{"maxCount":5,"mostRecentFirst":false}"#);
    }

    #[test]
    fn test_effect_targets() {
        let effect = Effect::BeginTx {
            group_id: GroupId::new("{g}"),
            params: AdvancedTxParams::from_config(&Default::default()),
        };
        assert_eq!(effect.group_id().map(GroupId::as_str), Some("{g}"));
        assert!(!effect.is_local());

        let scheduled = Effect::ScheduleCommand {
            delay: Duration::from_millis(120),
            command: Box::new(Command::StartTx),
        };
        assert!(scheduled.is_local());
        assert!(scheduled.group_id().is_none());
    }

    #[test]
    fn test_app_event_serialization() {
        let event = AppEvent::GroupTxUsurped {
            group_id: GroupId::new("{g}"),
            remote_priority: Some(3),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: AppEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
