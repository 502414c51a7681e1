//! Core Logic Command and Event Handlers
//!
//! Each handler mutates the session state and returns the engine effects to
//! issue and the app events to emit, in that order. State is always updated
//! before the events describing it are produced.

use super::state::SessionState;
use engage_core::{
    channel::{AppEvent, Effect, SelectionView, TimelineQuery},
    errors::LifecycleError,
    license::{LicenseCredentials, LicenseDescriptor},
    mission::{AddOutcome, GroupDescriptor, MissionConfiguration},
    presence::PresenceDescriptor,
    protocol::{
        events::{BlobInfo, BlobPayloadType, EngineEvent, GroupCreationDetail},
        transmit::{GroupTxDetail, TxOutcome},
    },
    transport::{ConnectionDetail, ConnectionEventKind},
    types::{GroupId, NodeId, UiMode},
    EngageResult,
};
use tracing::{debug, info, warn};

/// Engine effects and app events produced by one handler
pub type HandlerOutput = (Vec<Effect>, Vec<AppEvent>);

fn events_only(events: Vec<AppEvent>) -> EngageResult<HandlerOutput> {
    Ok((Vec::new(), events))
}

/// Snapshot notifications for the given groups
fn state_changed<'a>(state: &SessionState, group_ids: impl IntoIterator<Item = &'a GroupId>) -> Vec<AppEvent> {
    group_ids
        .into_iter()
        .filter_map(|id| state.groups.snapshot(id, state.connections.state(id)))
        .map(|snapshot| AppEvent::GroupStateChanged { snapshot })
        .collect()
}

/// Empty the node table and every group's member list
fn clear_presence(state: &mut SessionState) -> Vec<AppEvent> {
    state.groups.clear_members();
    if state.presence.clear() {
        vec![AppEvent::PresenceCleared]
    } else {
        Vec::new()
    }
}

/// Remove a group from the transmit set after it stopped being usable
fn forget_tx(state: &mut SessionState, group_id: &GroupId) -> Vec<AppEvent> {
    if state.transmit.forget(group_id) {
        vec![AppEvent::AllTxEnded]
    } else {
        Vec::new()
    }
}

// ----------------------------------------------------------------------------
// Command Handlers
// ----------------------------------------------------------------------------

/// Handlers for commands from the UI
pub struct CommandHandlers;

impl CommandHandlers {
    pub fn handle_apply_mission(state: &mut SessionState, mission: MissionConfiguration) -> EngageResult<HandlerOutput> {
        let change = state.groups.apply_mission(mission);

        let mut events = Vec::new();
        for group_id in &change.removed {
            state.connections.remove(group_id);
            events.extend(forget_tx(state, group_id));
        }

        let (mission_id, group_count) = state
            .groups
            .mission()
            .map(|m| (m.id.clone(), m.groups().len()))
            .unwrap_or_default();
        events.insert(0, AppEvent::MissionApplied { mission_id, group_count });
        events_only(events)
    }

    pub fn handle_add_dynamic_group(state: &mut SessionState, group: GroupDescriptor) -> EngageResult<HandlerOutput> {
        let group_id = group.id.clone();
        match state.groups.add_dynamic_group(group)? {
            AddOutcome::Added => events_only(state_changed(state, [&group_id])),
            AddOutcome::Rediscovered => events_only(Vec::new()),
        }
    }

    pub fn handle_create_group(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        let failover = state.config.failover;
        let alias = state.config.transmit.user_alias.clone();
        let request = state.groups.create(&group_id, failover, alias.as_deref())?;
        state.connections.plan(&group_id, request.plan.uses_relay());
        info!(group_id = %group_id, relay = request.plan.uses_relay(), "Creating group");
        Ok((request.effects, state_changed(state, [&group_id])))
    }

    pub fn handle_create_all_groups(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        if state.groups.mission().is_none() {
            return Err(LifecycleError::NoMission.into());
        }
        let failover = state.config.failover;
        let alias = state.config.transmit.user_alias.clone();
        let requests = state.groups.create_all(failover, alias.as_deref());

        let mut effects = Vec::new();
        let mut ids = Vec::new();
        for request in requests {
            state.connections.plan(&request.group_id, request.plan.uses_relay());
            effects.extend(request.effects);
            ids.push(request.group_id);
        }
        info!(count = ids.len(), "Creating all groups");
        Ok((effects, state_changed(state, &ids)))
    }

    pub fn handle_join_group(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        let effects = state.groups.join(&group_id)?;
        Ok((effects, state_changed(state, [&group_id])))
    }

    pub fn handle_join_selected_groups(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        let effects = state.groups.join_selected(state.ui_mode)?;
        let ids: Vec<GroupId> = effects.iter().filter_map(Effect::group_id).cloned().collect();
        Ok((effects, state_changed(state, &ids)))
    }

    /// Leaving the presence group also empties the node table
    pub fn handle_leave_group(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        let effects = state.groups.leave(&group_id)?;
        let mut events = state_changed(state, [&group_id]);
        if state.groups.is_presence_group(&group_id) {
            events.extend(clear_presence(state));
        }
        Ok((effects, events))
    }

    pub fn handle_leave_all_groups(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        let effects = state.groups.leave_all();
        let ids: Vec<GroupId> = effects.iter().filter_map(Effect::group_id).cloned().collect();
        let mut events = state_changed(state, &ids);
        events.extend(clear_presence(state));
        Ok((effects, events))
    }

    pub fn handle_delete_group(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        let effects = state.groups.delete(&group_id)?;
        Ok((effects, Vec::new()))
    }

    pub fn handle_set_ui_mode(state: &mut SessionState, mode: UiMode) -> EngageResult<HandlerOutput> {
        if state.ui_mode != mode {
            info!(?mode, "UI mode changed");
            state.ui_mode = mode;
        }
        events_only(Vec::new())
    }

    pub fn handle_select_group(
        state: &mut SessionState,
        group_id: GroupId,
        view: SelectionView,
    ) -> EngageResult<HandlerOutput> {
        match view {
            SelectionView::Single => state.groups.select_for_single_view(&group_id)?,
            SelectionView::Multi { selected } => state.groups.set_selected_for_multi_view(&group_id, selected)?,
        }
        events_only(Vec::new())
    }

    pub fn handle_set_tx_selected(
        state: &mut SessionState,
        group_id: GroupId,
        selected: bool,
    ) -> EngageResult<HandlerOutput> {
        state.groups.set_tx_selected(&group_id, selected)?;
        events_only(Vec::new())
    }

    pub fn handle_start_tx(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        let config = state.transmit_config();
        let (effects, tx_events) = state.transmit.start_tx(&mut state.groups, &config)?;
        let ids: Vec<GroupId> = state.transmit.tx_set().to_vec();
        let mut events = state_changed(state, &ids);
        events.extend(tx_events);
        Ok((effects, events))
    }

    pub fn handle_end_tx(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        let (effects, tx_events) = state.transmit.end_tx(&mut state.groups);
        let mut events = Vec::new();
        if !tx_events.is_empty() {
            let ids: Vec<GroupId> = effects.iter().filter_map(Effect::group_id).cloned().collect();
            events = state_changed(state, &ids);
        }
        events.extend(tx_events);
        Ok((effects, events))
    }

    pub fn handle_complete_pending_unmute(
        state: &mut SessionState,
        group_id: GroupId,
        generation: u64,
    ) -> EngageResult<HandlerOutput> {
        let effects = state
            .transmit
            .complete_pending_unmute(&state.groups, &group_id, generation);
        Ok((effects, Vec::new()))
    }

    pub fn handle_set_rx_muted(state: &mut SessionState, group_id: GroupId, muted: bool) -> EngageResult<HandlerOutput> {
        state.groups.descriptor(&group_id)?;
        let effect = if muted {
            Effect::MuteRx { group_id }
        } else {
            Effect::UnmuteRx { group_id }
        };
        Ok((vec![effect], Vec::new()))
    }

    /// Publish our presence on the mission's presence group
    pub fn handle_update_presence(
        state: &mut SessionState,
        descriptor_json: String,
        force: bool,
    ) -> EngageResult<HandlerOutput> {
        PresenceDescriptor::parse(&descriptor_json, state.now())?;

        let Some(group_id) = state.groups.mission().and_then(|m| m.presence_group()).map(|g| g.id.clone()) else {
            debug!("No presence group in the mission; presence update dropped");
            return Ok((Vec::new(), Vec::new()));
        };
        Ok((
            vec![Effect::UpdatePresenceDescriptor {
                group_id,
                descriptor_json,
                force,
            }],
            Vec::new(),
        ))
    }

    pub fn handle_update_license(
        state: &mut SessionState,
        credentials: LicenseCredentials,
    ) -> EngageResult<HandlerOutput> {
        state.license.credentials = Some(credentials.clone());
        Ok((vec![Effect::UpdateLicense { credentials }], Vec::new()))
    }

    pub fn handle_open_cert_store(path: String, password: String) -> EngageResult<HandlerOutput> {
        Ok((vec![Effect::OpenCertStore { path, password }], Vec::new()))
    }

    pub fn handle_query_group_timeline(
        state: &mut SessionState,
        group_id: GroupId,
        query: TimelineQuery,
    ) -> EngageResult<HandlerOutput> {
        state.groups.descriptor(&group_id)?;
        Ok((
            vec![Effect::QueryGroupTimeline {
                group_id,
                query_json: query.to_json(),
            }],
            Vec::new(),
        ))
    }

    pub fn handle_get_session_status(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        events_only(vec![AppEvent::SessionStatus {
            report: state.status_report(),
        }])
    }
}

// ----------------------------------------------------------------------------
// Engine Event Handlers
// ----------------------------------------------------------------------------

/// Handlers for decoded engine events
pub struct EventHandlers;

impl EventHandlers {
    pub fn handle(state: &mut SessionState, event: EngineEvent) -> EngageResult<HandlerOutput> {
        match event {
            EngineEvent::EngineStarted => Self::handle_engine_started(state),
            EngineEvent::EngineStopped => Self::handle_engine_stopped(state),

            EngineEvent::GroupCreated { group_id } => Self::handle_group_created(state, group_id),
            EngineEvent::GroupCreateFailed { group_id, detail } => {
                Self::handle_group_create_failed(state, group_id, detail)
            }
            EngineEvent::GroupDeleted { group_id } => Self::handle_group_deleted(state, group_id),
            EngineEvent::GroupJoined { group_id } => {
                state.groups.on_joined(&group_id)?;
                events_only(state_changed(state, [&group_id]))
            }
            EngineEvent::GroupJoinFailed { group_id } => {
                state.groups.on_join_failed(&group_id)?;
                let mut events = state_changed(state, [&group_id]);
                events.extend(forget_tx(state, &group_id));
                events_only(events)
            }
            EngineEvent::GroupLeft { group_id } => Self::handle_group_left(state, group_id),

            EngineEvent::GroupConnected { group_id, detail } => {
                Self::handle_connection(state, group_id, ConnectionEventKind::Connected, detail)
            }
            EngineEvent::GroupConnectFailed { group_id, detail } => {
                Self::handle_connection(state, group_id, ConnectionEventKind::ConnectFailed, detail)
            }
            EngineEvent::GroupDisconnected { group_id, detail } => {
                Self::handle_connection(state, group_id, ConnectionEventKind::Disconnected, detail)
            }

            EngineEvent::GroupRxStarted { group_id } => {
                state.groups.set_rx(&group_id, true)?;
                events_only(state_changed(state, [&group_id]))
            }
            EngineEvent::GroupRxEnded { group_id } => {
                state.groups.set_rx(&group_id, false)?;
                events_only(state_changed(state, [&group_id]))
            }
            EngineEvent::GroupRxMuted { group_id } => {
                state.groups.set_rx_muted(&group_id, true)?;
                events_only(state_changed(state, [&group_id]))
            }
            EngineEvent::GroupRxUnmuted { group_id } => {
                state.groups.set_rx_muted(&group_id, false)?;
                events_only(state_changed(state, [&group_id]))
            }

            EngineEvent::GroupTxStarted { group_id, .. } => Self::handle_tx_started(state, group_id),
            EngineEvent::GroupTxEnded { group_id, detail } => {
                Self::handle_tx_terminated(state, group_id, TxOutcome::Ended, detail)
            }
            EngineEvent::GroupTxFailed { group_id, detail } => {
                Self::handle_tx_terminated(state, group_id, TxOutcome::Failed, detail)
            }
            EngineEvent::GroupTxUsurpedByPriority { group_id, detail } => {
                Self::handle_tx_terminated(state, group_id, TxOutcome::Usurped, detail)
            }
            EngineEvent::GroupMaxTxTimeExceeded { group_id, detail } => {
                Self::handle_tx_terminated(state, group_id, TxOutcome::Expired, detail)
            }

            EngineEvent::NodeDiscovered { descriptor, .. } => Self::handle_node_discovered(state, descriptor, false),
            EngineEvent::NodeRediscovered { descriptor, .. } => Self::handle_node_discovered(state, descriptor, true),
            EngineEvent::NodeUndiscovered { descriptor, .. } => Self::handle_node_undiscovered(state, descriptor.node_id),

            EngineEvent::LicenseChanged { descriptor } => Self::handle_license_changed(state, descriptor),
            EngineEvent::LicenseExpired => {
                state.license.on_expired();
                warn!("License expired");
                events_only(vec![AppEvent::LicenseExpired])
            }
            EngineEvent::LicenseExpiring { seconds_left } => {
                state.license.on_expiring(seconds_left);
                events_only(vec![AppEvent::LicenseExpiring { seconds_left }])
            }

            EngineEvent::GroupBlobReceived { group_id, info, payload } => {
                Self::handle_blob_received(state, group_id, info, payload)
            }
            EngineEvent::GroupTimelineReport { group_id, report_json } => {
                events_only(vec![AppEvent::TimelineReport { group_id, report_json }])
            }
            EngineEvent::GroupTimelineReportFailed { group_id } => {
                events_only(vec![AppEvent::TimelineReportFailed { group_id }])
            }
        }
    }

    pub fn handle_engine_started(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        state.engine_running = true;
        info!("Engine started");
        events_only(vec![AppEvent::EngineStarted])
    }

    /// Every group goes idle and all connection and presence state is dropped
    pub fn handle_engine_stopped(state: &mut SessionState) -> EngageResult<HandlerOutput> {
        state.engine_running = false;
        state.groups.go_idle();
        state.connections.clear();
        state.transmit.clear();

        let mut events = vec![AppEvent::EngineStopped];
        events.extend(clear_presence(state));
        info!("Engine stopped; session is idle");
        events_only(events)
    }

    pub fn handle_group_created(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        state.groups.on_created(&group_id)?;
        state.connections.on_created(&group_id);
        let mut events = state_changed(state, [&group_id]);
        events.extend(forget_tx(state, &group_id));
        info!(group_id = %group_id, "Group created");
        events_only(events)
    }

    pub fn handle_group_create_failed(
        state: &mut SessionState,
        group_id: GroupId,
        detail: Option<GroupCreationDetail>,
    ) -> EngageResult<HandlerOutput> {
        let status = detail.map(|d| d.status);
        state.groups.on_create_failed(&group_id, status)?;
        warn!(group_id = %group_id, ?status, "Group create failed");
        events_only(state_changed(state, [&group_id]))
    }

    pub fn handle_group_deleted(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        state.groups.on_deleted(&group_id)?;
        state.connections.remove(&group_id);
        let mut events = state_changed(state, [&group_id]);
        events.extend(forget_tx(state, &group_id));
        events_only(events)
    }

    pub fn handle_group_left(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        state.groups.on_left(&group_id)?;
        let mut events = state_changed(state, [&group_id]);
        events.extend(forget_tx(state, &group_id));
        if state.groups.is_presence_group(&group_id) {
            events.extend(clear_presence(state));
        }
        events_only(events)
    }

    pub fn handle_connection(
        state: &mut SessionState,
        group_id: GroupId,
        kind: ConnectionEventKind,
        detail: Option<ConnectionDetail>,
    ) -> EngageResult<HandlerOutput> {
        state.groups.descriptor(&group_id)?;
        let now = state.now();
        let change = state.connections.apply(&group_id, kind, detail.as_ref(), now);
        if !change.changed {
            return events_only(Vec::new());
        }
        let connection = state.connections.state(&group_id);
        events_only(vec![AppEvent::GroupConnectivityChanged { group_id, connection }])
    }

    pub fn handle_tx_started(state: &mut SessionState, group_id: GroupId) -> EngageResult<HandlerOutput> {
        state.groups.descriptor(&group_id)?;
        let now = state.now();
        let config = state.transmit_config();
        let (effects, tx_events) = state.transmit.on_tx_started(&mut state.groups, &group_id, now, &config);
        if tx_events.is_empty() {
            return Ok((effects, tx_events));
        }
        let mut events = state_changed(state, [&group_id]);
        events.extend(tx_events);
        Ok((effects, events))
    }

    pub fn handle_tx_terminated(
        state: &mut SessionState,
        group_id: GroupId,
        outcome: TxOutcome,
        detail: Option<GroupTxDetail>,
    ) -> EngageResult<HandlerOutput> {
        state.groups.descriptor(&group_id)?;
        let tx_events = state
            .transmit
            .on_tx_terminated(&mut state.groups, &group_id, outcome, detail.as_ref());
        let mut events = state_changed(state, [&group_id]);
        events.extend(tx_events);
        events_only(events)
    }

    pub fn handle_node_discovered(
        state: &mut SessionState,
        descriptor: PresenceDescriptor,
        rediscovered: bool,
    ) -> EngageResult<HandlerOutput> {
        let stored = if rediscovered {
            state.presence.on_rediscovered(descriptor)
        } else {
            state.presence.on_discovered(descriptor)
        };
        let Some((event, node)) = stored else {
            return events_only(Vec::new());
        };
        state.groups.sync_memberships(node);
        events_only(event.into_iter().collect())
    }

    pub fn handle_node_undiscovered(state: &mut SessionState, node_id: NodeId) -> EngageResult<HandlerOutput> {
        state.groups.remove_member(&node_id);
        events_only(state.presence.on_undiscovered(&node_id).into_iter().collect())
    }

    pub fn handle_license_changed(
        state: &mut SessionState,
        descriptor: Option<LicenseDescriptor>,
    ) -> EngageResult<HandlerOutput> {
        if let Some(descriptor) = &descriptor {
            info!(device_id = %descriptor.device_id, valid = descriptor.is_valid(), "License changed");
        }
        state.license.on_changed(descriptor);
        events_only(vec![AppEvent::LicenseChanged {
            state: state.license.clone(),
        }])
    }

    /// Text blobs addressed to us become messages; other text blobs are ignored
    pub fn handle_blob_received(
        state: &mut SessionState,
        group_id: GroupId,
        info: BlobInfo,
        payload: Vec<u8>,
    ) -> EngageResult<HandlerOutput> {
        if info.payload_type != BlobPayloadType::AppTextUtf8 {
            let size = payload.len();
            return events_only(vec![AppEvent::BlobReceived { group_id, info, size }]);
        }

        if !info.is_for(state.node_id.as_str()) {
            debug!(group_id = %group_id, target = %info.target, "Text message for another node");
            return events_only(Vec::new());
        }

        match String::from_utf8(payload) {
            Ok(text) => events_only(vec![AppEvent::TextMessageReceived {
                group_id,
                from: NodeId::new(info.source),
                text,
            }]),
            Err(e) => {
                warn!(group_id = %group_id, source = %info.source, "Text blob is not valid UTF-8");
                let size = e.as_bytes().len();
                events_only(vec![AppEvent::BlobReceived { group_id, info, size }])
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::{
        config::EngineConfig,
        protocol::transmit::TxState,
        transport::ConnectionType,
        types::{GroupType, ManualTimeSource, Timestamp},
    };
    use std::sync::Arc;

    fn session() -> SessionState {
        let mut mission = MissionConfiguration::new("{m}", "Test");
        mission
            .push_group(GroupDescriptor::new("{p}", GroupType::Presence, "Presence").with_multicast("239.1.1.1", 8000))
            .unwrap();
        let mut audio = GroupDescriptor::new("{a}", GroupType::Audio, "Alpha").with_multicast("239.1.1.2", 8001);
        audio.selected_for_single_view = true;
        mission.push_group(audio).unwrap();

        let mut state = SessionState::new(
            NodeId::new("{me}"),
            EngineConfig::testing().into_shared(),
            Arc::new(ManualTimeSource::new(Timestamp::new(1_000))),
        );
        CommandHandlers::handle_apply_mission(&mut state, mission).unwrap();
        state
    }

    fn gid(id: &str) -> GroupId {
        GroupId::new(id)
    }

    fn bring_up(state: &mut SessionState, id: &str) {
        CommandHandlers::handle_create_group(state, gid(id)).unwrap();
        EventHandlers::handle(state, EngineEvent::GroupCreated { group_id: gid(id) }).unwrap();
        CommandHandlers::handle_join_group(state, gid(id)).unwrap();
        EventHandlers::handle(state, EngineEvent::GroupJoined { group_id: gid(id) }).unwrap();
    }

    fn node(id: &str, groups: &[&str]) -> PresenceDescriptor {
        let aliases: Vec<String> = groups
            .iter()
            .map(|g| format!(r#"{{"groupId":"{}","status":3}}"#, g))
            .collect();
        let json = format!(
            r#"{{"identity":{{"nodeId":"{}","displayName":"Node {}"}},"groupAliases":[{}]}}"#,
            id,
            id,
            aliases.join(",")
        );
        PresenceDescriptor::parse(&json, Timestamp::new(1_000)).unwrap()
    }

    #[test]
    fn test_create_emits_effect_and_snapshot() {
        let mut state = session();
        let (effects, events) = CommandHandlers::handle_create_group(&mut state, gid("{a}")).unwrap();
        assert!(matches!(&effects[0], Effect::CreateGroup { config_json, .. } if config_json.contains("239.1.1.2")));
        assert!(matches!(&events[0], AppEvent::GroupStateChanged { snapshot } if snapshot.lifecycle.name() == "Creating"));
    }

    #[test]
    fn test_unknown_group_is_an_error() {
        let mut state = session();
        let err = CommandHandlers::handle_join_group(&mut state, gid("{nope}")).unwrap_err();
        assert!(err.to_string().contains("{nope}"));
        assert!(EventHandlers::handle(&mut state, EngineEvent::GroupJoined { group_id: gid("{nope}") }).is_err());
    }

    #[test]
    fn test_connection_change_notifies_once() {
        let mut state = session();
        bring_up(&mut state, "{a}");
        let detail = ConnectionDetail::new("{a}", ConnectionType::IpMulticast, false);

        let (_, events) = EventHandlers::handle(
            &mut state,
            EngineEvent::GroupConnected {
                group_id: gid("{a}"),
                detail: Some(detail.clone()),
            },
        )
        .unwrap();
        assert!(matches!(&events[0], AppEvent::GroupConnectivityChanged { connection, .. } if connection.has_multicast_connection));

        // Repeating the same report changes nothing
        let (_, events) = EventHandlers::handle(
            &mut state,
            EngineEvent::GroupConnected {
                group_id: gid("{a}"),
                detail: Some(detail),
            },
        )
        .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_leaving_presence_group_clears_nodes() {
        let mut state = session();
        bring_up(&mut state, "{p}");
        bring_up(&mut state, "{a}");

        let (_, events) = EventHandlers::handle(
            &mut state,
            EngineEvent::NodeDiscovered {
                group_id: gid("{p}"),
                descriptor: node("{n1}", &["{a}"]),
            },
        )
        .unwrap();
        assert!(matches!(events[0], AppEvent::NodeJoined { .. }));
        assert_eq!(state.groups.runtime(&gid("{a}")).unwrap().members.len(), 1);

        // Leaving an audio group keeps the node table
        let (_, events) = CommandHandlers::handle_leave_group(&mut state, gid("{a}")).unwrap();
        assert!(!events.contains(&AppEvent::PresenceCleared));
        assert_eq!(state.presence.len(), 1);

        let (effects, events) = CommandHandlers::handle_leave_group(&mut state, gid("{p}")).unwrap();
        assert!(matches!(&effects[0], Effect::LeaveGroup { .. }));
        assert!(events.contains(&AppEvent::PresenceCleared));
        assert!(state.presence.is_empty());
    }

    #[test]
    fn test_transmit_error_changes_nothing() {
        let mut state = session();
        CommandHandlers::handle_set_ui_mode(&mut state, UiMode::Multi).unwrap();
        let err = CommandHandlers::handle_start_tx(&mut state).unwrap_err();
        assert!(err.to_string().contains("No groups are selected"));
        assert!(!state.transmit.is_transmitting());
    }

    #[test]
    fn test_tx_round_trip_through_handlers() {
        let mut state = session();
        bring_up(&mut state, "{a}");

        let (effects, events) = CommandHandlers::handle_start_tx(&mut state).unwrap();
        assert!(matches!(effects[0], Effect::BeginTx { .. }));
        assert_eq!(events.last(), Some(&AppEvent::AnyTxPending));

        let (effects, events) = EventHandlers::handle(
            &mut state,
            EngineEvent::GroupTxStarted {
                group_id: gid("{a}"),
                detail: None,
            },
        )
        .unwrap();
        // Testing config has no grant tone: unmute immediately
        assert!(matches!(effects[0], Effect::UnmuteTx { .. }));
        assert_eq!(events.last(), Some(&AppEvent::AnyTxActive));
        assert_eq!(state.groups.runtime(&gid("{a}")).unwrap().tx, TxState::Active);

        let (_, events) = EventHandlers::handle(
            &mut state,
            EngineEvent::GroupTxEnded {
                group_id: gid("{a}"),
                detail: None,
            },
        )
        .unwrap();
        assert_eq!(events.last(), Some(&AppEvent::AllTxEnded));
        assert_eq!(state.groups.runtime(&gid("{a}")).unwrap().last_tx_start, None);
    }

    #[test]
    fn test_engine_stop_goes_idle() {
        let mut state = session();
        bring_up(&mut state, "{p}");
        EventHandlers::handle(
            &mut state,
            EngineEvent::NodeDiscovered {
                group_id: gid("{p}"),
                descriptor: node("{n1}", &[]),
            },
        )
        .unwrap();

        let (_, events) = EventHandlers::handle(&mut state, EngineEvent::EngineStopped).unwrap();
        assert_eq!(events, vec![AppEvent::EngineStopped, AppEvent::PresenceCleared]);
        assert_eq!(state.status_report().created_count, 0);
        assert!(!state.connections.is_connected_in_some_way(&gid("{p}")));
    }

    #[test]
    fn test_text_blob_for_us_becomes_message() {
        let mut state = session();
        let info = BlobInfo {
            payload_type: BlobPayloadType::AppTextUtf8,
            source: "{n1}".to_string(),
            target: "{me}".to_string(),
            size: None,
        };
        let (_, events) =
            EventHandlers::handle_blob_received(&mut state, gid("{a}"), info.clone(), b"hello".to_vec()).unwrap();
        assert_eq!(
            events,
            vec![AppEvent::TextMessageReceived {
                group_id: gid("{a}"),
                from: NodeId::new("{n1}"),
                text: "hello".to_string(),
            }]
        );

        let elsewhere = BlobInfo {
            target: "{someone-else}".to_string(),
            ..info
        };
        let (_, events) = EventHandlers::handle_blob_received(&mut state, gid("{a}"), elsewhere, b"hi".to_vec()).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_presence_update_requires_valid_descriptor() {
        let mut state = session();
        assert!(CommandHandlers::handle_update_presence(&mut state, "{}".to_string(), false).is_err());
        let json = r#"{"identity":{"nodeId":"{me}"}}"#.to_string();
        let (effects, _) = CommandHandlers::handle_update_presence(&mut state, json, true).unwrap();
        assert!(matches!(&effects[0], Effect::UpdatePresenceDescriptor { group_id, force: true, .. } if group_id.as_str() == "{p}"));
    }
}
