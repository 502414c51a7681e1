//! Core Logic Task Implementation
//!
//! Contains the main CoreLogicTask struct and its coordination logic.

use super::handlers::{CommandHandlers, EventHandlers, HandlerOutput};
use super::state::{CoreStats, SessionState};
use crate::health::HealthMonitor;
use crate::view::SessionView;
use engage_core::{
    channel::{
        AppEvent, AppEventSender, ChannelStats, Command, CommandReceiver, CommandSender, Effect, EffectSender,
        EventReceiver,
    },
    protocol::{EngineEvent, RawEngineEvent},
    EngageResult,
};
use std::time::Duration;
use tokio::sync::mpsc::{error::TrySendError, WeakSender};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Lower bound on the health tick so a zero interval cannot spin
const MIN_HEALTH_INTERVAL: Duration = Duration::from_millis(1);

// ----------------------------------------------------------------------------
// Core Logic Task
// ----------------------------------------------------------------------------

/// The core logic task that processes all commands and engine events
pub struct CoreLogicTask {
    /// Session tables, owned exclusively by this task
    state: SessionState,
    health: HealthMonitor,
    /// Commands from the UI
    command_receiver: CommandReceiver,
    /// Re-entry path for scheduled commands; weak so the channel can still close
    command_loopback: WeakSender<Command>,
    /// Raw reports from the engine
    event_receiver: EventReceiver,
    /// Engine commands
    effect_sender: EffectSender,
    /// Notifications for the UI
    app_event_sender: AppEventSender,
    view: SessionView,
    app_event_stats: ChannelStats,
    effect_stats: ChannelStats,
    /// Whether the task should continue running
    running: bool,
}

impl CoreLogicTask {
    pub fn new(
        state: SessionState,
        command_sender: &CommandSender,
        command_receiver: CommandReceiver,
        event_receiver: EventReceiver,
        effect_sender: EffectSender,
        app_event_sender: AppEventSender,
        view: SessionView,
    ) -> Self {
        let channels = &state.config.channels;
        let app_event_stats = ChannelStats::new("app_event", channels.app_event_buffer_size);
        let effect_stats = ChannelStats::new("effect", channels.effect_buffer_size);
        let health = HealthMonitor::new(state.config.health.clone());

        Self {
            state,
            health,
            command_receiver,
            command_loopback: command_sender.downgrade(),
            event_receiver,
            effect_sender,
            app_event_sender,
            view,
            app_event_stats,
            effect_stats,
            running: true,
        }
    }

    /// Run the main core logic loop until shutdown or the command channel closes
    pub async fn run(&mut self) -> EngageResult<()> {
        info!(node_id = %self.state.node_id, "Core logic task starting");
        self.publish_view();

        let period = self.health.config().interval().max(MIN_HEALTH_INTERVAL);
        let mut health_tick = interval_at(Instant::now() + self.health.config().initial_delay(), period);
        health_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        while self.running {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(cmd) => {
                            if let Err(e) = self.process_command(cmd) {
                                if e.is_fatal() {
                                    error!("Unrecoverable error processing command, shutting down: {}", e);
                                    self.running = false;
                                    break;
                                }
                                self.state.stats.commands_failed += 1;
                                warn!("Command rejected: {}", e);
                                self.send_app_event(AppEvent::GeneralError { error: e.to_string() });
                            }
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                event = self.event_receiver.recv(), if events_open => {
                    match event {
                        Some(raw) => {
                            if let Err(e) = self.process_event(raw) {
                                if e.is_fatal() {
                                    error!("Unrecoverable error processing engine event, shutting down: {}", e);
                                    self.running = false;
                                    break;
                                }
                                self.state.stats.events_rejected += 1;
                                warn!("Engine event rejected: {}", e);
                            }
                        }
                        None => {
                            info!("Engine event channel closed");
                            // Keep serving commands without an engine
                            events_open = false;
                        }
                    }
                }

                _ = health_tick.tick() => {
                    self.run_health_check();
                }
            }
        }

        info!("Core logic task stopped");
        Ok(())
    }

    /// Stop the core logic task after the current iteration
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn stats(&self) -> &CoreStats {
        &self.state.stats
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    // ------------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------------

    fn process_command(&mut self, command: Command) -> EngageResult<()> {
        self.state.stats.commands_processed += 1;

        let state = &mut self.state;
        let output = match command {
            Command::ApplyMission { mission } => CommandHandlers::handle_apply_mission(state, *mission)?,
            Command::AddDynamicGroup { group } => CommandHandlers::handle_add_dynamic_group(state, *group)?,
            Command::CreateGroup { group_id } => CommandHandlers::handle_create_group(state, group_id)?,
            Command::CreateAllGroups => CommandHandlers::handle_create_all_groups(state)?,
            Command::JoinGroup { group_id } => CommandHandlers::handle_join_group(state, group_id)?,
            Command::JoinSelectedGroups => CommandHandlers::handle_join_selected_groups(state)?,
            Command::LeaveGroup { group_id } => CommandHandlers::handle_leave_group(state, group_id)?,
            Command::LeaveAllGroups => CommandHandlers::handle_leave_all_groups(state)?,
            Command::DeleteGroup { group_id } => CommandHandlers::handle_delete_group(state, group_id)?,
            Command::SetUiMode { mode } => CommandHandlers::handle_set_ui_mode(state, mode)?,
            Command::SelectGroup { group_id, view } => CommandHandlers::handle_select_group(state, group_id, view)?,
            Command::SetTxSelected { group_id, selected } => {
                CommandHandlers::handle_set_tx_selected(state, group_id, selected)?
            }
            Command::StartTx => CommandHandlers::handle_start_tx(state)?,
            Command::EndTx => CommandHandlers::handle_end_tx(state)?,
            Command::SetRxMuted { group_id, muted } => CommandHandlers::handle_set_rx_muted(state, group_id, muted)?,
            Command::UpdatePresence { descriptor_json, force } => {
                CommandHandlers::handle_update_presence(state, descriptor_json, force)?
            }
            Command::UpdateLicense { credentials } => CommandHandlers::handle_update_license(state, credentials)?,
            Command::OpenCertStore { path, password } => CommandHandlers::handle_open_cert_store(path, password)?,
            Command::QueryGroupTimeline { group_id, query } => {
                CommandHandlers::handle_query_group_timeline(state, group_id, query)?
            }
            Command::GetSessionStatus => CommandHandlers::handle_get_session_status(state)?,
            Command::CompletePendingUnmute { group_id, generation } => {
                CommandHandlers::handle_complete_pending_unmute(state, group_id, generation)?
            }
            Command::Shutdown => {
                info!("Shutdown requested");
                self.running = false;
                (Vec::new(), Vec::new())
            }
        };

        self.dispatch(output);
        Ok(())
    }

    fn process_event(&mut self, raw: RawEngineEvent) -> EngageResult<()> {
        self.state.stats.events_processed += 1;
        let event = EngineEvent::decode(raw, self.state.now())?;
        debug!(kind = event.kind(), group_id = ?event.group_id(), "Engine event");

        let output = EventHandlers::handle(&mut self.state, event)?;
        self.dispatch(output);
        Ok(())
    }

    /// Health tick: degraded network alert plus multicast failover notices
    fn run_health_check(&mut self) {
        self.state.stats.health_checks += 1;
        let now = self.state.now();

        let mut events = Vec::new();
        if let Some(alert) = self.health.check(&self.state.groups, &self.state.connections, now) {
            events.push(alert);
        }

        let failover = self
            .state
            .groups
            .mission()
            .map(|m| m.multicast_failover(self.state.config.failover))
            .unwrap_or(self.state.config.failover);
        for (group_id, lost_for_ms) in self.state.connections.due_failovers(now, failover) {
            info!(group_id = %group_id, lost_for_ms, "Multicast lost past failover threshold");
            events.push(AppEvent::FailoverPending { group_id, lost_for_ms });
        }

        if !events.is_empty() {
            self.dispatch((Vec::new(), events));
        }
    }

    // ------------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------------

    /// Refresh the view, then send effects and app events in order
    fn dispatch(&mut self, (effects, app_events): HandlerOutput) {
        self.publish_view();
        for effect in effects {
            self.send_effect(effect);
        }
        for app_event in app_events {
            self.send_app_event(app_event);
        }
    }

    fn publish_view(&self) {
        self.view.publish(
            self.state.snapshots(),
            self.state.presence.len(),
            self.state.transmit.is_transmitting(),
        );
    }

    fn send_effect(&mut self, effect: Effect) {
        self.state.stats.effects_generated += 1;

        if let Effect::ScheduleCommand { delay, command } = effect {
            self.schedule_command(delay, *command);
            return;
        }

        trace!(group_id = ?effect.group_id(), "Sending effect");
        match self.effect_sender.send(effect) {
            Ok(_) => {
                self.effect_stats.record_send_success();
                self.effect_stats.update_utilization(self.effect_sender.len());
            }
            Err(_) => {
                self.effect_stats.record_send_dropped();
                warn!("No engine is listening; effect dropped");
            }
        }
    }

    fn schedule_command(&self, delay: Duration, command: Command) {
        let loopback = self.command_loopback.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match loopback.upgrade() {
                Some(sender) => {
                    if sender.send(command).await.is_err() {
                        debug!("Core logic task gone; scheduled command dropped");
                    }
                }
                None => debug!("Command channel closed; scheduled command dropped"),
            }
        });
    }

    /// Never blocks; a full or closed UI channel drops the event
    fn send_app_event(&mut self, app_event: AppEvent) {
        self.state.stats.app_events_generated += 1;
        match self.app_event_sender.try_send(app_event) {
            Ok(()) => {
                self.app_event_stats.record_send_success();
                let buffered = self
                    .app_event_stats
                    .buffer_size
                    .saturating_sub(self.app_event_sender.capacity());
                self.app_event_stats.update_utilization(buffered);
            }
            Err(TrySendError::Full(dropped)) => {
                self.state.stats.app_events_dropped += 1;
                self.app_event_stats.record_send_dropped();
                warn!(?dropped, "App event channel full; event dropped");
            }
            Err(TrySendError::Closed(_)) => {
                self.state.stats.app_events_dropped += 1;
                self.app_event_stats.record_send_dropped();
                debug!("App event receiver gone; event dropped");
            }
        }
    }

    pub fn app_event_stats(&self) -> &ChannelStats {
        &self.app_event_stats
    }

    pub fn effect_stats(&self) -> &ChannelStats {
        &self.effect_stats
    }
}
