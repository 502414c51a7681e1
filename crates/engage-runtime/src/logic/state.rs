//! Core Logic State Management
//!
//! Contains the session state owned by the core logic task and its statistics.

use crate::managers::{ConnectionManager, GroupManager, PresenceManager, TransmitManager};
use engage_core::{
    channel::{GroupSnapshot, SessionStatusReport},
    config::{SharedEngineConfig, TransmitConfig},
    license::LicenseState,
    types::{NodeId, TimeSource, Timestamp, UiMode},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// All mutable session tables, owned by the core logic task
pub struct SessionState {
    /// Our node identity
    pub node_id: NodeId,
    pub config: SharedEngineConfig,
    pub groups: GroupManager,
    pub connections: ConnectionManager,
    pub presence: PresenceManager,
    pub transmit: TransmitManager,
    pub license: LicenseState,
    /// Current view mode; starts from the transmit configuration
    pub ui_mode: UiMode,
    pub engine_running: bool,
    pub start_time: Timestamp,
    pub stats: CoreStats,
    time_source: Arc<dyn TimeSource>,
}

impl SessionState {
    pub fn new(node_id: NodeId, config: SharedEngineConfig, time_source: Arc<dyn TimeSource>) -> Self {
        let start_time = time_source.now();
        Self {
            node_id,
            groups: GroupManager::new(),
            connections: ConnectionManager::new(),
            presence: PresenceManager::new(config.presence.clone()),
            transmit: TransmitManager::new(),
            license: LicenseState::default(),
            ui_mode: config.transmit.ui_mode,
            engine_running: false,
            start_time,
            stats: CoreStats::default(),
            config,
            time_source,
        }
    }

    pub fn now(&self) -> Timestamp {
        self.time_source.now()
    }

    /// Transmit settings under the current view mode
    pub fn transmit_config(&self) -> TransmitConfig {
        TransmitConfig {
            ui_mode: self.ui_mode,
            ..self.config.transmit.clone()
        }
    }

    pub fn snapshots(&self) -> Vec<GroupSnapshot> {
        self.groups
            .group_ids()
            .iter()
            .filter_map(|id| self.groups.snapshot(id, self.connections.state(id)))
            .collect()
    }

    pub fn status_report(&self) -> SessionStatusReport {
        SessionStatusReport {
            mission_id: self.groups.mission().map(|m| m.id.clone()),
            engine_running: self.engine_running,
            group_count: self.groups.group_ids().len(),
            created_count: self.groups.count_where(|r| r.created()),
            joined_count: self.groups.count_where(|r| r.joined()),
            connected_count: self.connections.connected_count(),
            tx_group_count: self.transmit.tx_set().len(),
            node_count: self.presence.len(),
            uptime_seconds: self.now().duration_since(self.start_time) / 1000,
        }
    }
}

/// Statistics for the core logic task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStats {
    pub commands_processed: u64,
    pub commands_failed: u64,
    pub events_processed: u64,
    pub events_rejected: u64,
    pub effects_generated: u64,
    pub app_events_generated: u64,
    pub app_events_dropped: u64,
    pub health_checks: u64,
}
