//! Cross-group transmit arbitration
//!
//! One audio path is shared by every group, so at most one set of groups
//! transmits at a time. The [`TransmitManager`] owns that set and moves each
//! member's [`TxState`] as begin/end requests and engine outcomes arrive.
//!
//! Unmuting after a grant tone is scheduled as a delayed command tagged with
//! the transmit generation. Any later start or end bumps the generation, so a
//! stale unmute is recognised and dropped.

use crate::managers::groups::GroupManager;
use engage_core::{
    channel::{AppEvent, Command, Effect},
    config::TransmitConfig,
    errors::TransmitError,
    protocol::transmit::{AdvancedTxParams, GroupTxDetail, TxEvent, TxOutcome, TxState},
    types::{GroupId, GroupType, Timestamp, UiMode},
};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

/// Effects and notifications produced by one arbitration step
pub type TxOutput = (Vec<Effect>, Vec<AppEvent>);

#[derive(Debug, Default)]
pub struct TransmitManager {
    tx_set: SmallVec<[GroupId; 4]>,
    generation: u64,
    stats: TransmitStats,
}

impl TransmitManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_set(&self) -> &[GroupId] {
        &self.tx_set
    }

    pub fn is_transmitting(&self) -> bool {
        !self.tx_set.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stats(&self) -> &TransmitStats {
        &self.stats
    }

    // ---- Local Requests ----

    /// Push-to-talk pressed
    ///
    /// Fails fast without touching any state when a transmit is already in
    /// progress or nothing eligible is selected.
    pub fn start_tx(&mut self, groups: &mut GroupManager, config: &TransmitConfig) -> Result<TxOutput, TransmitError> {
        if !self.tx_set.is_empty() {
            self.stats.rejected += 1;
            return Err(TransmitError::AlreadyActive {
                active: self.tx_set.len(),
            });
        }

        let selected: Vec<(GroupId, bool)> = groups
            .mission()
            .map(|m| {
                m.selected_groups(config.ui_mode)
                    .into_iter()
                    .map(|g| (g.id.clone(), g.tx_selected))
                    .collect()
            })
            .unwrap_or_default();
        if selected.is_empty() {
            self.stats.rejected += 1;
            return Err(TransmitError::NoGroupsSelected);
        }

        let eligible: SmallVec<[GroupId; 4]> = selected
            .iter()
            .filter(|(_, tx_selected)| config.ui_mode == UiMode::Single || *tx_selected)
            .map(|(id, _)| id.clone())
            .collect();
        if eligible.is_empty() {
            self.stats.rejected += 1;
            return Err(TransmitError::NoEligibleGroups {
                selected: selected.len(),
            });
        }

        self.generation += 1;
        let params = AdvancedTxParams::from_config(config);
        let mut effects = Vec::with_capacity(eligible.len());
        for group_id in &eligible {
            if let Some(runtime) = groups.runtime_mut(group_id) {
                // Stale in-flight state outside the set is cleared before requesting
                let current = if runtime.tx.is_in_flight() { TxState::Idle } else { runtime.tx };
                runtime.tx = current.transition(TxEvent::Requested).unwrap_or(TxState::Pending);
            }
            effects.push(Effect::BeginTx {
                group_id: group_id.clone(),
                params: params.clone(),
            });
        }

        info!(groups = eligible.len(), priority = params.priority, "Transmit requested");
        self.tx_set = eligible;
        self.stats.started += 1;
        Ok((effects, vec![AppEvent::AnyTxPending]))
    }

    /// Push-to-talk released; safe in any state
    pub fn end_tx(&mut self, groups: &mut GroupManager) -> TxOutput {
        let effects: Vec<Effect> = groups
            .ids_of_type(GroupType::Audio)
            .into_iter()
            .map(|group_id| Effect::EndTx { group_id })
            .collect();

        let in_flight: Vec<GroupId> = groups
            .group_ids()
            .into_iter()
            .filter(|id| groups.runtime(id).is_some_and(|r| r.tx.is_in_flight()))
            .collect();

        self.tx_set.clear();
        self.generation += 1;

        if in_flight.is_empty() {
            debug!("End transmit with nothing in flight");
            return (effects, Vec::new());
        }

        for group_id in &in_flight {
            if let Some(runtime) = groups.runtime_mut(group_id) {
                runtime.tx = runtime.tx.transition(TxEvent::Released).unwrap_or(TxState::Idle);
            }
        }
        self.stats.ended += 1;
        info!(groups = in_flight.len(), "Transmit released");
        (effects, vec![AppEvent::AnyTxEnding, AppEvent::AllTxEnded])
    }

    /// Grant-tone delay expired for the transmit started under `generation`
    pub fn complete_pending_unmute(&mut self, groups: &GroupManager, group_id: &GroupId, generation: u64) -> Vec<Effect> {
        let still_active = generation == self.generation
            && self.tx_set.contains(group_id)
            && groups.runtime(group_id).is_some_and(|r| r.tx == TxState::Active);

        if still_active {
            vec![Effect::UnmuteTx {
                group_id: group_id.clone(),
            }]
        } else {
            self.stats.unmutes_suppressed += 1;
            debug!(group_id = %group_id, generation, current = self.generation, "Suppressing stale unmute");
            Vec::new()
        }
    }

    // ---- Engine Outcomes ----

    pub fn on_tx_started(
        &mut self,
        groups: &mut GroupManager,
        group_id: &GroupId,
        now: Timestamp,
        config: &TransmitConfig,
    ) -> TxOutput {
        if !self.tx_set.contains(group_id) {
            debug!(group_id = %group_id, "Transmit start for group outside the transmit set");
            return (Vec::new(), Vec::new());
        }
        let Some(runtime) = groups.runtime_mut(group_id) else {
            return (Vec::new(), Vec::new());
        };

        match runtime.tx.transition(TxEvent::Started) {
            Ok(next) => runtime.tx = next,
            Err(e) => {
                warn!(group_id = %group_id, "Ignoring transmit start: {:?}", e);
                return (Vec::new(), Vec::new());
            }
        }
        runtime.last_tx_start = Some(now);

        let effect = if config.grant_tone_enabled {
            Effect::ScheduleCommand {
                delay: config.unmute_delay(),
                command: Box::new(Command::CompletePendingUnmute {
                    group_id: group_id.clone(),
                    generation: self.generation,
                }),
            }
        } else {
            Effect::UnmuteTx {
                group_id: group_id.clone(),
            }
        };
        (vec![effect], vec![AppEvent::AnyTxActive])
    }

    /// A terminal transmit outcome reported by the engine
    pub fn on_tx_terminated(
        &mut self,
        groups: &mut GroupManager,
        group_id: &GroupId,
        outcome: TxOutcome,
        detail: Option<&GroupTxDetail>,
    ) -> Vec<AppEvent> {
        let was_member = self.remove_from_set(group_id);

        if let Some(runtime) = groups.runtime_mut(group_id) {
            runtime.tx = runtime.tx.transition(TxEvent::Terminated(outcome)).unwrap_or(outcome.into());
            if outcome == TxOutcome::Ended {
                runtime.last_tx_start = None;
            }
        }

        let mut events = Vec::new();
        match outcome {
            TxOutcome::Ended => {}
            TxOutcome::Failed => {
                self.stats.failed += 1;
                warn!(group_id = %group_id, status = ?detail.map(|d| d.status), "Transmit failed");
                events.push(AppEvent::GroupTxFailed {
                    group_id: group_id.clone(),
                    status: detail.map(|d| d.status),
                });
            }
            TxOutcome::Usurped => {
                self.stats.usurped += 1;
                info!(group_id = %group_id, "Transmit usurped by higher priority");
                events.push(AppEvent::GroupTxUsurped {
                    group_id: group_id.clone(),
                    remote_priority: detail.and_then(|d| d.remote_priority),
                });
            }
            TxOutcome::Expired => {
                self.stats.expired += 1;
                info!(group_id = %group_id, "Maximum transmit time exceeded");
                events.push(AppEvent::GroupTxMaxTimeExceeded {
                    group_id: group_id.clone(),
                });
            }
        }

        self.clear_stale(groups);
        if was_member && self.tx_set.is_empty() {
            events.push(AppEvent::AllTxEnded);
        }
        events
    }

    /// Drop a group that left or was deleted; returns true if the set emptied
    pub fn forget(&mut self, group_id: &GroupId) -> bool {
        self.remove_from_set(group_id) && self.tx_set.is_empty()
    }

    pub fn clear(&mut self) {
        self.tx_set.clear();
        self.generation += 1;
    }

    fn remove_from_set(&mut self, group_id: &GroupId) -> bool {
        let before = self.tx_set.len();
        self.tx_set.retain(|id| id != group_id);
        before != self.tx_set.len()
    }

    /// Groups outside the set may not stay pending or active
    fn clear_stale(&self, groups: &mut GroupManager) {
        for group_id in groups.group_ids() {
            if self.tx_set.contains(&group_id) {
                continue;
            }
            if let Some(runtime) = groups.runtime_mut(&group_id) {
                if runtime.tx.is_in_flight() {
                    debug!(group_id = %group_id, state = %runtime.tx, "Clearing stale transmit state");
                    runtime.tx = TxState::Idle;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransmitStats {
    pub started: u64,
    pub ended: u64,
    pub rejected: u64,
    pub failed: u64,
    pub usurped: u64,
    pub expired: u64,
    pub unmutes_suppressed: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
