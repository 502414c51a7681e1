//! Engine Task Interface
//!
//! The engine is the component that actually moves audio and presence over the
//! network. The runtime talks to it only through channels: effects in, raw
//! events out. Implementations hold the channel handles attached by the
//! runtime and translate between them and the engine proper.

use async_trait::async_trait;
use engage_core::{
    channel::{Effect, EffectReceiver, EventSender},
    protocol::RawEngineEvent,
    types::GroupId,
    EngageError, EngageResult,
};
use hashbrown::HashSet;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Engine Task Trait
// ----------------------------------------------------------------------------

#[async_trait]
pub trait EngineTask: Send + Sync {
    /// Attach the channels created by the runtime
    ///
    /// Implementations keep these handles and use them for all communication
    /// with the core logic task.
    fn attach_channels(&mut self, event_sender: EventSender, effect_receiver: EffectReceiver) -> EngageResult<()>;

    /// Run until the effect channel closes or the task is aborted
    async fn run(&mut self) -> EngageResult<()>;

    fn name(&self) -> &'static str;
}

// ----------------------------------------------------------------------------
// Loopback Engine
// ----------------------------------------------------------------------------

/// Shared record of every effect an engine received
#[derive(Debug, Clone, Default)]
pub struct EffectLog(Arc<Mutex<Vec<Effect>>>);

impl EffectLog {
    fn record(&self, effect: &Effect) {
        if let Ok(mut effects) = self.0.lock() {
            effects.push(effect.clone());
        }
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.0.lock().map(|effects| effects.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|effects| effects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process engine that accepts every request
///
/// Creates, joins and transmits succeed immediately; joined groups report a
/// multicast connection. Useful for tests and for driving the UI without a
/// network.
#[derive(Debug, Default)]
pub struct LoopbackEngine {
    event_sender: Option<EventSender>,
    effect_receiver: Option<EffectReceiver>,
    transmitting: HashSet<GroupId>,
    log: EffectLog,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effect_log(&self) -> EffectLog {
        self.log.clone()
    }

    /// Engine reports for one effect
    fn respond(&mut self, effect: &Effect) -> Vec<RawEngineEvent> {
        let Some(group_id) = effect.group_id() else {
            return Vec::new();
        };
        let id = group_id.as_str();

        match effect {
            Effect::CreateGroup { .. } => vec![RawEngineEvent::new("groupCreated").with_id(id)],
            Effect::DeleteGroup { .. } => {
                self.transmitting.remove(group_id);
                vec![RawEngineEvent::new("groupDeleted").with_id(id)]
            }
            Effect::JoinGroup { .. } => {
                let detail = json!({
                    "groupConnectionDetail": { "id": id, "connectionType": 1, "asFailover": false }
                });
                vec![
                    RawEngineEvent::new("groupJoined").with_id(id),
                    RawEngineEvent::new("groupConnected").with_id(id).with_json(detail.to_string()),
                ]
            }
            Effect::LeaveGroup { .. } => {
                self.transmitting.remove(group_id);
                vec![RawEngineEvent::new("groupLeft").with_id(id)]
            }
            Effect::BeginTx { .. } => {
                self.transmitting.insert(group_id.clone());
                let detail = json!({ "id": id, "status": 1 });
                vec![RawEngineEvent::new("groupTxStarted").with_id(id).with_json(detail.to_string())]
            }
            Effect::EndTx { .. } => {
                if self.transmitting.remove(group_id) {
                    vec![RawEngineEvent::new("groupTxEnded").with_id(id)]
                } else {
                    Vec::new()
                }
            }
            Effect::MuteRx { .. } => vec![RawEngineEvent::new("groupRxMuted").with_id(id)],
            Effect::UnmuteRx { .. } => vec![RawEngineEvent::new("groupRxUnmuted").with_id(id)],
            Effect::QueryGroupTimeline { .. } => {
                let report = json!({ "id": id, "events": [] });
                vec![RawEngineEvent::new("groupTimelineReport").with_id(id).with_json(report.to_string())]
            }
            _ => Vec::new(),
        }
    }
}

#[async_trait]
impl EngineTask for LoopbackEngine {
    fn attach_channels(&mut self, event_sender: EventSender, effect_receiver: EffectReceiver) -> EngageResult<()> {
        self.event_sender = Some(event_sender);
        self.effect_receiver = Some(effect_receiver);
        Ok(())
    }

    async fn run(&mut self) -> EngageResult<()> {
        let event_sender = self
            .event_sender
            .clone()
            .ok_or_else(|| EngageError::config_error("Loopback engine has no event channel attached"))?;
        let mut effect_receiver = self
            .effect_receiver
            .take()
            .ok_or_else(|| EngageError::config_error("Loopback engine has no effect channel attached"))?;

        info!("Loopback engine started");
        if event_sender.send(RawEngineEvent::new("engineStarted")).await.is_err() {
            return Ok(());
        }

        loop {
            let effect = match effect_receiver.recv().await {
                Ok(effect) => effect,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Loopback engine fell behind; effects skipped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            self.log.record(&effect);
            for event in self.respond(&effect) {
                if event_sender.send(event).await.is_err() {
                    debug!("Core logic task gone; loopback engine stopping");
                    return Ok(());
                }
            }
        }

        let _ = event_sender.send(RawEngineEvent::new("engineStopped")).await;
        info!("Loopback engine stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}
