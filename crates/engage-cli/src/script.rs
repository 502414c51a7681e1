//! Scripted sessions
//!
//! A script is a text file with one JSON step per line. Blank lines and lines
//! starting with `#` are skipped. Each step is either a UI command, an engine
//! report fed through the [`ScriptedEngine`], or a pause:
//!
//! ```text
//! {"step": "createAllGroups"}
//! {"step": "engine", "kind": "groupCreated", "id": "{a}"}
//! {"step": "startTx"}
//! {"step": "wait", "ms": 200}
//! ```

use async_trait::async_trait;
use engage_core::{
    channel::{Command, Effect, EffectReceiver, EventSender, SelectionView, TimelineQuery},
    protocol::RawEngineEvent,
    types::{GroupId, UiMode},
    EngageError, EngageResult, LicenseCredentials,
};
use engage_runtime::EngineTask;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, warn};

use crate::error::{CliError, Result};

/// Buffered engine reports waiting to be forwarded
const FEED_BUFFER: usize = 64;

// ----------------------------------------------------------------------------
// Script Steps
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "camelCase")]
pub enum ScriptStep {
    CreateGroup {
        group: String,
    },
    CreateAllGroups,
    JoinGroup {
        group: String,
    },
    JoinSelectedGroups,
    LeaveGroup {
        group: String,
    },
    LeaveAllGroups,
    DeleteGroup {
        group: String,
    },
    SetUiMode {
        mode: UiMode,
    },
    /// Without `selected` the group becomes the single-view selection
    SelectGroup {
        group: String,
        #[serde(default)]
        selected: Option<bool>,
    },
    SetTxSelected {
        group: String,
        selected: bool,
    },
    StartTx,
    EndTx,
    SetRxMuted {
        group: String,
        muted: bool,
    },
    UpdatePresence {
        descriptor: Value,
        #[serde(default)]
        force: bool,
    },
    UpdateLicense {
        credentials: LicenseCredentials,
    },
    QueryTimeline {
        group: String,
        #[serde(default)]
        query: Option<TimelineQuery>,
    },
    Status,
    /// Engine report, in the same shape the engine delivers it
    #[serde(rename_all = "camelCase")]
    Engine {
        kind: String,
        #[serde(default)]
        id: Option<String>,
        /// Either a JSON string or an inline JSON value
        #[serde(default)]
        json: Option<Value>,
        #[serde(default)]
        payload_hex: Option<String>,
        #[serde(default)]
        seconds_left: Option<u64>,
    },
    Wait {
        ms: u64,
    },
}

/// What the replay driver does with one step
#[derive(Debug, Clone)]
pub enum ScriptAction {
    Command(Command),
    Engine(RawEngineEvent),
    Wait(Duration),
}

impl ScriptStep {
    pub fn into_action(self) -> std::result::Result<ScriptAction, hex::FromHexError> {
        let command = match self {
            ScriptStep::CreateGroup { group } => Command::CreateGroup {
                group_id: GroupId::new(group),
            },
            ScriptStep::CreateAllGroups => Command::CreateAllGroups,
            ScriptStep::JoinGroup { group } => Command::JoinGroup {
                group_id: GroupId::new(group),
            },
            ScriptStep::JoinSelectedGroups => Command::JoinSelectedGroups,
            ScriptStep::LeaveGroup { group } => Command::LeaveGroup {
                group_id: GroupId::new(group),
            },
            ScriptStep::LeaveAllGroups => Command::LeaveAllGroups,
            ScriptStep::DeleteGroup { group } => Command::DeleteGroup {
                group_id: GroupId::new(group),
            },
            ScriptStep::SetUiMode { mode } => Command::SetUiMode { mode },
            ScriptStep::SelectGroup { group, selected } => Command::SelectGroup {
                group_id: GroupId::new(group),
                view: match selected {
                    None => SelectionView::Single,
                    Some(selected) => SelectionView::Multi { selected },
                },
            },
            ScriptStep::SetTxSelected { group, selected } => Command::SetTxSelected {
                group_id: GroupId::new(group),
                selected,
            },
            ScriptStep::StartTx => Command::StartTx,
            ScriptStep::EndTx => Command::EndTx,
            ScriptStep::SetRxMuted { group, muted } => Command::SetRxMuted {
                group_id: GroupId::new(group),
                muted,
            },
            ScriptStep::UpdatePresence { descriptor, force } => Command::UpdatePresence {
                descriptor_json: json_text(descriptor),
                force,
            },
            ScriptStep::UpdateLicense { credentials } => Command::UpdateLicense { credentials },
            ScriptStep::QueryTimeline { group, query } => Command::QueryGroupTimeline {
                group_id: GroupId::new(group),
                query: query.unwrap_or_default(),
            },
            ScriptStep::Status => Command::GetSessionStatus,
            ScriptStep::Engine {
                kind,
                id,
                json,
                payload_hex,
                seconds_left,
            } => {
                let mut raw = RawEngineEvent::new(kind);
                raw.id = id;
                raw.json = json.map(json_text);
                raw.payload = payload_hex.map(hex::decode).transpose()?;
                raw.seconds_left = seconds_left;
                return Ok(ScriptAction::Engine(raw));
            }
            ScriptStep::Wait { ms } => return Ok(ScriptAction::Wait(Duration::from_millis(ms))),
        };
        Ok(ScriptAction::Command(command))
    }
}

/// String values pass through untouched; anything else is re-encoded
fn json_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// Parse a whole script, reporting the 1-based line of the first bad step
pub fn parse_script(text: &str) -> Result<Vec<ScriptAction>> {
    let mut actions = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: ScriptStep =
            serde_json::from_str(line).map_err(|e| CliError::script(index + 1, e.to_string()))?;
        let action = step
            .into_action()
            .map_err(|e| CliError::script(index + 1, format!("bad payload_hex: {}", e)))?;
        actions.push(action);
    }
    Ok(actions)
}

// ----------------------------------------------------------------------------
// Scripted Engine
// ----------------------------------------------------------------------------

/// Driver side of a [`ScriptedEngine`]
pub struct ScriptFeed {
    /// Engine reports to deliver, in order
    pub reports: mpsc::Sender<RawEngineEvent>,
    /// One line per effect the engine received
    pub effects: mpsc::UnboundedReceiver<String>,
}

/// Engine that answers nothing on its own
///
/// Reports come from the script through the feed; effects issued by the core
/// are described back to the driver so a replay shows what the engine would
/// have been asked to do.
pub struct ScriptedEngine {
    event_sender: Option<EventSender>,
    effect_receiver: Option<EffectReceiver>,
    reports: mpsc::Receiver<RawEngineEvent>,
    effects: mpsc::UnboundedSender<String>,
}

impl ScriptedEngine {
    pub fn new() -> (Self, ScriptFeed) {
        let (report_tx, report_rx) = mpsc::channel(FEED_BUFFER);
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();
        let engine = Self {
            event_sender: None,
            effect_receiver: None,
            reports: report_rx,
            effects: effect_tx,
        };
        let feed = ScriptFeed {
            reports: report_tx,
            effects: effect_rx,
        };
        (engine, feed)
    }
}

#[async_trait]
impl EngineTask for ScriptedEngine {
    fn attach_channels(&mut self, event_sender: EventSender, effect_receiver: EffectReceiver) -> EngageResult<()> {
        self.event_sender = Some(event_sender);
        self.effect_receiver = Some(effect_receiver);
        Ok(())
    }

    async fn run(&mut self) -> EngageResult<()> {
        let event_sender = self
            .event_sender
            .clone()
            .ok_or_else(|| EngageError::config_error("Scripted engine has no event channel attached"))?;
        let mut effect_receiver = self
            .effect_receiver
            .take()
            .ok_or_else(|| EngageError::config_error("Scripted engine has no effect channel attached"))?;

        info!("Scripted engine started");
        if event_sender.send(RawEngineEvent::new("engineStarted")).await.is_err() {
            return Ok(());
        }

        let mut feed_open = true;
        loop {
            tokio::select! {
                report = self.reports.recv(), if feed_open => match report {
                    Some(raw) => {
                        debug!(kind = %raw.kind, id = ?raw.id, "Scripted engine report");
                        if event_sender.send(raw).await.is_err() {
                            debug!("Core logic task gone; scripted engine stopping");
                            return Ok(());
                        }
                    }
                    None => feed_open = false,
                },

                effect = effect_receiver.recv() => match effect {
                    Ok(effect) => {
                        let _ = self.effects.send(describe_effect(&effect));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Scripted engine fell behind; effects skipped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        let _ = event_sender.send(RawEngineEvent::new("engineStopped")).await;
        info!("Scripted engine stopped");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// One-line rendering of an effect; secrets are left out
pub fn describe_effect(effect: &Effect) -> String {
    match effect {
        Effect::CreateGroup { group_id, .. } => format!("createGroup {}", group_id),
        Effect::DeleteGroup { group_id } => format!("deleteGroup {}", group_id),
        Effect::JoinGroup { group_id } => format!("joinGroup {}", group_id),
        Effect::LeaveGroup { group_id } => format!("leaveGroup {}", group_id),
        Effect::BeginTx { group_id, params } => format!(
            "beginTx {} priority={} flags={} muted={}",
            group_id, params.priority, params.flags, params.muted
        ),
        Effect::EndTx { group_id } => format!("endTx {}", group_id),
        Effect::UnmuteTx { group_id } => format!("unmuteTx {}", group_id),
        Effect::MuteRx { group_id } => format!("muteRx {}", group_id),
        Effect::UnmuteRx { group_id } => format!("unmuteRx {}", group_id),
        Effect::UpdatePresenceDescriptor { group_id, force, .. } => {
            format!("updatePresenceDescriptor {} force={}", group_id, force)
        }
        Effect::UpdateLicense { .. } => "updateLicense".to_string(),
        Effect::OpenCertStore { path, .. } => format!("openCertStore {}", path),
        Effect::QueryGroupTimeline { group_id, query_json } => {
            format!("queryGroupTimeline {} {}", group_id, query_json)
        }
        Effect::ScheduleCommand { delay, .. } => format!("scheduleCommand after {:?}", delay),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::channel::{create_effect_channel, create_event_channel, ChannelConfig};

    #[test]
    fn test_parse_script_steps() {
        let text = r#"
# bring up
{"step": "createAllGroups"}
{"step": "engine", "kind": "groupCreated", "id": "{a}"}
{"step": "selectGroup", "group": "{a}", "selected": true}
{"step": "engine", "kind": "groupConnected", "id": "{a}", "json": {"groupConnectionDetail": {"id": "{a}", "connectionType": 2}}}
{"step": "engine", "kind": "groupBlobReceived", "id": "{a}", "payloadHex": "68690a"}
{"step": "wait", "ms": 20}
"#;
        let actions = parse_script(text).unwrap();
        assert_eq!(actions.len(), 6);
        assert!(matches!(actions[0], ScriptAction::Command(Command::CreateAllGroups)));
        assert!(matches!(
            &actions[2],
            ScriptAction::Command(Command::SelectGroup { view: SelectionView::Multi { selected: true }, .. })
        ));
        match &actions[3] {
            ScriptAction::Engine(raw) => {
                assert!(raw.json.as_deref().unwrap().contains("\"connectionType\":2"));
            }
            other => panic!("Unexpected action: {:?}", other),
        }
        match &actions[4] {
            ScriptAction::Engine(raw) => assert_eq!(raw.payload.as_deref(), Some(&b"hi\n"[..])),
            other => panic!("Unexpected action: {:?}", other),
        }
        assert!(matches!(actions[5], ScriptAction::Wait(d) if d == Duration::from_millis(20)));
    }

    #[test]
    fn test_bad_lines_report_their_number() {
        let text = "{\"step\": \"startTx\"}\n\n{\"step\": \"fly\"}\n";
        match parse_script(text) {
            Err(CliError::Script { line, .. }) => assert_eq!(line, 3),
            other => panic!("Unexpected result: {:?}", other),
        }

        let text = r#"{"step": "engine", "kind": "groupBlobReceived", "payloadHex": "zz"}"#;
        assert!(matches!(parse_script(text), Err(CliError::Script { line: 1, .. })));
    }

    #[test]
    fn test_string_json_passes_through() {
        let text = r#"{"step": "updatePresence", "descriptor": "{\"identity\":{}}", "force": true}"#;
        match parse_script(text).unwrap().pop() {
            Some(ScriptAction::Command(Command::UpdatePresence { descriptor_json, force })) => {
                assert_eq!(descriptor_json, r#"{"identity":{}}"#);
                assert!(force);
            }
            other => panic!("Unexpected action: {:?}", other),
        }
    }

    #[test]
    fn test_describe_effect_hides_password() {
        let line = describe_effect(&Effect::OpenCertStore {
            path: "/certs/store".to_string(),
            password: "secret".to_string(),
        });
        assert_eq!(line, "openCertStore /certs/store");
    }

    #[tokio::test]
    async fn test_scripted_engine_forwards_and_reports() {
        let config = ChannelConfig::testing();
        let (event_sender, mut event_receiver) = create_event_channel(&config);
        let (effect_sender, effect_receiver) = create_effect_channel(&config);

        let (mut engine, mut feed) = ScriptedEngine::new();
        engine.attach_channels(event_sender, effect_receiver).unwrap();
        let handle = tokio::spawn(async move { engine.run().await });

        assert_eq!(event_receiver.recv().await.unwrap().kind, "engineStarted");

        feed.reports
            .send(RawEngineEvent::new("groupCreated").with_id("{a}"))
            .await
            .unwrap();
        assert_eq!(event_receiver.recv().await.unwrap().kind, "groupCreated");

        effect_sender
            .send(Effect::JoinGroup {
                group_id: GroupId::new("{a}"),
            })
            .unwrap();
        assert_eq!(feed.effects.recv().await.unwrap(), "joinGroup {a}");

        drop(effect_sender);
        assert_eq!(event_receiver.recv().await.unwrap().kind, "engineStopped");
        handle.await.unwrap().unwrap();
    }
}
