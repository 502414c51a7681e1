//! Command handlers for the Engage CLI

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use engage_core::{
    channel::{AppEvent, Command},
    mission::MissionConfiguration,
    types::GroupType,
    MissionDatabase, TransportPlan,
};
use engage_runtime::{AppEventReceiver, RuntimeBuilder};

use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::error::Result;
use crate::script::{parse_script, ScriptAction, ScriptFeed, ScriptedEngine};

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command, writing its report to stdout
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        let mut out = std::io::stdout();

        match cli.command {
            Commands::Validate { path, database } => Self::handle_validate(&path, database, &mut out),
            Commands::Inspect { path, json } => Self::handle_inspect(&path, json, &config, &mut out),
            Commands::Template { name, output } => Self::handle_template(&name, output.as_deref(), &mut out),
            Commands::Replay { mission, script } => {
                let mission = MissionConfiguration::parse(&std::fs::read_to_string(&mission)?)?;
                let actions = parse_script(&std::fs::read_to_string(&script)?)?;
                let summary = run_replay(&config, mission, actions, &mut out).await?;
                info!(
                    steps = summary.steps,
                    app_events = summary.app_events,
                    effects = summary.effects,
                    "Replay finished"
                );
                Ok(())
            }
            Commands::ExampleConfig => {
                write!(out, "{}", AppConfig::example_config())?;
                Ok(())
            }
        }
    }

    fn handle_validate(path: &Path, database: bool, out: &mut impl Write) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        if database {
            let database = MissionDatabase::from_json(&text)?;
            writeln!(out, "Mission database OK: {} mission(s)", database.len())?;
            for mission in database.iter() {
                writeln!(out, "  {} {} ({} groups)", mission.id, mission.name, mission.groups().len())?;
            }
            return Ok(());
        }

        let mission = MissionConfiguration::parse(&text)?;
        writeln!(
            out,
            "Mission OK: {} ({}) with {} groups",
            mission.name,
            mission.id,
            mission.groups().len()
        )?;
        if mission.groups_of_type(GroupType::Presence).next().is_none() {
            warn!("Mission has no presence group");
            writeln!(out, "  warning: no presence group")?;
        }
        Ok(())
    }

    fn handle_inspect(path: &Path, json: bool, config: &AppConfig, out: &mut impl Write) -> Result<()> {
        let mission = MissionConfiguration::parse(&std::fs::read_to_string(path)?)?;
        let report = MissionReport::build(&mission, config);

        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
            return Ok(());
        }

        writeln!(out, "Mission {} ({})", report.name, report.mission_id)?;
        writeln!(out, "Rallypoint: {}", if report.uses_rallypoint { "on" } else { "off" })?;
        writeln!(
            out,
            "{:<40} {:<9} {:<16} {:<28} {:<3} {:<3} {:<3}",
            "ID", "TYPE", "NAME", "TRANSPORT", "SV", "MV", "TX"
        )?;
        for group in &report.groups {
            writeln!(
                out,
                "{:<40} {:<9} {:<16} {:<28} {:<3} {:<3} {:<3}",
                group.id,
                group.group_type,
                group.name,
                group.transport,
                flag(group.single_view),
                flag(group.multi_view),
                flag(group.tx_selected),
            )?;
        }
        Ok(())
    }

    fn handle_template(name: &str, output: Option<&Path>, out: &mut impl Write) -> Result<()> {
        let text = MissionConfiguration::sample(name).serialize();
        match output {
            Some(path) => {
                std::fs::write(path, &text)?;
                info!(path = %path.display(), "Mission template written");
            }
            None => writeln!(out, "{}", text)?,
        }
        Ok(())
    }
}

fn flag(set: bool) -> &'static str {
    if set {
        "*"
    } else {
        "-"
    }
}

// ----------------------------------------------------------------------------
// Mission Report
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionReport {
    pub mission_id: String,
    pub name: String,
    pub uses_rallypoint: bool,
    pub groups: Vec<GroupReport>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupReport {
    pub id: String,
    pub group_type: String,
    pub name: String,
    pub transport: String,
    pub single_view: bool,
    pub multi_view: bool,
    pub tx_selected: bool,
    pub dynamic: bool,
}

impl MissionReport {
    pub fn build(mission: &MissionConfiguration, config: &AppConfig) -> Self {
        let groups = mission
            .groups()
            .iter()
            .map(|group| GroupReport {
                id: group.id.to_string(),
                group_type: group.group_type.to_string(),
                name: group.name.clone(),
                transport: match TransportPlan::for_group(mission, group, config.engine.failover) {
                    TransportPlan::Multicast => "multicast".to_string(),
                    TransportPlan::Rallypoint { host, .. } => format!("rallypoint {}:{}", host.address, host.port),
                    TransportPlan::Unusable => "unusable".to_string(),
                },
                single_view: group.selected_for_single_view,
                multi_view: group.selected_for_multi_view,
                tx_selected: group.tx_selected,
                dynamic: group.dynamic,
            })
            .collect();

        Self {
            mission_id: mission.id.clone(),
            name: mission.name.clone(),
            uses_rallypoint: mission.use_rp(),
            groups,
        }
    }
}

// ----------------------------------------------------------------------------
// Replay
// ----------------------------------------------------------------------------

/// Counts from a finished replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub steps: usize,
    pub app_events: usize,
    pub effects: usize,
}

/// Run `actions` against a fresh runtime with `mission` applied
///
/// After every step the driver waits `replay.settle_ms`, then writes the
/// effects the engine received (`effect ...`) and the app events raised
/// (`event {json}`). A final status report closes the run.
pub async fn run_replay<W: Write>(
    config: &AppConfig,
    mission: MissionConfiguration,
    actions: Vec<ScriptAction>,
    out: &mut W,
) -> Result<ReplaySummary> {
    let (engine, mut feed) = ScriptedEngine::new();
    let mut runtime = RuntimeBuilder::new(config.node_id())
        .with_config(config.engine.clone())
        .add_engine(Box::new(engine))
        .build_and_start()
        .await?;
    let mut app_events = runtime
        .take_app_event_receiver()
        .ok_or_else(|| engage_core::EngageError::channel_error("App event receiver already taken"))?;

    let mut summary = ReplaySummary::default();
    info!(mission_id = %mission.id, steps = actions.len(), "Starting replay");
    runtime.send_command(Command::ApplyMission {
        mission: Box::new(mission),
    })
    .await?;
    settle_and_drain(config, &mut app_events, &mut feed, &mut summary, out).await?;

    for action in actions {
        summary.steps += 1;
        match action {
            ScriptAction::Command(command) => runtime.send_command(command).await?,
            ScriptAction::Engine(raw) => {
                if feed.reports.send(raw).await.is_err() {
                    warn!("Scripted engine stopped; remaining reports dropped");
                }
            }
            ScriptAction::Wait(duration) => sleep(duration).await,
        }
        settle_and_drain(config, &mut app_events, &mut feed, &mut summary, out).await?;
    }

    runtime.send_command(Command::GetSessionStatus).await?;
    settle_and_drain(config, &mut app_events, &mut feed, &mut summary, out).await?;

    if timeout(config.replay.shutdown_timeout(), runtime.shutdown()).await.is_err() {
        warn!("Runtime did not shut down in time");
    }
    Ok(summary)
}

async fn settle_and_drain<W: Write>(
    config: &AppConfig,
    app_events: &mut AppEventReceiver,
    feed: &mut ScriptFeed,
    summary: &mut ReplaySummary,
    out: &mut W,
) -> Result<()> {
    sleep(config.replay.settle()).await;

    loop {
        match feed.effects.try_recv() {
            Ok(line) => {
                summary.effects += 1;
                if config.replay.show_effects {
                    writeln!(out, "effect {}", line)?;
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }

    loop {
        match app_events.try_recv() {
            Ok(event) => {
                summary.app_events += 1;
                write_event(&event, out)?;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    Ok(())
}

fn write_event<W: Write>(event: &AppEvent, out: &mut W) -> Result<()> {
    writeln!(out, "event {}", serde_json::to_string(event)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_core::mission::GroupDescriptor;

    fn mission() -> MissionConfiguration {
        let mut mission = MissionConfiguration::new("{m}", "Replay");
        mission
            .push_group(GroupDescriptor::new("{p}", GroupType::Presence, "Presence").with_multicast("239.7.0.1", 7100))
            .unwrap();
        let mut alpha = GroupDescriptor::new("{a}", GroupType::Audio, "Alpha").with_multicast("239.7.0.2", 7101);
        alpha.selected_for_single_view = true;
        mission.push_group(alpha).unwrap();
        mission
    }

    fn replay_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.engine = engage_core::EngineConfig::testing();
        config.identity.node_id = Some("{me}".to_string());
        config.replay.settle_ms = 30;
        config
    }

    #[test]
    fn test_validate_reports_groups() {
        let path = std::env::temp_dir().join(format!("engage-validate-{}.json", std::process::id()));
        std::fs::write(&path, mission().serialize()).unwrap();

        let mut out = Vec::new();
        CommandDispatcher::handle_validate(&path, false, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Mission OK: Replay ({m}) with 2 groups"));
        assert!(!text.contains("warning"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_validate_rejects_garbage() {
        let path = std::env::temp_dir().join(format!("engage-garbage-{}.json", std::process::id()));
        std::fs::write(&path, "not json").unwrap();
        let mut out = Vec::new();
        assert!(CommandDispatcher::handle_validate(&path, false, &mut out).is_err());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_mission_report_plans_transport() {
        let report = MissionReport::build(&mission(), &AppConfig::default());
        assert_eq!(report.groups.len(), 2);
        assert!(!report.uses_rallypoint);
        assert!(report.groups.iter().all(|g| g.transport == "multicast"));
        assert!(report.groups[1].single_view);
    }

    #[test]
    fn test_template_round_trips_through_parse() {
        let mut out = Vec::new();
        CommandDispatcher::handle_template("Field Day", None, &mut out).unwrap();
        let mission = MissionConfiguration::parse(&String::from_utf8(out).unwrap()).unwrap();
        assert_eq!(mission.name, "Field Day");
        assert_eq!(mission.groups().len(), 3);
    }

    #[tokio::test]
    async fn test_replay_drives_session() {
        let script = r#"
{"step": "createAllGroups"}
{"step": "engine", "kind": "groupCreated", "id": "{p}"}
{"step": "engine", "kind": "groupCreated", "id": "{a}"}
{"step": "joinSelectedGroups"}
{"step": "engine", "kind": "groupJoined", "id": "{a}"}
{"step": "engine", "kind": "groupConnected", "id": "{a}", "json": {"groupConnectionDetail": {"id": "{a}", "connectionType": 1}}}
{"step": "startTx"}
{"step": "engine", "kind": "groupTxStarted", "id": "{a}"}
"#;
        let actions = parse_script(script).unwrap();
        let mut out = Vec::new();
        let summary = run_replay(&replay_config(), mission(), actions, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(summary.steps, 8);
        assert!(text.contains("effect createGroup {a}"));
        assert!(text.contains("effect joinGroup {a}"));
        assert!(text.contains("effect beginTx {a}"));
        assert!(text.contains("\"MissionApplied\""));
        assert!(text.contains("\"AnyTxActive\""));
        assert!(text.contains("\"SessionStatus\""));
        assert!(summary.effects >= 3);
    }
}
