//! End-to-end session tests
//!
//! Drives a full runtime through the command channel, with the loopback
//! engine answering effects and extra engine reports injected on the event
//! channel where a test needs a specific network outcome.

use engage_core::{
    channel::{AppEvent, Command, Connectivity, Effect},
    config::EngineConfig,
    mission::{GroupDescriptor, MissionConfiguration},
    protocol::RawEngineEvent,
    types::{GroupId, GroupType, NodeId},
};
use engage_runtime::{AppEventReceiver, EffectLog, LoopbackEngine, RuntimeBuilder, RuntimeHandle, SessionView};
use tokio::time::{sleep, timeout, Duration};
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(2);

fn mission() -> MissionConfiguration {
    let mut mission = MissionConfiguration::new("{mission}", "Integration");
    mission
        .push_group(GroupDescriptor::new("{p}", GroupType::Presence, "Presence").with_multicast("239.42.0.1", 7000))
        .unwrap();
    let mut alpha = GroupDescriptor::new("{a}", GroupType::Audio, "Alpha").with_multicast("239.42.0.2", 7001);
    alpha.selected_for_single_view = true;
    mission.push_group(alpha).unwrap();
    mission
}

async fn start(config: EngineConfig) -> (RuntimeHandle, AppEventReceiver, EffectLog) {
    let engine = LoopbackEngine::new();
    let log = engine.effect_log();
    let mut runtime = RuntimeBuilder::new(NodeId::new("{me}"))
        .with_config(config)
        .add_engine(Box::new(engine))
        .build_and_start()
        .await
        .expect("Failed to start runtime");
    let app_events = runtime.take_app_event_receiver().unwrap();
    (runtime, app_events, log)
}

/// Next app event matching `predicate`, skipping everything else
async fn expect_event(app_events: &mut AppEventReceiver, predicate: impl Fn(&AppEvent) -> bool) -> AppEvent {
    timeout(WAIT, async {
        loop {
            match app_events.recv().await {
                Some(event) if predicate(&event) => return event,
                Some(_) => continue,
                None => panic!("App event channel closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for app event")
}

async fn wait_for_effect(log: &EffectLog, predicate: impl Fn(&Effect) -> bool) {
    timeout(WAIT, async {
        while !log.effects().iter().any(&predicate) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for engine effect");
}

async fn wait_until(view: &SessionView, condition: impl Fn(&SessionView) -> bool) {
    timeout(WAIT, async {
        while !condition(view) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for session view");
}

/// Apply the mission, create everything and join the selected groups
async fn bring_up(runtime: &RuntimeHandle) {
    assert_ok!(
        runtime
            .send_command(Command::ApplyMission {
                mission: Box::new(mission()),
            })
            .await
    );
    assert_ok!(runtime.send_command(Command::CreateAllGroups).await);
    wait_until(runtime.view(), |v| {
        !v.is_empty() && v.groups().iter().all(|g| g.lifecycle.is_created())
    })
    .await;
    assert_ok!(runtime.send_command(Command::JoinSelectedGroups).await);
    wait_until(runtime.view(), |v| {
        v.group(&GroupId::new("{a}")).is_some_and(|g| g.joined())
            && v.connectivity(&GroupId::new("{a}")) == Connectivity::Multicast
    })
    .await;
}

fn presence_json(node_id: &str, groups: &[&str]) -> String {
    let aliases: Vec<String> = groups
        .iter()
        .map(|g| format!(r#"{{"groupId":"{}","status":3}}"#, g))
        .collect();
    format!(
        r#"{{"identity":{{"nodeId":"{}","displayName":"Unit {}"}},"groupAliases":[{}]}}"#,
        node_id,
        node_id,
        aliases.join(",")
    )
}

#[tokio::test]
async fn test_join_and_transmit_through_loopback() {
    let (mut runtime, mut app_events, log) = start(EngineConfig::testing()).await;

    expect_event(&mut app_events, |e| matches!(e, AppEvent::EngineStarted)).await;
    bring_up(&runtime).await;
    assert!(runtime.view().group(&GroupId::new("{p}")).is_some_and(|g| g.joined()));

    runtime.send_command(Command::StartTx).await.unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::AnyTxPending).await;
    expect_event(&mut app_events, |e| *e == AppEvent::AnyTxActive).await;
    assert!(runtime.view().is_transmitting());
    wait_for_effect(&log, |e| matches!(e, Effect::UnmuteTx { group_id } if group_id.as_str() == "{a}")).await;

    runtime.send_command(Command::EndTx).await.unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::AnyTxEnding).await;
    expect_event(&mut app_events, |e| *e == AppEvent::AllTxEnded).await;
    wait_until(runtime.view(), |v| !v.is_transmitting()).await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_usurped_transmit_reports_remote_priority() {
    let (mut runtime, mut app_events, _log) = start(EngineConfig::testing()).await;
    bring_up(&runtime).await;

    runtime.send_command(Command::StartTx).await.unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::AnyTxActive).await;

    runtime
        .event_sender()
        .send(
            RawEngineEvent::new("groupTxUsurpedByPriority")
                .with_id("{a}")
                .with_json(r#"{"id":"{a}","remotePriority":5}"#),
        )
        .await
        .unwrap();

    let usurped = expect_event(&mut app_events, |e| matches!(e, AppEvent::GroupTxUsurped { .. })).await;
    assert_eq!(
        usurped,
        AppEvent::GroupTxUsurped {
            group_id: GroupId::new("{a}"),
            remote_priority: Some(5),
        }
    );
    expect_event(&mut app_events, |e| *e == AppEvent::AllTxEnded).await;

    // The set is empty again, so a new transmit is accepted
    runtime.send_command(Command::StartTx).await.unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::AnyTxPending).await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_presence_discovery_and_leave() {
    let (mut runtime, mut app_events, _log) = start(EngineConfig::testing()).await;
    bring_up(&runtime).await;
    let events = runtime.event_sender();

    events
        .send(
            RawEngineEvent::new("groupNodeDiscovered")
                .with_id("{p}")
                .with_json(presence_json("{n1}", &["{a}"])),
        )
        .await
        .unwrap();
    match expect_event(&mut app_events, |e| matches!(e, AppEvent::NodeJoined { .. })).await {
        AppEvent::NodeJoined { node } => assert_eq!(node.friendly_name(), "Unit {n1}"),
        other => panic!("Unexpected event: {:?}", other),
    }
    wait_until(runtime.view(), |v| {
        v.node_count() == 1 && v.group(&GroupId::new("{a}")).is_some_and(|g| g.member_count == 1)
    })
    .await;

    // A rediscovery merges into the known node
    events
        .send(
            RawEngineEvent::new("groupNodeRediscovered")
                .with_id("{p}")
                .with_json(presence_json("{n1}", &[])),
        )
        .await
        .unwrap();
    expect_event(&mut app_events, |e| matches!(e, AppEvent::NodeUpdated { .. })).await;
    wait_until(runtime.view(), |v| {
        v.group(&GroupId::new("{a}")).is_some_and(|g| g.member_count == 0)
    })
    .await;

    runtime
        .send_command(Command::LeaveGroup {
            group_id: GroupId::new("{p}"),
        })
        .await
        .unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::PresenceCleared).await;
    wait_until(runtime.view(), |v| v.node_count() == 0).await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_released_transmit_never_unmutes_after_grant_tone() {
    let mut config = EngineConfig::testing();
    config.transmit.grant_tone_enabled = true;
    config.transmit.unmute_delay_ms = 100;
    let (mut runtime, mut app_events, log) = start(config).await;
    bring_up(&runtime).await;

    runtime.send_command(Command::StartTx).await.unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::AnyTxActive).await;
    runtime.send_command(Command::EndTx).await.unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::AllTxEnded).await;

    sleep(Duration::from_millis(250)).await;
    assert!(!log.effects().iter().any(|e| matches!(e, Effect::UnmuteTx { .. })));

    // Held past the grant tone, the unmute goes out
    runtime.send_command(Command::StartTx).await.unwrap();
    expect_event(&mut app_events, |e| *e == AppEvent::AnyTxActive).await;
    wait_for_effect(&log, |e| matches!(e, Effect::UnmuteTx { .. })).await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_lost_connectivity_raises_network_alert() {
    let (mut runtime, mut app_events, _log) = start(EngineConfig::testing()).await;
    bring_up(&runtime).await;

    runtime
        .event_sender()
        .send(
            RawEngineEvent::new("groupDisconnected")
                .with_id("{a}")
                .with_json(r#"{"groupConnectionDetail":{"id":"{a}","connectionType":1}}"#),
        )
        .await
        .unwrap();
    wait_until(runtime.view(), |v| {
        v.connectivity(&GroupId::new("{a}")) == Connectivity::Disconnected
    })
    .await;

    match expect_event(&mut app_events, |e| matches!(e, AppEvent::NetworkDegraded { .. })).await {
        AppEvent::NetworkDegraded { group_ids } => assert!(group_ids.contains(&GroupId::new("{a}"))),
        other => panic!("Unexpected event: {:?}", other),
    }

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_bad_engine_reports_do_not_stop_the_session() {
    let (mut runtime, mut app_events, _log) = start(EngineConfig::testing()).await;
    let events = runtime.event_sender();

    events.send(RawEngineEvent::new("somethingNew")).await.unwrap();
    events.send(RawEngineEvent::new("groupJoined")).await.unwrap();
    events.send(RawEngineEvent::new("groupJoined").with_id("{unknown}")).await.unwrap();

    runtime.send_command(Command::GetSessionStatus).await.unwrap();
    expect_event(&mut app_events, |e| matches!(e, AppEvent::SessionStatus { .. })).await;
    assert!(runtime.is_running());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_runtimes() {
    let runtimes = futures::future::join_all((0..3).map(|_| start(EngineConfig::testing()))).await;
    for (mut runtime, mut app_events, _log) in runtimes {
        runtime.send_command(Command::GetSessionStatus).await.unwrap();
        expect_event(&mut app_events, |e| matches!(e, AppEvent::SessionStatus { .. })).await;
        runtime.shutdown().await.unwrap();
    }
}
