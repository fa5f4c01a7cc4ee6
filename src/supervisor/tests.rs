//! Supervisor lifecycle tests against the in-memory transport

use super::*;
use crate::bridge::Bridge;
use crate::dispatcher::{CommandOutcome, CommandPolicy, OutputSwitch};
use crate::keys::EntityRef;
use crate::state::Output;
use crate::transport::memory::MemoryListener;
use crate::transport::MemoryConnector;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

fn test_config(probe_attempts: u32) -> SupervisorConfig {
    SupervisorConfig {
        probe_attempts,
        ..Default::default()
    }
}

fn bridge(config: SupervisorConfig) -> (Bridge, Arc<MemoryConnector>, MemoryListener) {
    let (connector, listener) = MemoryConnector::new();
    let bridge = Bridge::new(config, CommandPolicy::default(), connector.clone());
    (bridge, connector, listener)
}

fn record_lifecycle(bridge: &Bridge) -> mpsc::UnboundedReceiver<LifecycleEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    bridge.lifecycle().subscribe_all(move |event| {
        let _ = tx.send(event.clone());
    });
    rx
}

/// Collect events until one matches, returning everything seen
async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<LifecycleEvent>,
    pred: impl Fn(&LifecycleEvent) -> bool,
) -> Vec<LifecycleEvent> {
    let mut seen = Vec::new();
    timeout(Duration::from_secs(120), async {
        while let Some(event) = rx.recv().await {
            let done = pred(&event);
            seen.push(event);
            if done {
                return;
            }
        }
    })
    .await
    .expect("lifecycle event within timeout");
    seen
}

fn is_connected(event: &LifecycleEvent) -> bool {
    matches!(event, LifecycleEvent::Connected)
}

fn is_disconnected(event: &LifecycleEvent) -> bool {
    matches!(event, LifecycleEvent::Disconnected { .. })
}

fn error_statuses(events: &[LifecycleEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, LifecycleEvent::StatusChanged(info) if info.health == Health::Error))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_probe_survives_five_refusals() {
    let (bridge, connector, mut listener) = bridge(test_config(20));
    let mut events = record_lifecycle(&bridge);
    connector.refuse_next(5);

    let started = Instant::now();
    bridge.start().await;

    let mut remote = listener.accept().await.unwrap();
    assert!(remote.serve_handshake(None).await.is_some());
    let seen = wait_for(&mut events, is_connected).await;

    assert_eq!(connector.attempts(), 6);
    assert_eq!(bridge.status().state, ConnectionState::Connected);
    assert_eq!(bridge.health(), Health::Normal);
    assert!(started.elapsed() >= Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(20));

    // Authenticating was observed between connect and Connected
    assert!(seen.iter().any(|e| matches!(
        e,
        LifecycleEvent::StatusChanged(info) if info.state == ConnectionState::Authenticating
    )));

    // Stay connected for a while: no Error status may follow success
    tokio::time::sleep(Duration::from_secs(30)).await;
    let mut after = Vec::new();
    while let Ok(event) = events.try_recv() {
        after.push(event);
    }
    assert_eq!(error_statuses(&after), 0);
    assert_eq!(bridge.health(), Health::Normal);
    drop(remote);
}

#[tokio::test(start_paused = true)]
async fn test_probe_exhaustion_reports_error() {
    let (bridge, connector, _listener) = bridge(test_config(3));
    let mut events = record_lifecycle(&bridge);
    connector.refuse_next(100);

    bridge.start().await;
    let seen = wait_for(&mut events, is_disconnected).await;

    assert_eq!(connector.attempts(), 3);
    assert_eq!(bridge.status().state, ConnectionState::Disconnected);
    assert_eq!(bridge.health(), Health::Error);
    assert!(!seen.iter().any(is_connected));

    // A fresh start probes again
    connector.refuse_next(100);
    bridge.start().await;
    wait_for(&mut events, is_disconnected).await;
    assert_eq!(connector.attempts(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_handshake_stops_probe() {
    let (bridge, connector, mut listener) = bridge(test_config(20));
    let mut events = record_lifecycle(&bridge);

    bridge.start().await;
    let mut remote = listener.accept().await.unwrap();
    assert!(remote.serve_handshake(Some("secret")).await.is_none());

    let seen = wait_for(&mut events, is_disconnected).await;
    assert_eq!(bridge.health(), Health::Error);
    assert!(bridge
        .status()
        .last_error
        .is_some_and(|e| e.contains("handshake rejected")));
    assert!(!seen.iter().any(is_connected));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_reports_error_without_connecting() {
    let mut config = test_config(20);
    config.endpoint.host = String::new();
    let (bridge, connector, _listener) = bridge(config);
    let mut events = record_lifecycle(&bridge);

    bridge.start().await;
    wait_for(&mut events, is_disconnected).await;

    assert_eq!(bridge.health(), Health::Error);
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resets_cache_and_reidentifies() {
    let (bridge, connector, mut listener) = bridge(test_config(20));
    let mut events = record_lifecycle(&bridge);

    bridge.start().await;
    let mut remote = listener.accept().await.unwrap();
    remote.serve_handshake(None).await.unwrap();
    wait_for(&mut events, is_connected).await;

    remote.emit("InputMuteStateChanged", json!({"inputName": "Mic", "inputMuted": true}));
    remote.emit("StudioModeStateChanged", json!({"studioModeEnabled": true}));
    timeout(Duration::from_secs(5), async {
        while bridge.cache().studio_mode().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(!bridge.cache().is_empty());

    // Remote goes away mid-session
    remote.close(1006, "abnormal closure");
    drop(remote);
    wait_for(&mut events, is_disconnected).await;
    assert!(bridge.cache().is_empty());
    assert_eq!(bridge.status().state, ConnectionState::Reconnecting);
    assert_eq!(
        bridge.dispatcher().turn_on(&OutputSwitch(Output::Stream)).await,
        CommandOutcome::NotConnected
    );

    // Reconnection performs a full handshake again
    let mut remote = listener.accept().await.unwrap();
    let subscriptions = remote.serve_handshake(None).await;
    assert_eq!(subscriptions, Some(EventSubscription::ROUTED.bits()));
    wait_for(&mut events, is_connected).await;
    assert_eq!(connector.attempts(), 2);
    assert_eq!(bridge.health(), Health::Normal);

    // Refresh reads are issued on the new session
    let first = remote.next_request().await.unwrap();
    assert!(first.request_type.starts_with("Get"));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_outlasts_probe_attempts() {
    let (bridge, connector, mut listener) = bridge(test_config(3));
    let mut events = record_lifecycle(&bridge);

    bridge.start().await;
    let mut remote = listener.accept().await.unwrap();
    remote.serve_handshake(None).await.unwrap();
    wait_for(&mut events, is_connected).await;

    // More refusals than the startup probe would tolerate
    connector.refuse_next(10);
    remote.close(1006, "abnormal closure");
    drop(remote);
    wait_for(&mut events, is_disconnected).await;

    let mut remote = listener.accept().await.unwrap();
    remote.serve_handshake(None).await.unwrap();
    let seen = wait_for(&mut events, is_connected).await;

    assert!(!seen.iter().any(is_disconnected));
    assert!(seen.iter().any(|e| matches!(
        e,
        LifecycleEvent::StatusChanged(info) if info.state == ConnectionState::Reconnecting
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        LifecycleEvent::StatusChanged(info) if info.retry_count == 11
    )));
    assert_eq!(connector.attempts(), 12);
    assert_eq!(bridge.status().state, ConnectionState::Connected);
    assert_eq!(bridge.health(), Health::Normal);
}

#[tokio::test(start_paused = true)]
async fn test_stop_tears_down() {
    let (bridge, _connector, mut listener) = bridge(test_config(20));
    let mut events = record_lifecycle(&bridge);

    bridge.start().await;
    let mut remote = listener.accept().await.unwrap();
    remote.serve_handshake(None).await.unwrap();
    wait_for(&mut events, is_connected).await;
    remote.emit("SceneCreated", json!({"sceneName": "Main"}));

    bridge.stop().await;

    assert_eq!(bridge.status().state, ConnectionState::Disconnected);
    assert!(bridge.cache().is_empty());
    assert_eq!(
        bridge
            .dispatcher()
            .set_program_scene(&EntityRef::scene("Main"))
            .await,
        CommandOutcome::NotConnected
    );
    let seen = wait_for(&mut events, is_disconnected).await;
    assert!(seen.iter().any(|e| matches!(
        e,
        LifecycleEvent::Disconnected { reason } if reason == "stopped"
    )));

    // Client hung up: the remote sees the end of the stream
    while remote.next_frame().await.is_some() {}
}
