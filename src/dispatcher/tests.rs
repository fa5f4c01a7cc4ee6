//! Tests for the command dispatcher

use super::*;
use crate::router::DomainEvent;
use crate::state::{OutputState, OutputStatus};
use crate::transport::memory::RemoteEnd;
use crate::transport::{Connector, Endpoint, MemoryConnector};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

struct Harness {
    dispatcher: Dispatcher,
    cache: Arc<StateCache>,
    outbox: Arc<Outbox>,
    remote: RemoteEnd,
}

async fn connected() -> Harness {
    let (connector, mut listener) = MemoryConnector::new();
    let conn = connector.connect(&Endpoint::default()).await.unwrap();
    let remote = listener.accept().await.unwrap();

    let cache = Arc::new(StateCache::new());
    let outbox = Arc::new(Outbox::new(CommandPolicy::default()));
    assert!(outbox.attach(conn.sink, &CancellationToken::new()).await);

    Harness {
        dispatcher: Dispatcher::new(Arc::clone(&cache), Arc::clone(&outbox)),
        cache,
        outbox,
        remote,
    }
}

fn seed(cache: &StateCache, events: Vec<DomainEvent>) {
    for event in &events {
        cache.apply(event);
    }
}

fn mic_muted(muted: bool) -> Vec<DomainEvent> {
    vec![
        DomainEvent::SourceCreated {
            entity: EntityRef::input("Mic"),
            kind: Some("wasapi_input_capture".to_string()),
        },
        DomainEvent::MuteChanged {
            entity: EntityRef::input("Mic"),
            muted,
        },
    ]
}

fn request_data(h: &mut Harness) -> (String, Value) {
    let frame = h.remote.try_next_frame().expect("a request was sent");
    match crate::protocol::Message::parse(&frame).unwrap() {
        crate::protocol::Message::Request(r) => (r.request_type, r.request_data.unwrap_or(Value::Null)),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_turn_on_when_cached_on_is_noop() {
    let mut h = connected().await;
    seed(&h.cache, mic_muted(true));

    let mute = Mute(EntityRef::input("Mic"));
    assert_eq!(h.dispatcher.turn_on(&mute).await, CommandOutcome::NoOp);
    assert!(h.remote.try_next_frame().is_none());
    assert_eq!(h.outbox.pending_count(), 0);
}

#[tokio::test]
async fn test_sent_command_leaves_cache_unchanged() {
    let mut h = connected().await;
    seed(&h.cache, mic_muted(false));
    let before = h.cache.snapshot();

    let mute = Mute(EntityRef::input("Mic"));
    let outcome = h.dispatcher.turn_on(&mute).await;
    assert!(outcome.is_sent());

    // Remote never confirms
    tokio::task::yield_now().await;
    assert_eq!(h.cache.snapshot(), before);
    assert_eq!(h.outbox.pending_count(), 1);

    let (request_type, data) = request_data(&mut h);
    assert_eq!(request_type, SET_INPUT_MUTE);
    assert_eq!(data["inputMuted"], Value::Bool(true));
}

#[tokio::test]
async fn test_not_connected() {
    let cache = Arc::new(StateCache::new());
    let outbox = Arc::new(Outbox::new(CommandPolicy::default()));
    let dispatcher = Dispatcher::new(cache, outbox);

    assert_eq!(
        dispatcher.turn_on(&OutputSwitch(Output::Stream)).await,
        CommandOutcome::NotConnected
    );
    assert_eq!(
        dispatcher.set_program_scene(&EntityRef::scene("Main")).await,
        CommandOutcome::NotConnected
    );
}

#[tokio::test]
async fn test_toggle_flips_cached_state() {
    let mut h = connected().await;
    seed(
        &h.cache,
        vec![DomainEvent::OutputChanged {
            output: Output::Record,
            status: OutputStatus::new(true, OutputState::Started),
        }],
    );

    assert!(h.dispatcher.toggle(&OutputSwitch(Output::Record)).await.is_sent());
    assert_eq!(request_data(&mut h).0, STOP_RECORD);
}

#[tokio::test]
async fn test_toggle_unknown_state_uses_remote_toggle() {
    let mut h = connected().await;

    assert!(h.dispatcher.toggle(&OutputSwitch(Output::Stream)).await.is_sent());
    assert_eq!(request_data(&mut h).0, TOGGLE_STREAM);

    assert!(matches!(
        h.dispatcher.toggle(&StudioMode).await,
        CommandOutcome::InvalidTarget(_)
    ));
    assert!(h.remote.try_next_frame().is_none());
}

#[tokio::test]
async fn test_turn_on_unknown_state_is_sent_unvalidated() {
    let mut h = connected().await;
    assert!(h.dispatcher.turn_on(&StudioMode).await.is_sent());
    let (request_type, data) = request_data(&mut h);
    assert_eq!(request_type, SET_STUDIO_MODE_ENABLED);
    assert_eq!(data["studioModeEnabled"], Value::Bool(true));
}

#[tokio::test]
async fn test_unknown_input_is_invalid() {
    let mut h = connected().await;
    let outcome = h.dispatcher.turn_off(&Mute(EntityRef::input("Ghost"))).await;
    assert!(matches!(outcome, CommandOutcome::InvalidTarget(_)));
    assert!(h.remote.try_next_frame().is_none());
}

#[tokio::test]
async fn test_program_scene_validation() {
    let mut h = connected().await;
    seed(
        &h.cache,
        vec![
            DomainEvent::SceneCreated {
                scene: "Intro".to_string(),
            },
            DomainEvent::ProgramSceneChanged {
                scene: "Main".to_string(),
            },
        ],
    );

    assert_eq!(
        h.dispatcher.set_program_scene(&EntityRef::scene("Main")).await,
        CommandOutcome::NoOp
    );
    assert!(matches!(
        h.dispatcher.set_program_scene(&EntityRef::scene("Nowhere")).await,
        CommandOutcome::InvalidTarget(_)
    ));
    assert!(h
        .dispatcher
        .set_program_scene(&EntityRef::scene("Intro"))
        .await
        .is_sent());
    let (request_type, data) = request_data(&mut h);
    assert_eq!(request_type, SET_CURRENT_PROGRAM_SCENE);
    assert_eq!(data["sceneName"], "Intro");
}

#[tokio::test]
async fn test_select_scene_follows_studio_mode() {
    let mut h = connected().await;
    seed(
        &h.cache,
        vec![
            DomainEvent::SceneCreated {
                scene: "B".to_string(),
            },
            DomainEvent::StudioModeChanged { enabled: true },
        ],
    );

    assert!(h.dispatcher.select_scene(&EntityRef::scene("B")).await.is_sent());
    assert_eq!(request_data(&mut h).0, SET_CURRENT_PREVIEW_SCENE);

    h.cache
        .apply(&DomainEvent::StudioModeChanged { enabled: false });
    assert!(matches!(
        h.dispatcher.set_preview_scene(&EntityRef::scene("B")).await,
        CommandOutcome::InvalidTarget(_)
    ));
    assert!(matches!(
        h.dispatcher.trigger_transition().await,
        CommandOutcome::InvalidTarget(_)
    ));
}

#[tokio::test]
async fn test_adjust_volume_clamps() {
    let mut h = connected().await;
    seed(&h.cache, mic_muted(false));

    assert!(matches!(
        h.dispatcher.adjust_volume_db(&EntityRef::input("Mic"), 3.0).await,
        CommandOutcome::InvalidTarget(_)
    ));

    h.cache.apply(&DomainEvent::VolumeChanged {
        entity: EntityRef::input("Mic"),
        mul: 17.78,
        db: 25.0,
    });
    assert!(h
        .dispatcher
        .adjust_volume_db(&EntityRef::input("Mic"), 5.0)
        .await
        .is_sent());
    let (_, data) = request_data(&mut h);
    assert_eq!(data["inputVolumeDb"].as_f64(), Some(VOLUME_MAX_DB));

    h.cache.apply(&DomainEvent::VolumeChanged {
        entity: EntityRef::input("Mic"),
        mul: 19.95,
        db: VOLUME_MAX_DB,
    });
    assert_eq!(
        h.dispatcher.adjust_volume_db(&EntityRef::input("Mic"), 5.0).await,
        CommandOutcome::NoOp
    );
}

#[tokio::test]
async fn test_visibility_by_source_name() {
    let mut h = connected().await;
    seed(
        &h.cache,
        vec![
            DomainEvent::SceneCreated {
                scene: "Main".to_string(),
            },
            DomainEvent::SourceCreated {
                entity: EntityRef::scene_item("Main", 12).with_source_name("Webcam"),
                kind: None,
            },
            DomainEvent::SourceVisibilityChanged {
                entity: EntityRef::scene_item("Main", 12),
                visible: true,
            },
        ],
    );

    let switch = Visibility(EntityRef::scene_item_named("Main", "Webcam"));
    assert_eq!(h.dispatcher.turn_on(&switch).await, CommandOutcome::NoOp);
    assert!(h.dispatcher.toggle(&switch).await.is_sent());

    let (request_type, data) = request_data(&mut h);
    assert_eq!(request_type, SET_SCENE_ITEM_ENABLED);
    assert_eq!(data["sceneItemId"], 12);
    assert_eq!(data["sceneItemEnabled"], false);
}

#[tokio::test]
async fn test_save_replay_requires_active_buffer() {
    let mut h = connected().await;
    assert!(matches!(
        h.dispatcher.save_replay_buffer().await,
        CommandOutcome::InvalidTarget(_)
    ));

    h.cache.apply(&DomainEvent::OutputChanged {
        output: Output::ReplayBuffer,
        status: OutputStatus::new(true, OutputState::Started),
    });
    assert!(h.dispatcher.save_replay_buffer().await.is_sent());
    assert_eq!(request_data(&mut h).0, SAVE_REPLAY_BUFFER);
}

#[tokio::test]
async fn test_record_pause_requires_recording() {
    let h = connected().await;
    h.cache.apply(&DomainEvent::OutputChanged {
        output: Output::Record,
        status: OutputStatus::new(false, OutputState::Stopped),
    });
    assert!(matches!(
        h.dispatcher.turn_on(&RecordPause).await,
        CommandOutcome::InvalidTarget(_)
    ));
}

#[tokio::test]
async fn test_filter_on_scene_source() {
    let mut h = connected().await;
    seed(
        &h.cache,
        vec![DomainEvent::SceneCreated {
            scene: "Main".to_string(),
        }],
    );

    let switch = FilterSwitch::new(EntityRef::scene("Main"), "Blur");
    assert!(h.dispatcher.turn_on(&switch).await.is_sent());
    let (request_type, data) = request_data(&mut h);
    assert_eq!(request_type, SET_SOURCE_FILTER_ENABLED);
    assert_eq!(data["sourceName"], "Main");
    assert_eq!(data["filterName"], "Blur");
}

#[tokio::test]
async fn test_filter_missing_from_known_list_is_invalid() {
    let mut h = connected().await;
    let mut events = mic_muted(false);
    events.push(DomainEvent::FilterCreated {
        entity: EntityRef::input("Mic"),
        filter: "Gate".to_string(),
        enabled: false,
    });
    seed(&h.cache, events);

    let outcome = h
        .dispatcher
        .turn_on(&FilterSwitch::new(EntityRef::input("Mic"), "Blur"))
        .await;
    assert!(matches!(outcome, CommandOutcome::InvalidTarget(_)));
    assert!(h.remote.try_next_frame().is_none());
    assert_eq!(h.outbox.pending_count(), 0);

    let gate = FilterSwitch::new(EntityRef::input("Mic"), "Gate");
    assert!(h.dispatcher.turn_on(&gate).await.is_sent());
    assert_eq!(request_data(&mut h).0, SET_SOURCE_FILTER_ENABLED);
}

#[tokio::test]
async fn test_volume_adjust_from_silence() {
    let mut h = connected().await;
    seed(&h.cache, mic_muted(false));
    h.cache.apply(&DomainEvent::VolumeChanged {
        entity: EntityRef::input("Mic"),
        mul: 0.0,
        db: VOLUME_MIN_DB,
    });

    assert!(h
        .dispatcher
        .adjust_volume_db(&EntityRef::input("Mic"), 6.0)
        .await
        .is_sent());
    let (_, data) = request_data(&mut h);
    assert_eq!(data["inputVolumeDb"].as_f64(), Some(VOLUME_MIN_DB + 6.0));
}

#[tokio::test]
async fn test_scene_collection_noop_when_current() {
    let h = connected().await;
    h.cache.apply(&DomainEvent::SceneCollectionChanged {
        name: "Show".to_string(),
    });
    assert_eq!(
        h.dispatcher.set_scene_collection("Show").await,
        CommandOutcome::NoOp
    );
    assert!(h.dispatcher.set_scene_collection("Rehearsal").await.is_sent());
}
