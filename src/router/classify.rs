//! Event classification: obs-websocket event payloads → [`DomainEvent`]

use serde_json::Value;

use super::events::DomainEvent;
use crate::dispatcher::VOLUME_MIN_DB;
use crate::keys::EntityRef;
use crate::protocol::Event;
use crate::state::{Output, OutputState, OutputStatus};

/// What the router should do with one event
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Domain(DomainEvent),
    /// The remote application is exiting; the close that follows drives reconnection
    Exit,
    /// Event type outside the routed set
    Unknown,
    /// Known event type with a payload we cannot read
    Malformed(String),
}

fn text(data: &Value, field: &str) -> Result<String, String> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("missing string field '{}'", field))
}

fn flag(data: &Value, field: &str) -> Result<bool, String> {
    data.get(field)
        .and_then(Value::as_bool)
        .ok_or_else(|| format!("missing bool field '{}'", field))
}

fn number(data: &Value, field: &str) -> Result<f64, String> {
    data.get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| format!("missing number field '{}'", field))
}

fn integer(data: &Value, field: &str) -> Result<i64, String> {
    data.get(field)
        .and_then(Value::as_i64)
        .ok_or_else(|| format!("missing integer field '{}'", field))
}

/// `(mul, dB)` from `inputVolumeMul` / `inputVolumeDb`.
///
/// OBS reports -inf dB as `null`; the dB value then follows from the
/// multiplier, floored at [`VOLUME_MIN_DB`].
pub(super) fn volume(data: &Value) -> Result<(f64, f64), String> {
    let mul = number(data, "inputVolumeMul")?;
    let db = match data.get("inputVolumeDb").and_then(Value::as_f64) {
        Some(db) => db,
        None if mul > 0.0 => 20.0 * mul.log10(),
        None => VOLUME_MIN_DB,
    };
    Ok((mul, db.max(VOLUME_MIN_DB)))
}

/// Output status from `outputActive` / `outputState`
pub(super) fn output_status(data: &Value) -> Result<OutputStatus, String> {
    let active = flag(data, "outputActive")?;
    let state = match data.get("outputState").and_then(Value::as_str) {
        Some(s) => OutputState::from_wire(s),
        None if active => OutputState::Started,
        None => OutputState::Stopped,
    };
    Ok(OutputStatus::new(active, state))
}

fn output_event(output: Output, data: &Value) -> Result<DomainEvent, String> {
    Ok(DomainEvent::OutputChanged {
        output,
        status: output_status(data)?,
    })
}

/// `Ok(None)` for event types outside the routed set
fn classify_known(event_type: &str, data: &Value) -> Result<Option<DomainEvent>, String> {
    let event = match event_type {
        "CurrentProgramSceneChanged" => DomainEvent::ProgramSceneChanged {
            scene: text(data, "sceneName")?,
        },
        "CurrentPreviewSceneChanged" => DomainEvent::PreviewSceneChanged {
            scene: text(data, "sceneName")?,
        },
        "SceneCreated" => DomainEvent::SceneCreated {
            scene: text(data, "sceneName")?,
        },
        "SceneRemoved" => DomainEvent::SceneRemoved {
            scene: text(data, "sceneName")?,
        },
        "SceneNameChanged" => DomainEvent::SceneRenamed {
            old: text(data, "oldSceneName")?,
            new: text(data, "sceneName")?,
        },

        "InputCreated" => DomainEvent::SourceCreated {
            entity: EntityRef::input(text(data, "inputName")?),
            kind: data
                .get("inputKind")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        "InputRemoved" => DomainEvent::SourceRemoved {
            entity: EntityRef::input(text(data, "inputName")?),
        },
        "InputNameChanged" => DomainEvent::SourceRenamed {
            old: text(data, "oldInputName")?,
            new: text(data, "inputName")?,
        },
        "SceneItemCreated" => DomainEvent::SourceCreated {
            entity: EntityRef::scene_item(text(data, "sceneName")?, integer(data, "sceneItemId")?)
                .with_source_name(text(data, "sourceName")?),
            kind: None,
        },
        "SceneItemRemoved" => DomainEvent::SourceRemoved {
            entity: EntityRef::scene_item(text(data, "sceneName")?, integer(data, "sceneItemId")?),
        },
        "SceneItemEnableStateChanged" => DomainEvent::SourceVisibilityChanged {
            entity: EntityRef::scene_item(text(data, "sceneName")?, integer(data, "sceneItemId")?),
            visible: flag(data, "sceneItemEnabled")?,
        },

        "InputMuteStateChanged" => DomainEvent::MuteChanged {
            entity: EntityRef::input(text(data, "inputName")?),
            muted: flag(data, "inputMuted")?,
        },
        "InputVolumeChanged" => {
            let (mul, db) = volume(data)?;
            DomainEvent::VolumeChanged {
                entity: EntityRef::input(text(data, "inputName")?),
                mul,
                db,
            }
        },

        "SourceFilterCreated" => DomainEvent::FilterCreated {
            entity: EntityRef::input(text(data, "sourceName")?),
            filter: text(data, "filterName")?,
            // Filters are created enabled; the payload has no flag
            enabled: data
                .get("filterEnabled")
                .and_then(Value::as_bool)
                .unwrap_or(true),
        },
        "SourceFilterRemoved" => DomainEvent::FilterRemoved {
            entity: EntityRef::input(text(data, "sourceName")?),
            filter: text(data, "filterName")?,
        },
        "SourceFilterEnableStateChanged" => DomainEvent::FilterEnabledChanged {
            entity: EntityRef::input(text(data, "sourceName")?),
            filter: text(data, "filterName")?,
            enabled: flag(data, "filterEnabled")?,
        },

        "StreamStateChanged" => output_event(Output::Stream, data)?,
        "RecordStateChanged" => output_event(Output::Record, data)?,
        "ReplayBufferStateChanged" => output_event(Output::ReplayBuffer, data)?,
        "VirtualcamStateChanged" => output_event(Output::VirtualCam, data)?,
        "StudioModeStateChanged" => DomainEvent::StudioModeChanged {
            enabled: flag(data, "studioModeEnabled")?,
        },

        "CurrentSceneCollectionChanging" => DomainEvent::SceneCollectionChanging {
            name: text(data, "sceneCollectionName")?,
        },
        "CurrentSceneCollectionChanged" => DomainEvent::SceneCollectionChanged {
            name: text(data, "sceneCollectionName")?,
        },

        _ => return Ok(None),
    };
    Ok(Some(event))
}

/// Classify one event notification
pub fn classify(event: &Event) -> Classified {
    if event.event_type == "ExitStarted" {
        return Classified::Exit;
    }
    match classify_known(&event.event_type, &event.event_data) {
        Ok(Some(domain)) => Classified::Domain(domain),
        Ok(None) => Classified::Unknown,
        Err(reason) => Classified::Malformed(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, data: Value) -> Event {
        Event {
            event_type: event_type.to_string(),
            event_intent: 0,
            event_data: data,
        }
    }

    #[test]
    fn test_scene_item_visibility() {
        let classified = classify(&event(
            "SceneItemEnableStateChanged",
            json!({"sceneName": "Main", "sceneItemId": 4, "sceneItemEnabled": false}),
        ));
        assert_eq!(
            classified,
            Classified::Domain(DomainEvent::SourceVisibilityChanged {
                entity: EntityRef::scene_item("Main", 4),
                visible: false,
            })
        );
    }

    #[test]
    fn test_record_paused() {
        let classified = classify(&event(
            "RecordStateChanged",
            json!({"outputActive": true, "outputState": "OBS_WEBSOCKET_OUTPUT_PAUSED"}),
        ));
        match classified {
            Classified::Domain(DomainEvent::OutputChanged { output, status }) => {
                assert_eq!(output, Output::Record);
                assert!(status.paused);
                assert!(status.is_on());
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_filter_created_defaults_enabled() {
        let classified = classify(&event(
            "SourceFilterCreated",
            json!({"sourceName": "Mic", "filterName": "Gate", "filterKind": "noise_gate_filter"}),
        ));
        assert_eq!(
            classified,
            Classified::Domain(DomainEvent::FilterCreated {
                entity: EntityRef::input("Mic"),
                filter: "Gate".to_string(),
                enabled: true,
            })
        );
    }

    #[test]
    fn test_silent_volume_has_floor_db() {
        let silent = classify(&event(
            "InputVolumeChanged",
            json!({"inputName": "Mic", "inputVolumeMul": 0.0, "inputVolumeDb": null}),
        ));
        assert_eq!(
            silent,
            Classified::Domain(DomainEvent::VolumeChanged {
                entity: EntityRef::input("Mic"),
                mul: 0.0,
                db: VOLUME_MIN_DB,
            })
        );

        let Classified::Domain(DomainEvent::VolumeChanged { db, .. }) = classify(&event(
            "InputVolumeChanged",
            json!({"inputName": "Mic", "inputVolumeMul": 0.5}),
        )) else {
            panic!("expected a volume change");
        };
        assert!((db - -6.0206).abs() < 0.001);

        assert!(matches!(
            classify(&event(
                "InputVolumeChanged",
                json!({"inputName": "Mic", "inputVolumeDb": -6.0}),
            )),
            Classified::Malformed(_)
        ));
    }

    #[test]
    fn test_unknown_and_malformed() {
        assert_eq!(
            classify(&event("SceneTransitionStarted", json!({}))),
            Classified::Unknown
        );
        assert!(matches!(
            classify(&event("InputMuteStateChanged", json!({"inputName": "Mic"}))),
            Classified::Malformed(_)
        ));
        assert_eq!(classify(&event("ExitStarted", Value::Null)), Classified::Exit);
    }
}
