//! State refresh after (re)connection
//!
//! Most state is only pushed when it changes, so after every handshake the
//! router reads it once. Read responses are translated into the same
//! [`DomainEvent`]s as pushed notifications and applied on the router task.

use serde_json::{json, Value};

use super::classify::{output_status, volume};
use super::events::DomainEvent;
use crate::dispatcher::Command;
use crate::keys::EntityRef;
use crate::protocol::requests::*;
use crate::protocol::Request;
use crate::state::{Output, OutputState, OutputStatus};

/// Result of translating one read response
#[derive(Debug, Default)]
pub(crate) struct Translation {
    pub events: Vec<DomainEvent>,
    pub follow_ups: Vec<Command>,
}

/// Reads issued right after the handshake (and after a collection switch)
pub(crate) fn initial_requests() -> Vec<Command> {
    [
        GET_SCENE_COLLECTION_LIST,
        GET_STUDIO_MODE_ENABLED,
        GET_SCENE_LIST,
        GET_CURRENT_PROGRAM_SCENE,
        GET_INPUT_LIST,
        GET_STREAM_STATUS,
        GET_RECORD_STATUS,
        GET_REPLAY_BUFFER_STATUS,
        GET_VIRTUAL_CAM_STATUS,
    ]
    .into_iter()
    .map(Command::new)
    .collect()
}

/// Read requests never change remote state
pub(crate) fn is_read(request_type: &str) -> bool {
    request_type.starts_with("Get")
}

fn text(data: &Value, field: &str) -> Option<String> {
    data.get(field).and_then(Value::as_str).map(str::to_string)
}

fn array<'a>(data: &'a Value, field: &str) -> &'a [Value] {
    data.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn requested(request: &Request, field: &str) -> Result<String, String> {
    request
        .request_data
        .as_ref()
        .and_then(|d| text(d, field))
        .ok_or_else(|| format!("{} request carried no '{}'", request.request_type, field))
}

fn output_read(output: Output, data: &Value) -> Result<DomainEvent, String> {
    Ok(DomainEvent::OutputChanged {
        output,
        status: output_status(data)?,
    })
}

/// Translate a successful response to a read request
pub(crate) fn translate(request: &Request, data: &Value) -> Result<Translation, String> {
    let mut out = Translation::default();

    match request.request_type.as_str() {
        GET_STUDIO_MODE_ENABLED => {
            let enabled = data
                .get("studioModeEnabled")
                .and_then(Value::as_bool)
                .ok_or("missing 'studioModeEnabled'")?;
            out.events.push(DomainEvent::StudioModeChanged { enabled });
            if enabled {
                out.follow_ups.push(Command::new(GET_CURRENT_PREVIEW_SCENE));
            }
        },
        GET_CURRENT_PROGRAM_SCENE => {
            let scene = text(data, "sceneName")
                .or_else(|| text(data, "currentProgramSceneName"))
                .ok_or("missing program scene name")?;
            out.events.push(DomainEvent::ProgramSceneChanged { scene });
        },
        GET_CURRENT_PREVIEW_SCENE => {
            // Null when studio mode was turned off in the meantime
            if let Some(scene) =
                text(data, "sceneName").or_else(|| text(data, "currentPreviewSceneName"))
            {
                out.events.push(DomainEvent::PreviewSceneChanged { scene });
            }
        },
        GET_SCENE_LIST => {
            for scene in array(data, "scenes").iter().filter_map(|s| text(s, "sceneName")) {
                out.follow_ups.push(
                    Command::new(GET_SCENE_ITEM_LIST).with_data(json!({ "sceneName": scene })),
                );
                out.follow_ups.push(
                    Command::new(GET_SOURCE_FILTER_LIST).with_data(json!({ "sourceName": scene })),
                );
                out.events.push(DomainEvent::SceneCreated { scene });
            }
            if let Some(scene) = text(data, "currentProgramSceneName") {
                out.events.push(DomainEvent::ProgramSceneChanged { scene });
            }
            if let Some(scene) = text(data, "currentPreviewSceneName") {
                out.events.push(DomainEvent::PreviewSceneChanged { scene });
            }
        },
        GET_SCENE_ITEM_LIST => {
            let scene = requested(request, "sceneName")?;
            for item in array(data, "sceneItems") {
                let (Some(id), Some(source)) = (
                    item.get("sceneItemId").and_then(Value::as_i64),
                    text(item, "sourceName"),
                ) else {
                    continue;
                };
                let entity = EntityRef::scene_item(scene.clone(), id);
                out.events.push(DomainEvent::SourceCreated {
                    entity: entity.clone().with_source_name(source),
                    kind: text(item, "inputKind"),
                });
                if let Some(visible) = item.get("sceneItemEnabled").and_then(Value::as_bool) {
                    out.events.push(DomainEvent::SourceVisibilityChanged { entity, visible });
                }
            }
        },
        GET_INPUT_LIST => {
            for input in array(data, "inputs") {
                let Some(name) = text(input, "inputName") else {
                    continue;
                };
                out.follow_ups.extend([
                    Command::new(GET_INPUT_MUTE).with_data(json!({ "inputName": name })),
                    Command::new(GET_INPUT_VOLUME).with_data(json!({ "inputName": name })),
                    Command::new(GET_SOURCE_FILTER_LIST).with_data(json!({ "sourceName": name })),
                ]);
                out.events.push(DomainEvent::SourceCreated {
                    entity: EntityRef::input(name),
                    kind: text(input, "inputKind"),
                });
            }
        },
        GET_INPUT_MUTE => {
            let muted = data
                .get("inputMuted")
                .and_then(Value::as_bool)
                .ok_or("missing 'inputMuted'")?;
            out.events.push(DomainEvent::MuteChanged {
                entity: EntityRef::input(requested(request, "inputName")?),
                muted,
            });
        },
        GET_INPUT_VOLUME => {
            let (mul, db) = volume(data)?;
            out.events.push(DomainEvent::VolumeChanged {
                entity: EntityRef::input(requested(request, "inputName")?),
                mul,
                db,
            });
        },
        GET_SOURCE_FILTER_LIST => {
            let source = requested(request, "sourceName")?;
            for filter in array(data, "filters") {
                let Some(name) = text(filter, "filterName") else {
                    continue;
                };
                out.events.push(DomainEvent::FilterCreated {
                    entity: EntityRef::input(source.clone()),
                    filter: name,
                    enabled: filter
                        .get("filterEnabled")
                        .and_then(Value::as_bool)
                        .unwrap_or(true),
                });
            }
        },
        GET_STREAM_STATUS => out.events.push(output_read(Output::Stream, data)?),
        GET_RECORD_STATUS => {
            let active = data
                .get("outputActive")
                .and_then(Value::as_bool)
                .ok_or("missing 'outputActive'")?;
            let paused = data
                .get("outputPaused")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let state = match (active, paused) {
                (true, true) => OutputState::Paused,
                (true, false) => OutputState::Started,
                (false, _) => OutputState::Stopped,
            };
            out.events.push(DomainEvent::OutputChanged {
                output: Output::Record,
                status: OutputStatus::new(active, state),
            });
        },
        GET_REPLAY_BUFFER_STATUS => out.events.push(output_read(Output::ReplayBuffer, data)?),
        GET_VIRTUAL_CAM_STATUS => out.events.push(output_read(Output::VirtualCam, data)?),
        GET_SCENE_COLLECTION_LIST => {
            if let Some(name) = text(data, "currentSceneCollectionName") {
                out.events.push(DomainEvent::SceneCollectionChanged { name });
            }
        },
        _ => {},
    }

    Ok(out)
}
