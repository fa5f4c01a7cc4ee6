//! On/off controls
//!
//! Every two-state control implements [`Switch`]; the dispatcher derives
//! TurnOn, TurnOff and Toggle from it.

use serde_json::json;
use std::fmt;

use super::outbox::Command;
use crate::keys::EntityRef;
use crate::protocol::requests::*;
use crate::state::{Facet, Output, StateCache, StateKey};

/// A two-state control on the remote application
pub trait Switch: Send + Sync + fmt::Display {
    /// Check that the target exists; `Err` carries the reason
    fn validate(&self, _cache: &StateCache) -> Result<(), String> {
        Ok(())
    }

    /// Cached state, `None` when not yet known
    fn is_on(&self, cache: &StateCache) -> Option<bool>;

    /// Request that sets the switch to `on`
    fn command(&self, cache: &StateCache, on: bool) -> Result<Command, String>;

    /// Remote-side toggle, used when the cached state is unknown
    fn toggle_command(&self) -> Option<Command> {
        None
    }
}

// =============================================================================
// Entity validation
// =============================================================================

/// Reject references into a collection other than the loaded one
pub(crate) fn check_collection(cache: &StateCache, entity: &EntityRef) -> Result<(), String> {
    match (&entity.collection, cache.scene_collection()) {
        (Some(wanted), Some(current)) if *wanted != current => Err(format!(
            "{} belongs to collection '{}', '{}' is loaded",
            entity, wanted, current
        )),
        _ => Ok(()),
    }
}

/// Scene name of a reference that must name a known scene
pub(crate) fn known_scene(cache: &StateCache, entity: &EntityRef) -> Result<String, String> {
    check_collection(cache, entity)?;
    let scene = entity
        .scene
        .as_deref()
        .ok_or_else(|| format!("{} names no scene", entity))?;
    if !cache.has_scene(scene) {
        return Err(format!("unknown scene '{}'", scene));
    }
    Ok(scene.to_string())
}

/// Input name of a reference that must name a known input
pub(crate) fn known_input(cache: &StateCache, entity: &EntityRef) -> Result<String, String> {
    check_collection(cache, entity)?;
    let input = entity
        .source_name
        .as_deref()
        .ok_or_else(|| format!("{} names no input", entity))?;
    if !cache.has_input(input) {
        return Err(format!("unknown input '{}'", input));
    }
    Ok(input.to_string())
}

/// Scene name and numeric id of a scene item, resolving by source name if needed
pub(crate) fn known_scene_item(cache: &StateCache, entity: &EntityRef) -> Result<(String, i64), String> {
    let scene = known_scene(cache, entity)?;
    let id = match (entity.source_id, entity.source_name.as_deref()) {
        (Some(id), _) => id,
        (None, Some(source)) => cache
            .scene_item_id(&scene, source)
            .ok_or_else(|| format!("'{}' is not in scene '{}'", source, scene))?,
        (None, None) => return Err(format!("{} names no scene item", entity)),
    };
    let item = EntityRef::scene_item(scene.clone(), id);
    if cache.get(&StateKey::entity(Facet::SceneItem, item)).is_none() {
        return Err(format!("no scene item #{} in '{}'", id, scene));
    }
    Ok((scene, id))
}

// =============================================================================
// Outputs
// =============================================================================

/// Stream, record, replay buffer or virtual camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSwitch(pub Output);

impl OutputSwitch {
    fn requests(&self) -> (&'static str, &'static str, &'static str) {
        match self.0 {
            Output::Stream => (START_STREAM, STOP_STREAM, TOGGLE_STREAM),
            Output::Record => (START_RECORD, STOP_RECORD, TOGGLE_RECORD),
            Output::ReplayBuffer => (START_REPLAY_BUFFER, STOP_REPLAY_BUFFER, TOGGLE_REPLAY_BUFFER),
            Output::VirtualCam => (START_VIRTUAL_CAM, STOP_VIRTUAL_CAM, TOGGLE_VIRTUAL_CAM),
        }
    }
}

impl fmt::Display for OutputSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Switch for OutputSwitch {
    fn is_on(&self, cache: &StateCache) -> Option<bool> {
        cache.output(self.0).map(|s| s.is_on())
    }

    fn command(&self, _cache: &StateCache, on: bool) -> Result<Command, String> {
        let (start, stop, _) = self.requests();
        Ok(Command::new(if on { start } else { stop }).desired(on))
    }

    fn toggle_command(&self) -> Option<Command> {
        Some(Command::new(self.requests().2))
    }
}

/// Recording pause; only meaningful while recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPause;

impl fmt::Display for RecordPause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record pause")
    }
}

impl Switch for RecordPause {
    fn validate(&self, cache: &StateCache) -> Result<(), String> {
        match cache.output(Output::Record) {
            Some(status) if !status.active => Err("recording is not active".to_string()),
            _ => Ok(()),
        }
    }

    fn is_on(&self, cache: &StateCache) -> Option<bool> {
        cache.output(Output::Record).map(|s| s.paused)
    }

    fn command(&self, _cache: &StateCache, on: bool) -> Result<Command, String> {
        Ok(Command::new(if on { PAUSE_RECORD } else { RESUME_RECORD }).desired(on))
    }

    fn toggle_command(&self) -> Option<Command> {
        Some(Command::new(TOGGLE_RECORD_PAUSE))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StudioMode;

impl fmt::Display for StudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "studio mode")
    }
}

impl Switch for StudioMode {
    fn is_on(&self, cache: &StateCache) -> Option<bool> {
        cache.studio_mode()
    }

    fn command(&self, _cache: &StateCache, on: bool) -> Result<Command, String> {
        Ok(Command::new(SET_STUDIO_MODE_ENABLED)
            .with_data(json!({ "studioModeEnabled": on }))
            .desired(on))
    }
}

// =============================================================================
// Entity switches
// =============================================================================

/// Input mute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mute(pub EntityRef);

impl fmt::Display for Mute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mute {}", self.0)
    }
}

impl Switch for Mute {
    fn validate(&self, cache: &StateCache) -> Result<(), String> {
        known_input(cache, &self.0).map(|_| ())
    }

    fn is_on(&self, cache: &StateCache) -> Option<bool> {
        let input = self.0.source_name.as_deref()?;
        cache.get_bool(&StateKey::entity(Facet::Muted, EntityRef::input(input)))
    }

    fn command(&self, cache: &StateCache, on: bool) -> Result<Command, String> {
        let input = known_input(cache, &self.0)?;
        Ok(Command::new(SET_INPUT_MUTE)
            .with_data(json!({ "inputName": input, "inputMuted": on }))
            .target(EntityRef::input(input))
            .desired(on))
    }

    fn toggle_command(&self) -> Option<Command> {
        let input = self.0.source_name.clone()?;
        Some(
            Command::new(TOGGLE_INPUT_MUTE)
                .with_data(json!({ "inputName": input }))
                .target(EntityRef::input(input))
                // A repeated toggle would undo itself
                .once(),
        )
    }
}

/// Scene item visibility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visibility(pub EntityRef);

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visibility of {}", self.0)
    }
}

impl Switch for Visibility {
    fn validate(&self, cache: &StateCache) -> Result<(), String> {
        known_scene_item(cache, &self.0).map(|_| ())
    }

    fn is_on(&self, cache: &StateCache) -> Option<bool> {
        let (scene, id) = known_scene_item(cache, &self.0).ok()?;
        cache.get_bool(&StateKey::entity(Facet::Visible, EntityRef::scene_item(scene, id)))
    }

    fn command(&self, cache: &StateCache, on: bool) -> Result<Command, String> {
        let (scene, id) = known_scene_item(cache, &self.0)?;
        Ok(Command::new(SET_SCENE_ITEM_ENABLED)
            .with_data(json!({ "sceneName": scene, "sceneItemId": id, "sceneItemEnabled": on }))
            .target(EntityRef::scene_item(scene, id))
            .desired(on))
    }
}

/// Filter enabled flag on an input or a scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSwitch {
    pub source: EntityRef,
    pub filter: String,
}

impl FilterSwitch {
    pub fn new(source: EntityRef, filter: impl Into<String>) -> Self {
        Self {
            source,
            filter: filter.into(),
        }
    }

    /// Filters are addressed by source name; scenes are sources too
    fn source_name(&self, cache: &StateCache) -> Result<String, String> {
        check_collection(cache, &self.source)?;
        match (&self.source.source_name, &self.source.scene) {
            (Some(input), _) if cache.has_input(input) => Ok(input.clone()),
            (None, Some(scene)) if cache.has_scene(scene) => Ok(scene.clone()),
            _ => Err(format!("unknown filter source {}", self.source)),
        }
    }
}

impl fmt::Display for FilterSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter {} on {}", self.filter, self.source)
    }
}

impl Switch for FilterSwitch {
    fn validate(&self, cache: &StateCache) -> Result<(), String> {
        let source = self.source_name(cache)?;
        // An empty list means the filters were never read, not that there are none
        let known = cache.filters(&source);
        if !known.is_empty() && !known.contains(&self.filter) {
            return Err(format!("unknown filter '{}' on '{}'", self.filter, source));
        }
        Ok(())
    }

    fn is_on(&self, cache: &StateCache) -> Option<bool> {
        let source = self.source_name(cache).ok()?;
        cache.get_bool(&StateKey::entity(
            Facet::Filter(self.filter.clone()),
            EntityRef::input(source),
        ))
    }

    fn command(&self, cache: &StateCache, on: bool) -> Result<Command, String> {
        let source = self.source_name(cache)?;
        Ok(Command::new(SET_SOURCE_FILTER_ENABLED)
            .with_data(json!({
                "sourceName": source,
                "filterName": self.filter,
                "filterEnabled": on,
            }))
            .target(EntityRef::input(source))
            .desired(on))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::DomainEvent;

    fn cache_with_item() -> StateCache {
        let cache = StateCache::new();
        cache.apply(&DomainEvent::SceneCreated {
            scene: "Main".to_string(),
        });
        cache.apply(&DomainEvent::SourceCreated {
            entity: EntityRef::scene_item("Main", 7).with_source_name("Webcam"),
            kind: None,
        });
        cache.apply(&DomainEvent::SceneCollectionChanged {
            name: "Show".to_string(),
        });
        cache
    }

    #[test]
    fn test_scene_item_resolved_by_source_name() {
        let cache = cache_with_item();
        assert_eq!(
            known_scene_item(&cache, &EntityRef::scene_item_named("Main", "Webcam")),
            Ok(("Main".to_string(), 7))
        );
        assert!(known_scene_item(&cache, &EntityRef::scene_item_named("Main", "Nope")).is_err());
        assert!(known_scene_item(&cache, &EntityRef::scene_item("Main", 99)).is_err());
    }

    #[test]
    fn test_collection_mismatch_rejected() {
        let cache = cache_with_item();
        assert!(known_scene(&cache, &EntityRef::scene("Main").with_collection("Show")).is_ok());
        assert!(known_scene(&cache, &EntityRef::scene("Main").with_collection("Other")).is_err());
    }

    #[test]
    fn test_output_commands() {
        let cache = StateCache::new();
        let stream = OutputSwitch(Output::Stream);
        assert_eq!(stream.is_on(&cache), None);
        assert_eq!(stream.command(&cache, true).unwrap().request_type, START_STREAM);
        assert_eq!(stream.command(&cache, false).unwrap().request_type, STOP_STREAM);
        assert_eq!(stream.toggle_command().unwrap().request_type, TOGGLE_STREAM);
    }

    #[test]
    fn test_studio_mode_has_no_remote_toggle() {
        assert!(StudioMode.toggle_command().is_none());
    }
}
