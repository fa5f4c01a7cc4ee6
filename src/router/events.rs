//! Typed domain events
//!
//! Every inbound notification the router understands becomes one of these.
//! Subscribers register per [`EventCategory`].

use serde::Serialize;
use std::fmt;

use crate::keys::EntityRef;
use crate::state::{Output, OutputStatus};

/// Closed set of event categories consumers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Program/preview scene switches and scene lifecycle
    Scenes,
    /// Input and scene item creation, removal and renames
    Sources,
    SourceVisibility,
    /// Mute and volume
    Audio,
    Filters,
    Stream,
    Record,
    ReplayBuffer,
    VirtualCam,
    StudioMode,
    SceneCollection,
}

impl EventCategory {
    pub fn for_output(output: Output) -> Self {
        match output {
            Output::Stream => EventCategory::Stream,
            Output::Record => EventCategory::Record,
            Output::ReplayBuffer => EventCategory::ReplayBuffer,
            Output::VirtualCam => EventCategory::VirtualCam,
        }
    }
}

/// A classified, typed notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    ProgramSceneChanged { scene: String },
    PreviewSceneChanged { scene: String },
    SceneCreated { scene: String },
    SceneRemoved { scene: String },
    SceneRenamed { old: String, new: String },

    /// An input (`EntityRef::input`) or a scene item (`EntityRef::scene_item`
    /// with its source name) appeared
    SourceCreated {
        entity: EntityRef,
        kind: Option<String>,
    },
    SourceRemoved { entity: EntityRef },
    /// Input renamed
    SourceRenamed { old: String, new: String },
    SourceVisibilityChanged { entity: EntityRef, visible: bool },

    MuteChanged { entity: EntityRef, muted: bool },
    VolumeChanged {
        entity: EntityRef,
        mul: f64,
        db: f64,
    },

    FilterCreated {
        entity: EntityRef,
        filter: String,
        enabled: bool,
    },
    FilterRemoved { entity: EntityRef, filter: String },
    FilterEnabledChanged {
        entity: EntityRef,
        filter: String,
        enabled: bool,
    },

    OutputChanged { output: Output, status: OutputStatus },
    StudioModeChanged { enabled: bool },

    /// The remote is about to switch collections; everything cached is void
    SceneCollectionChanging { name: String },
    SceneCollectionChanged { name: String },
}

impl DomainEvent {
    pub fn category(&self) -> EventCategory {
        match self {
            DomainEvent::ProgramSceneChanged { .. }
            | DomainEvent::PreviewSceneChanged { .. }
            | DomainEvent::SceneCreated { .. }
            | DomainEvent::SceneRemoved { .. }
            | DomainEvent::SceneRenamed { .. } => EventCategory::Scenes,
            DomainEvent::SourceCreated { .. }
            | DomainEvent::SourceRemoved { .. }
            | DomainEvent::SourceRenamed { .. } => EventCategory::Sources,
            DomainEvent::SourceVisibilityChanged { .. } => EventCategory::SourceVisibility,
            DomainEvent::MuteChanged { .. } | DomainEvent::VolumeChanged { .. } => {
                EventCategory::Audio
            },
            DomainEvent::FilterCreated { .. }
            | DomainEvent::FilterRemoved { .. }
            | DomainEvent::FilterEnabledChanged { .. } => EventCategory::Filters,
            DomainEvent::OutputChanged { output, .. } => EventCategory::for_output(*output),
            DomainEvent::StudioModeChanged { .. } => EventCategory::StudioMode,
            DomainEvent::SceneCollectionChanging { .. }
            | DomainEvent::SceneCollectionChanged { .. } => EventCategory::SceneCollection,
        }
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainEvent::ProgramSceneChanged { scene } => write!(f, "program scene → {}", scene),
            DomainEvent::PreviewSceneChanged { scene } => write!(f, "preview scene → {}", scene),
            DomainEvent::SceneCreated { scene } => write!(f, "scene created: {}", scene),
            DomainEvent::SceneRemoved { scene } => write!(f, "scene removed: {}", scene),
            DomainEvent::SceneRenamed { old, new } => write!(f, "scene renamed: {} → {}", old, new),
            DomainEvent::SourceCreated { entity, .. } => write!(f, "source created: {}", entity),
            DomainEvent::SourceRemoved { entity } => write!(f, "source removed: {}", entity),
            DomainEvent::SourceRenamed { old, new } => {
                write!(f, "source renamed: {} → {}", old, new)
            },
            DomainEvent::SourceVisibilityChanged { entity, visible } => {
                write!(f, "{} visible={}", entity, visible)
            },
            DomainEvent::MuteChanged { entity, muted } => write!(f, "{} muted={}", entity, muted),
            DomainEvent::VolumeChanged { entity, db, .. } => {
                write!(f, "{} volume={:.1}dB", entity, db)
            },
            DomainEvent::FilterCreated { entity, filter, .. } => {
                write!(f, "filter created: {} on {}", filter, entity)
            },
            DomainEvent::FilterRemoved { entity, filter } => {
                write!(f, "filter removed: {} on {}", filter, entity)
            },
            DomainEvent::FilterEnabledChanged {
                entity,
                filter,
                enabled,
            } => write!(f, "filter {} on {} enabled={}", filter, entity, enabled),
            DomainEvent::OutputChanged { output, status } => {
                write!(f, "{} {:?}", output, status.state)
            },
            DomainEvent::StudioModeChanged { enabled } => write!(f, "studio mode={}", enabled),
            DomainEvent::SceneCollectionChanging { name } => {
                write!(f, "scene collection changing from {}", name)
            },
            DomainEvent::SceneCollectionChanged { name } => {
                write!(f, "scene collection → {}", name)
            },
        }
    }
}
