//! State cache type definitions
//!
//! Keys identify one piece of remote state (a singleton such as the stream
//! status, or a facet of an entity such as an input's mute flag); values are
//! what the remote application last confirmed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::EntityRef;

/// Outputs with a start/stop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    Stream,
    Record,
    ReplayBuffer,
    VirtualCam,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stream => write!(f, "stream"),
            Output::Record => write!(f, "record"),
            Output::ReplayBuffer => write!(f, "replay buffer"),
            Output::VirtualCam => write!(f, "virtual camera"),
        }
    }
}

/// Output state as reported by `outputState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputState {
    Starting,
    Started,
    Stopping,
    Stopped,
    Paused,
    Resumed,
    Reconnecting,
    Reconnected,
    Unknown,
}

impl OutputState {
    /// Parse an `OBS_WEBSOCKET_OUTPUT_*` constant
    pub fn from_wire(s: &str) -> Self {
        match s.strip_prefix("OBS_WEBSOCKET_OUTPUT_").unwrap_or(s) {
            "STARTING" => OutputState::Starting,
            "STARTED" => OutputState::Started,
            "STOPPING" => OutputState::Stopping,
            "STOPPED" => OutputState::Stopped,
            "PAUSED" => OutputState::Paused,
            "RESUMED" => OutputState::Resumed,
            "RECONNECTING" => OutputState::Reconnecting,
            "RECONNECTED" => OutputState::Reconnected,
            _ => OutputState::Unknown,
        }
    }
}

/// Confirmed status of an output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputStatus {
    pub active: bool,
    pub paused: bool,
    pub state: OutputState,
}

impl OutputStatus {
    pub fn new(active: bool, state: OutputState) -> Self {
        Self {
            active,
            paused: state == OutputState::Paused,
            state,
        }
    }

    /// Running or about to run
    pub fn is_on(&self) -> bool {
        match self.state {
            OutputState::Starting => true,
            OutputState::Stopping | OutputState::Stopped => false,
            _ => self.active,
        }
    }
}

/// Process-wide facts about the remote application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Singleton {
    Output(Output),
    StudioMode,
    ProgramScene,
    PreviewScene,
    SceneCollection,
}

/// Which aspect of an entity a cache entry describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facet {
    /// Scene exists (keyed by scene)
    Scene,
    /// Input exists; value is its kind (keyed by source name)
    Input,
    /// Scene item exists; value is its source name (keyed by scene + id)
    SceneItem,
    /// Scene item visibility (keyed by scene + id)
    Visible,
    Muted,
    VolumeDb,
    VolumeMul,
    /// Filter enabled flag (keyed by source name)
    Filter(String),
}

impl Facet {
    /// Facets that hang off an input rather than a scene
    pub fn is_input_level(&self) -> bool {
        matches!(
            self,
            Facet::Input | Facet::Muted | Facet::VolumeDb | Facet::VolumeMul | Facet::Filter(_)
        )
    }
}

/// Cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKey {
    Singleton(Singleton),
    Entity { facet: Facet, entity: EntityRef },
}

impl StateKey {
    pub fn entity(facet: Facet, entity: EntityRef) -> Self {
        StateKey::Entity { facet, entity }
    }

    pub fn output(output: Output) -> Self {
        StateKey::Singleton(Singleton::Output(output))
    }

    pub fn entity_ref(&self) -> Option<&EntityRef> {
        match self {
            StateKey::Entity { entity, .. } => Some(entity),
            StateKey::Singleton(_) => None,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateKey::Singleton(s) => write!(f, "{:?}", s),
            StateKey::Entity { facet, entity } => write!(f, "{:?}({})", facet, entity),
        }
    }
}

/// Cache value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Output(OutputStatus),
}

impl StateValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            StateValue::Output(status) => Some(status.is_on()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            StateValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            StateValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(b) => write!(f, "{}", b),
            StateValue::Number(n) => write!(f, "{:.2}", n),
            StateValue::Text(s) => write!(f, "{:?}", s),
            StateValue::Output(s) => write!(f, "{:?} (active={})", s.state, s.active),
        }
    }
}
