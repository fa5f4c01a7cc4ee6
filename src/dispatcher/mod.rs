//! Command Dispatcher - validated, fire-and-forget outbound commands
//!
//! Each method checks its preconditions against the [`StateCache`], sends at
//! most one request and returns a [`CommandOutcome`] without waiting for the
//! remote to confirm. The cache only changes once the remote reports the
//! change back as an event.
//!
//! Toggle reads the cached state and sends the complementary command; a
//! second toggle issued before the first one's event arrives sees stale
//! state and may repeat the same command.

mod outbox;
mod switches;

#[cfg(test)]
mod tests;

pub use outbox::{Command, CommandPolicy, Outbox, PendingCommand};
pub use switches::{FilterSwitch, Mute, OutputSwitch, RecordPause, StudioMode, Switch, Visibility};

use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::keys::EntityRef;
use crate::protocol::requests::*;
use crate::state::{Facet, Output, StateCache, StateKey};
use switches::{known_input, known_scene};

/// Lowest settable input volume
pub const VOLUME_MIN_DB: f64 = -100.0;
/// Highest settable input volume
pub const VOLUME_MAX_DB: f64 = 26.0;

/// Volumes closer than this count as equal
const VOLUME_EPSILON_DB: f64 = 0.05;

/// Result of a dispatcher call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Request written to the connection
    Sent { request_id: String },
    /// Cache says the target is already in the requested state
    NoOp,
    /// No session (or stop in progress); nothing was sent
    NotConnected,
    /// Target unknown or precondition unmet; nothing was sent
    InvalidTarget(String),
}

impl CommandOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, CommandOutcome::Sent { .. })
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Sent { request_id } => write!(f, "sent (id {})", request_id),
            CommandOutcome::NoOp => write!(f, "no-op"),
            CommandOutcome::NotConnected => write!(f, "not connected"),
            CommandOutcome::InvalidTarget(reason) => write!(f, "invalid target: {}", reason),
        }
    }
}

/// Outbound command API handed to consumers
#[derive(Clone)]
pub struct Dispatcher {
    cache: Arc<StateCache>,
    outbox: Arc<Outbox>,
}

impl Dispatcher {
    pub fn new(cache: Arc<StateCache>, outbox: Arc<Outbox>) -> Self {
        Self { cache, outbox }
    }

    pub fn is_connected(&self) -> bool {
        self.outbox.is_open()
    }

    async fn send(&self, what: &str, command: Command) -> CommandOutcome {
        match self.outbox.submit(command).await {
            Ok(request_id) => {
                debug!("📤 {} (id {})", what, request_id);
                CommandOutcome::Sent { request_id }
            },
            Err(e) => {
                debug!("{} not sent: {}", what, e);
                CommandOutcome::NotConnected
            },
        }
    }

    fn invalid(what: &str, reason: String) -> CommandOutcome {
        warn!("🚫 {} rejected: {}", what, reason);
        CommandOutcome::InvalidTarget(reason)
    }

    // =========================================================================
    // Switches
    // =========================================================================

    async fn set_switch(&self, switch: &dyn Switch, on: bool) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        let what = format!("{} → {}", switch, if on { "on" } else { "off" });
        if let Err(reason) = switch.validate(&self.cache) {
            return Self::invalid(&what, reason);
        }
        if switch.is_on(&self.cache) == Some(on) {
            return CommandOutcome::NoOp;
        }
        match switch.command(&self.cache, on) {
            Ok(command) => self.send(&what, command).await,
            Err(reason) => Self::invalid(&what, reason),
        }
    }

    pub async fn turn_on(&self, switch: &dyn Switch) -> CommandOutcome {
        self.set_switch(switch, true).await
    }

    pub async fn turn_off(&self, switch: &dyn Switch) -> CommandOutcome {
        self.set_switch(switch, false).await
    }

    /// Flip the cached state; falls back to a remote toggle when unknown
    pub async fn toggle(&self, switch: &dyn Switch) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        match switch.is_on(&self.cache) {
            Some(on) => self.set_switch(switch, !on).await,
            None => {
                let what = format!("toggle {}", switch);
                if let Err(reason) = switch.validate(&self.cache) {
                    return Self::invalid(&what, reason);
                }
                match switch.toggle_command() {
                    Some(command) => self.send(&what, command).await,
                    None => Self::invalid(&what, format!("state of {} is unknown", switch)),
                }
            },
        }
    }

    // =========================================================================
    // Scenes
    // =========================================================================

    pub async fn set_program_scene(&self, scene: &EntityRef) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        let name = match known_scene(&self.cache, scene) {
            Ok(name) => name,
            Err(reason) => return Self::invalid("program scene", reason),
        };
        if self.cache.program_scene().as_deref() == Some(name.as_str()) {
            return CommandOutcome::NoOp;
        }
        let command = Command::new(SET_CURRENT_PROGRAM_SCENE)
            .with_data(json!({ "sceneName": name }))
            .target(EntityRef::scene(name.clone()))
            .desired(name.clone());
        self.send(&format!("program scene → {}", name), command).await
    }

    /// Requires studio mode
    pub async fn set_preview_scene(&self, scene: &EntityRef) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        if self.cache.studio_mode() != Some(true) {
            return Self::invalid("preview scene", "studio mode is off".to_string());
        }
        let name = match known_scene(&self.cache, scene) {
            Ok(name) => name,
            Err(reason) => return Self::invalid("preview scene", reason),
        };
        if self.cache.preview_scene().as_deref() == Some(name.as_str()) {
            return CommandOutcome::NoOp;
        }
        let command = Command::new(SET_CURRENT_PREVIEW_SCENE)
            .with_data(json!({ "sceneName": name }))
            .target(EntityRef::scene(name.clone()))
            .desired(name.clone());
        self.send(&format!("preview scene → {}", name), command).await
    }

    /// Preview in studio mode, program otherwise
    pub async fn select_scene(&self, scene: &EntityRef) -> CommandOutcome {
        if self.cache.studio_mode() == Some(true) {
            self.set_preview_scene(scene).await
        } else {
            self.set_program_scene(scene).await
        }
    }

    /// Move preview to program; requires studio mode
    pub async fn trigger_transition(&self) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        if self.cache.studio_mode() != Some(true) {
            return Self::invalid("transition", "studio mode is off".to_string());
        }
        self.send("transition", Command::new(TRIGGER_STUDIO_MODE_TRANSITION).once())
            .await
    }

    pub async fn set_scene_collection(&self, name: &str) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        if name.is_empty() {
            return Self::invalid("scene collection", "empty collection name".to_string());
        }
        if self.cache.scene_collection().as_deref() == Some(name) {
            return CommandOutcome::NoOp;
        }
        let command = Command::new(SET_CURRENT_SCENE_COLLECTION)
            .with_data(json!({ "sceneCollectionName": name }))
            .target(EntityRef::default().with_collection(name))
            .desired(name);
        self.send(&format!("scene collection → {}", name), command)
            .await
    }

    // =========================================================================
    // Audio
    // =========================================================================

    fn cached_volume_db(&self, input: &str) -> Option<f64> {
        self.cache
            .get_number(&StateKey::entity(Facet::VolumeDb, EntityRef::input(input)))
    }

    /// Absolute volume, clamped to [`VOLUME_MIN_DB`, `VOLUME_MAX_DB`]
    pub async fn set_volume_db(&self, input: &EntityRef, db: f64) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        if !db.is_finite() {
            return Self::invalid("volume", format!("{} is not a volume", db));
        }
        let name = match known_input(&self.cache, input) {
            Ok(name) => name,
            Err(reason) => return Self::invalid("volume", reason),
        };
        self.send_volume(name, db.clamp(VOLUME_MIN_DB, VOLUME_MAX_DB))
            .await
    }

    /// Relative change from the cached volume
    pub async fn adjust_volume_db(&self, input: &EntityRef, delta_db: f64) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        if !delta_db.is_finite() {
            return Self::invalid("volume", format!("{} is not a volume step", delta_db));
        }
        let name = match known_input(&self.cache, input) {
            Ok(name) => name,
            Err(reason) => return Self::invalid("volume", reason),
        };
        let Some(current) = self.cached_volume_db(&name) else {
            return Self::invalid("volume", format!("volume of '{}' is unknown", name));
        };
        let target = (current + delta_db).clamp(VOLUME_MIN_DB, VOLUME_MAX_DB);
        self.send_volume(name, target).await
    }

    async fn send_volume(&self, input: String, db: f64) -> CommandOutcome {
        if let Some(current) = self.cached_volume_db(&input) {
            if (current - db).abs() < VOLUME_EPSILON_DB {
                return CommandOutcome::NoOp;
            }
        }
        let command = Command::new(SET_INPUT_VOLUME)
            .with_data(json!({ "inputName": input, "inputVolumeDb": db }))
            .target(EntityRef::input(input.clone()))
            .desired(db);
        self.send(&format!("volume {} → {:.1}dB", input, db), command)
            .await
    }

    // =========================================================================
    // Outputs
    // =========================================================================

    /// Requires an active replay buffer
    pub async fn save_replay_buffer(&self) -> CommandOutcome {
        if !self.is_connected() {
            return CommandOutcome::NotConnected;
        }
        match self.cache.output(Output::ReplayBuffer) {
            Some(status) if status.is_on() => {
                self.send("save replay", Command::new(SAVE_REPLAY_BUFFER).once())
                    .await
            },
            _ => Self::invalid("save replay", "replay buffer is not active".to_string()),
        }
    }
}
