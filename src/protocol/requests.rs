//! Request type names and event subscription flags

use std::ops::BitOr;

/// Bitmask of event categories requested in Identify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventSubscription(u32);

impl EventSubscription {
    pub const NONE: Self = Self(0);
    pub const GENERAL: Self = Self(1 << 0);
    pub const CONFIG: Self = Self(1 << 1);
    pub const SCENES: Self = Self(1 << 2);
    pub const INPUTS: Self = Self(1 << 3);
    pub const TRANSITIONS: Self = Self(1 << 4);
    pub const FILTERS: Self = Self(1 << 5);
    pub const OUTPUTS: Self = Self(1 << 6);
    pub const SCENE_ITEMS: Self = Self(1 << 7);
    pub const MEDIA_INPUTS: Self = Self(1 << 8);
    pub const VENDORS: Self = Self(1 << 9);
    pub const UI: Self = Self(1 << 10);

    /// Every category the event router understands (no high-volume streams)
    pub const ROUTED: Self = Self(
        Self::GENERAL.0
            | Self::CONFIG.0
            | Self::SCENES.0
            | Self::INPUTS.0
            | Self::TRANSITIONS.0
            | Self::FILTERS.0
            | Self::OUTPUTS.0
            | Self::SCENE_ITEMS.0
            | Self::UI.0,
    );

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for EventSubscription {
    fn default() -> Self {
        Self::ROUTED
    }
}

impl BitOr for EventSubscription {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// Commands
pub const SET_CURRENT_PROGRAM_SCENE: &str = "SetCurrentProgramScene";
pub const SET_CURRENT_PREVIEW_SCENE: &str = "SetCurrentPreviewScene";
pub const TRIGGER_STUDIO_MODE_TRANSITION: &str = "TriggerStudioModeTransition";
pub const SET_STUDIO_MODE_ENABLED: &str = "SetStudioModeEnabled";
pub const SET_INPUT_MUTE: &str = "SetInputMute";
pub const TOGGLE_INPUT_MUTE: &str = "ToggleInputMute";
pub const SET_INPUT_VOLUME: &str = "SetInputVolume";
pub const SET_SCENE_ITEM_ENABLED: &str = "SetSceneItemEnabled";
pub const SET_SOURCE_FILTER_ENABLED: &str = "SetSourceFilterEnabled";
pub const SET_CURRENT_SCENE_COLLECTION: &str = "SetCurrentSceneCollection";
pub const START_STREAM: &str = "StartStream";
pub const STOP_STREAM: &str = "StopStream";
pub const TOGGLE_STREAM: &str = "ToggleStream";
pub const START_RECORD: &str = "StartRecord";
pub const STOP_RECORD: &str = "StopRecord";
pub const TOGGLE_RECORD: &str = "ToggleRecord";
pub const PAUSE_RECORD: &str = "PauseRecord";
pub const RESUME_RECORD: &str = "ResumeRecord";
pub const TOGGLE_RECORD_PAUSE: &str = "ToggleRecordPause";
pub const START_REPLAY_BUFFER: &str = "StartReplayBuffer";
pub const STOP_REPLAY_BUFFER: &str = "StopReplayBuffer";
pub const TOGGLE_REPLAY_BUFFER: &str = "ToggleReplayBuffer";
pub const SAVE_REPLAY_BUFFER: &str = "SaveReplayBuffer";
pub const START_VIRTUAL_CAM: &str = "StartVirtualCam";
pub const STOP_VIRTUAL_CAM: &str = "StopVirtualCam";
pub const TOGGLE_VIRTUAL_CAM: &str = "ToggleVirtualCam";

// State queries (used by the refresh after each connection)
pub const GET_STUDIO_MODE_ENABLED: &str = "GetStudioModeEnabled";
pub const GET_CURRENT_PROGRAM_SCENE: &str = "GetCurrentProgramScene";
pub const GET_CURRENT_PREVIEW_SCENE: &str = "GetCurrentPreviewScene";
pub const GET_SCENE_LIST: &str = "GetSceneList";
pub const GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
pub const GET_INPUT_LIST: &str = "GetInputList";
pub const GET_INPUT_MUTE: &str = "GetInputMute";
pub const GET_INPUT_VOLUME: &str = "GetInputVolume";
pub const GET_SOURCE_FILTER_LIST: &str = "GetSourceFilterList";
pub const GET_STREAM_STATUS: &str = "GetStreamStatus";
pub const GET_RECORD_STATUS: &str = "GetRecordStatus";
pub const GET_REPLAY_BUFFER_STATUS: &str = "GetReplayBufferStatus";
pub const GET_VIRTUAL_CAM_STATUS: &str = "GetVirtualCamStatus";
pub const GET_SCENE_COLLECTION_LIST: &str = "GetSceneCollectionList";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routed_mask() {
        let routed = EventSubscription::ROUTED;
        assert!(routed.contains(EventSubscription::SCENES | EventSubscription::OUTPUTS));
        assert!(!routed.contains(EventSubscription::MEDIA_INPUTS));
        assert_eq!(routed.bits(), 0x4FF);
    }
}
