//! Player state machine and observable events.

use serde::{Deserialize, Serialize};

/// Lifecycle of the timeline player.
///
/// `Loading` means play was requested while no playable media exists yet;
/// playback starts as soon as a refreshed segment list offers some.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    Stopped,
}

impl PlayerState {
    pub fn is_playing(self) -> bool {
        self == PlayerState::Playing
    }
}

/// Snapshot of where playback is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_segment_index: Option<usize>,
    pub position_within_segment_ms: u64,
    pub is_playing: bool,
    pub is_seeking: bool,
    pub loop_enabled: bool,
}

/// Events published by the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    PositionChanged { ms: u64 },
    SegmentChanged { index: usize },
    PlaybackStateChanged { is_playing: bool },
    Status { message: String },
}
