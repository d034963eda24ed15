//! Published player state and event stream
//!
//! The engine owns all mutable state; the outside world sees it through
//! two read paths. A watch channel carries [`PlayerSnapshot`], refreshed
//! on every monitor tick and state change, for UI layers that render the
//! latest value. A broadcast channel carries [`PlayerEvent`] for
//! listeners that care about edges (OS transport metadata, toasts).

use crate::types::{PlaybackState, QualityPreference, RepeatMode, Track, TrackId};
use serde::Serialize;
use std::time::Duration;

/// Point-in-time view of the player
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSnapshot {
    /// Track bound to the active lane
    pub current_track: Option<Track>,

    /// Transport state
    pub state: PlaybackState,

    /// Position of the active lane
    pub position: Duration,

    /// Effective duration of the active lane, when known
    pub duration: Option<Duration>,

    /// Queue contents in play order
    pub queue: Vec<Track>,

    /// Cursor into `queue`, `None` when nothing is selected
    pub current_index: Option<usize>,

    pub repeat: RepeatMode,
    pub shuffled: bool,
    pub volume: u8,
    pub muted: bool,
    pub rate: f64,
    pub quality: QualityPreference,
    pub crossfade: Duration,
}

impl PlayerSnapshot {
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state == PlaybackState::Paused
    }
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            current_track: None,
            state: PlaybackState::Idle,
            position: Duration::ZERO,
            duration: None,
            queue: Vec::new(),
            current_index: None,
            repeat: RepeatMode::Off,
            shuffled: false,
            volume: 80,
            muted: false,
            rate: 1.0,
            quality: QualityPreference::Auto,
            crossfade: Duration::ZERO,
        }
    }
}

/// Edge-triggered player events
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PlayerEvent {
    /// Transport state changed
    StateChanged { state: PlaybackState },

    /// A different track became current
    TrackChanged {
        track: Box<Track>,
        previous: Option<TrackId>,
    },

    /// Queue contents or cursor changed
    QueueChanged {
        length: usize,
        current_index: Option<usize>,
    },

    /// A transition began; zero fade means a hard cut
    TransitionStarted {
        from: Option<TrackId>,
        to: TrackId,
        fade: Duration,
    },

    /// The incoming track is established and the fade (if any) finished
    TransitionCompleted { track: TrackId },

    /// Non-fatal failure the UI may want to surface
    PlaybackError { message: String },
}
