//! Chorus - Playback Engine
//!
//! Server-backed playback engine for Chorus clients.
//!
//! This crate provides:
//! - Dual-lane playback with equal-power crossfades
//! - Queue management (shuffle, repeat, mid-session edits)
//! - Loudness normalization against a -18 LUFS reference
//! - Logarithmic master volume (0-100, mute/unmute)
//! - Quality selection with in-place stream swapping
//! - Connection warm-up for the upcoming track
//! - Listen telemetry reporting
//!
//! # Architecture
//!
//! `chorus-playback` is completely output-agnostic:
//! - No dependency on any media framework
//! - No dependency on chorus-storage (database)
//! - No dependency on chorus-server-client (HTTP)
//!
//! Audio output, catalog access, the download cache and settings storage
//! are all provided via traits. One engine task owns every piece of
//! mutable playback state and is driven through the cloneable
//! [`PlayerHandle`]; everything the task spawns reports back over
//! channels, so no lock ever guards playback state.
//!
//! # Example: Queue Management
//!
//! ```rust
//! use chorus_playback::types::{Track, TrackId};
//! use chorus_playback::{PlayQueue, RepeatMode};
//! use std::time::Duration;
//!
//! let mut queue = PlayQueue::new();
//! queue.replace(
//!     vec![Track {
//!         id: TrackId::new("track-1"),
//!         title: "Opening".to_string(),
//!         artist: "Some Band".to_string(),
//!         album_artist: None,
//!         album: Some("First Album".to_string()),
//!         artwork: None,
//!         duration: Some(Duration::from_secs(241)),
//!         sources: Vec::new(),
//!     }],
//!     0,
//! );
//!
//! queue.set_repeat(RepeatMode::All);
//! assert_eq!(queue.current_index(), Some(0));
//! ```
//!
//! # Example: Platform Integration
//!
//! ```rust,no_run
//! use chorus_playback::{
//!     lane_event_channel, AudioLane, LaneEvent, LaneEventSender, LaneId, PlaybackEngine,
//!     PlayerDeps,
//! };
//! use std::time::Duration;
//!
//! // Wrap your platform's media element in an AudioLane
//! struct MyLane {
//!     id: LaneId,
//!     events: LaneEventSender,
//! }
//!
//! impl AudioLane for MyLane {
//!     fn load(&mut self, _url: &str) {}
//!     fn play(&mut self) {
//!         // Confirm once the element actually starts
//!         let _ = self.events.send((self.id, LaneEvent::Started));
//!     }
//!     fn pause(&mut self) {}
//!     fn unload(&mut self) {}
//!     fn set_gain(&mut self, _gain: f64) {}
//!     fn set_rate(&mut self, _rate: f64) {}
//!     fn seek(&mut self, _position: Duration) {}
//!     fn position(&self) -> Duration {
//!         Duration::ZERO
//!     }
//!     fn duration(&self) -> Option<Duration> {
//!         None
//!     }
//!     fn buffered_to(&self) -> Option<Duration> {
//!         None
//!     }
//! }
//!
//! # async fn wire(deps: PlayerDeps) {
//! let (events_tx, events_rx) = lane_event_channel();
//! let lanes = [
//!     MyLane { id: LaneId::A, events: events_tx.clone() },
//!     MyLane { id: LaneId::B, events: events_tx },
//! ];
//! let (player, _task) = PlaybackEngine::spawn(lanes, events_rx, deps).await;
//!
//! player.set_volume(80).unwrap();
//! player.play().unwrap();
//! # }
//! ```

mod backend;
mod engine;
mod error;
mod events;
mod fade;
mod lane;
mod normalization;
mod queue;
pub mod types;
mod volume;

// Public exports
pub use backend::{
    resolve_playable_source, BackendError, CatalogBackend, DownloadCache, PlaybackReport,
    ResolvedSource, SettingsStore,
};
pub use engine::{PlaybackEngine, PlayerDeps, PlayerHandle};
pub use error::{PlaybackError, Result};
pub use events::{PlayerEvent, PlayerSnapshot};
pub use lane::{lane_event_channel, AudioLane, LaneEvent, LaneEventSender, LaneEvents, LaneId};
pub use normalization::{normalization_scalar, LoudnessInfo};
pub use queue::{AutoAdvance, PlayQueue, RemoveOutcome};
pub use types::{
    MediaSource, PlaybackState, PlayerSettings, QualityPreference, QueueSnapshot, RepeatMode,
    Track, TrackId,
};
pub use volume::MasterVolume;
