//! Core types for the playback engine

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Unique track identifier from the remote catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    /// Wrap a catalog identifier. Validation happens in [`Track::validate`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One playable rendition of a track
///
/// Catalogs typically expose several renditions per track (original
/// container plus transcodes). The engine only inspects bitrate and the
/// pre-resolved URLs; the rest is carried for display and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    /// Container format (e.g. "flac", "mp3", "ogg")
    pub container: String,

    /// Codec name (e.g. "flac", "mp3", "opus")
    pub codec: String,

    /// Average bitrate in kbit/s, when declared
    pub bitrate_kbps: Option<u32>,

    /// Channel count
    pub channels: Option<u16>,

    /// Sample rate in Hz
    pub sample_rate: Option<u32>,

    /// Bit depth for lossless sources
    pub bit_depth: Option<u8>,

    /// Pre-resolved URL for the original stream
    pub direct_url: Option<String>,

    /// Pre-resolved URL for a transcoded stream
    pub transcode_url: Option<String>,

    /// Whether the original container can be streamed as-is
    pub direct_stream: bool,
}

/// Immutable track descriptor
///
/// Parsed and validated at the catalog boundary. The engine never mutates
/// a track in place except to merge in late-arriving media source detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Catalog identifier
    pub id: TrackId,

    /// Track title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album artist, when it differs from the track artist
    pub album_artist: Option<String>,

    /// Album name
    pub album: Option<String>,

    /// Artwork reference (URL or cache key)
    pub artwork: Option<String>,

    /// Declared runtime from catalog metadata
    pub duration: Option<Duration>,

    /// Known renditions of this track
    pub sources: Vec<MediaSource>,
}

impl Track {
    /// Check boundary invariants: a track must carry an id and a title.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(PlaybackError::InvalidTrack("empty track id".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(PlaybackError::InvalidTrack(format!(
                "track {} has no title",
                self.id
            )));
        }
        Ok(())
    }

    /// Merge late-arriving media source detail into this track.
    ///
    /// Replaces the source list wholesale when the update is non-empty;
    /// all other fields stay untouched.
    pub fn merge_source_detail(&mut self, sources: Vec<MediaSource>) {
        if !sources.is_empty() {
            self.sources = sources;
        }
    }
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing loaded, nothing pending
    Idle,

    /// A transition is resolving or a lane is buffering
    Loading,

    /// Currently playing
    Playing,

    /// Paused mid-track
    Paused,
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatMode {
    /// Stop when the queue ends
    Off,

    /// Loop the entire queue
    All,

    /// Loop the current track only
    One,
}

impl RepeatMode {
    /// Cycle Off -> All -> One -> Off, the order the toggle command uses.
    pub fn cycled(self) -> Self {
        match self {
            Self::Off => Self::All,
            Self::All => Self::One,
            Self::One => Self::Off,
        }
    }
}

/// Stream quality preference
///
/// `Auto` requests the original direct stream; explicit tiers request a
/// bitrate-capped negotiated stream from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreference {
    /// Original stream, no transcoding
    Auto,

    /// Capped at 128 kbit/s
    Low,

    /// Capped at 192 kbit/s
    Medium,

    /// Capped at 320 kbit/s
    High,
}

impl QualityPreference {
    /// Bitrate ceiling in kbit/s, `None` for the original stream.
    pub fn bitrate_cap_kbps(self) -> Option<u32> {
        match self {
            Self::Auto => None,
            Self::Low => Some(128),
            Self::Medium => Some(192),
            Self::High => Some(320),
        }
    }

    /// Wire name used in catalog requests and persisted settings.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Crossfade length ceiling
pub const MAX_CROSSFADE: Duration = Duration::from_secs(10);

/// Playback rate bounds
pub const MIN_RATE: f64 = 0.5;
pub const MAX_RATE: f64 = 2.0;

/// Most recent tracks kept in the persisted queue snapshot
pub const QUEUE_SNAPSHOT_LIMIT: usize = 100;

/// User-facing playback settings
///
/// Loaded from the settings store at startup and persisted on change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Master volume (0-100)
    pub volume: u8,

    /// Playback rate multiplier
    pub rate: f64,

    /// Stream quality preference
    pub quality: QualityPreference,

    /// Loudness normalization enabled
    pub normalization: bool,

    /// Crossfade length (0 disables crossfading)
    pub crossfade: Duration,
}

impl PlayerSettings {
    /// Clamp every field into its valid range.
    pub fn clamped(mut self) -> Self {
        self.volume = self.volume.min(100);
        self.rate = self.rate.clamp(MIN_RATE, MAX_RATE);
        self.crossfade = self.crossfade.min(MAX_CROSSFADE);
        self
    }
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            volume: 80,
            rate: 1.0,
            quality: QualityPreference::Auto,
            normalization: true,
            crossfade: Duration::ZERO,
        }
    }
}

/// Bounded queue snapshot persisted for session restore
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Queue contents, truncated to [`QUEUE_SNAPSHOT_LIMIT`]
    pub tracks: Vec<Track>,

    /// Cursor into `tracks`, `None` when nothing was selected
    pub current_index: Option<usize>,
}

impl QueueSnapshot {
    /// Build a snapshot bounded to the most recent window around the cursor.
    ///
    /// Keeps at most [`QUEUE_SNAPSHOT_LIMIT`] tracks starting at the cursor
    /// so a restored session resumes from the same place.
    pub fn bounded(tracks: &[Track], current_index: Option<usize>) -> Self {
        let start = match current_index {
            Some(idx) if tracks.len() > QUEUE_SNAPSHOT_LIMIT => {
                idx.min(tracks.len().saturating_sub(QUEUE_SNAPSHOT_LIMIT))
            }
            _ => 0,
        };
        let end = (start + QUEUE_SNAPSHOT_LIMIT).min(tracks.len());

        Self {
            tracks: tracks[start..end].to_vec(),
            current_index: current_index.map(|idx| idx.saturating_sub(start).min(end - start)),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_track(id: &str) -> Track {
    Track {
        id: TrackId::from(id),
        title: format!("Track {id}"),
        artist: "Test Artist".to_string(),
        album_artist: None,
        album: Some("Test Album".to_string()),
        artwork: None,
        duration: Some(Duration::from_secs(180)),
        sources: Vec::new(),
    }
}
