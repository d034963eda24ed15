//! Boundary traits for the engine's external collaborators
//!
//! The engine resolves sources, fetches loudness metadata, reports
//! telemetry and persists settings exclusively through these traits.
//! Concrete implementations live in sibling crates (HTTP catalog client,
//! SQLite storage); tests substitute in-memory fakes.

use crate::normalization::LoudnessInfo;
use crate::types::{PlayerSettings, QualityPreference, QueueSnapshot, TrackId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Failure reported by an external collaborator
///
/// Collaborator crates carry their own rich error types; at this boundary
/// the engine only needs something to log, so everything collapses to a
/// message.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl From<String> for BackendError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for BackendError {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

/// A playable URL and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    /// Served from the local download cache
    Local { url: String },

    /// Negotiated with the remote catalog at a quality preference
    Remote {
        url: String,
        quality: QualityPreference,
    },
}

impl ResolvedSource {
    pub fn url(&self) -> &str {
        match self {
            Self::Local { url } | Self::Remote { url, .. } => url,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }
}

/// Telemetry payload for playback start/progress/stop reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackReport {
    /// Track being reported on
    pub track_id: TrackId,

    /// Playback position in seconds
    pub position_seconds: f64,

    /// Effective duration in seconds, when known
    pub duration_seconds: Option<f64>,

    /// Whether playback is paused at report time
    pub is_paused: bool,

    /// Client-side report time
    pub reported_at: DateTime<Utc>,
}

impl PlaybackReport {
    pub fn new(
        track_id: TrackId,
        position_seconds: f64,
        duration_seconds: Option<f64>,
        is_paused: bool,
    ) -> Self {
        Self {
            track_id,
            position_seconds,
            duration_seconds,
            is_paused,
            reported_at: Utc::now(),
        }
    }
}

/// Remote media catalog operations
///
/// Telemetry methods are fire-and-forget from the engine's point of view:
/// it spawns the calls and drops failures after logging.
#[async_trait]
pub trait CatalogBackend: Send + Sync + 'static {
    /// Resolve a streamable URL for a track.
    ///
    /// `Auto` asks for the original direct stream; explicit tiers ask for
    /// a bitrate-capped negotiated stream.
    async fn resolve_stream_url(
        &self,
        track_id: &TrackId,
        quality: QualityPreference,
    ) -> Result<String, BackendError>;

    /// Fetch loudness metadata, `Ok(None)` when the catalog has none.
    async fn fetch_loudness(&self, track_id: &TrackId)
        -> Result<Option<LoudnessInfo>, BackendError>;

    /// Payload-less connection warm-up against a resolved URL.
    async fn warm_up(&self, url: &str) -> Result<(), BackendError>;

    /// Report that playback of a track started.
    async fn report_started(&self, report: PlaybackReport) -> Result<(), BackendError>;

    /// Report coarse playback progress.
    async fn report_progress(&self, report: PlaybackReport) -> Result<(), BackendError>;

    /// Report that playback stopped.
    async fn report_stopped(&self, report: PlaybackReport) -> Result<(), BackendError>;
}

/// Local download cache lookup
#[async_trait]
pub trait DownloadCache: Send + Sync + 'static {
    /// Playable local URL for a fully downloaded track, `None` on miss.
    async fn resolve_local_url(&self, track_id: &TrackId) -> Option<String>;
}

/// Persisted user settings and session state
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    /// Stored settings, `Ok(None)` on first run.
    async fn load_settings(&self) -> Result<Option<PlayerSettings>, BackendError>;

    async fn save_settings(&self, settings: &PlayerSettings) -> Result<(), BackendError>;

    /// Stored queue snapshot from the previous session.
    async fn load_queue_snapshot(&self) -> Result<Option<QueueSnapshot>, BackendError>;

    async fn save_queue_snapshot(&self, snapshot: &QueueSnapshot) -> Result<(), BackendError>;
}

/// Resolve a playable source for a track: the local download cache wins,
/// otherwise the catalog negotiates a stream at the given quality.
pub async fn resolve_playable_source(
    cache: &dyn DownloadCache,
    catalog: &dyn CatalogBackend,
    track_id: &TrackId,
    quality: QualityPreference,
) -> Result<ResolvedSource, BackendError> {
    if let Some(url) = cache.resolve_local_url(track_id).await {
        return Ok(ResolvedSource::Local { url });
    }

    let url = catalog.resolve_stream_url(track_id, quality).await?;
    Ok(ResolvedSource::Remote { url, quality })
}
