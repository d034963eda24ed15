//! Types for Chorus catalog API requests and responses.
//!
//! Wire DTOs are kept separate from the engine's validated types; the
//! conversions at the bottom are the only place catalog JSON becomes a
//! [`Track`] the engine will accept.

use chorus_playback::{LoudnessInfo, MediaSource, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ClientError;

/// Configuration for connecting to a Chorus catalog server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server (e.g. "https://music.example.com")
    pub url: String,
}

impl ClientConfig {
    /// Create a new client config for the given base URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

// =============================================================================
// Server Info Types
// =============================================================================

/// Information about the catalog server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub features: Vec<String>,
}

// =============================================================================
// Streaming Types
// =============================================================================

/// Stream URL response.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamUrlResponse {
    pub url: String,
    /// URL validity in seconds, when the server time-limits it
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Loudness analysis response.
///
/// Every field is optional; servers report whatever their analysis
/// pipeline produced.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoudnessResponse {
    #[serde(default)]
    pub album_gain_db: Option<f64>,
    #[serde(default)]
    pub track_gain_db: Option<f64>,
    #[serde(default)]
    pub album_loudness_lufs: Option<f64>,
    #[serde(default)]
    pub track_loudness_lufs: Option<f64>,
    #[serde(default)]
    pub album_peak: Option<f64>,
    #[serde(default)]
    pub track_peak: Option<f64>,
}

impl From<LoudnessResponse> for LoudnessInfo {
    fn from(response: LoudnessResponse) -> Self {
        Self {
            album_gain_db: response.album_gain_db,
            track_gain_db: response.track_gain_db,
            album_loudness_lufs: response.album_loudness_lufs,
            track_loudness_lufs: response.track_loudness_lufs,
            album_peak: response.album_peak,
            track_peak: response.track_peak,
        }
    }
}

// =============================================================================
// Catalog Track Types
// =============================================================================

/// A track as returned by the catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogTrack {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub artwork_url: Option<String>,
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub sources: Vec<CatalogSource>,
}

/// One rendition of a catalog track.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogSource {
    pub container: String,
    pub codec: String,
    pub bitrate_kbps: Option<u32>,
    pub channels: Option<u16>,
    pub sample_rate: Option<u32>,
    pub bit_depth: Option<u8>,
    pub direct_url: Option<String>,
    pub transcode_url: Option<String>,
    #[serde(default)]
    pub direct_stream: bool,
}

impl From<CatalogSource> for MediaSource {
    fn from(source: CatalogSource) -> Self {
        Self {
            container: source.container,
            codec: source.codec,
            bitrate_kbps: source.bitrate_kbps,
            channels: source.channels,
            sample_rate: source.sample_rate,
            bit_depth: source.bit_depth,
            direct_url: source.direct_url,
            transcode_url: source.transcode_url,
            direct_stream: source.direct_stream,
        }
    }
}

impl TryFrom<CatalogTrack> for Track {
    type Error = ClientError;

    fn try_from(dto: CatalogTrack) -> Result<Self, Self::Error> {
        let duration = dto
            .duration_seconds
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
            .map(Duration::from_secs_f64);

        let track = Track {
            id: TrackId::new(dto.id),
            title: dto.title,
            artist: dto.artist.unwrap_or_default(),
            album_artist: dto.album_artist,
            album: dto.album,
            artwork: dto.artwork_url,
            duration,
            sources: dto.sources.into_iter().map(MediaSource::from).collect(),
        };

        track
            .validate()
            .map_err(|e| ClientError::InvalidTrack(e.to_string()))?;
        Ok(track)
    }
}
