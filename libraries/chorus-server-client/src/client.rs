//! Main Chorus catalog client.

use crate::error::{ClientError, Result};
use crate::types::{CatalogTrack, ClientConfig, LoudnessResponse, ServerInfo, StreamUrlResponse};
use async_trait::async_trait;
use chorus_playback::{
    BackendError, CatalogBackend, LoudnessInfo, PlaybackReport, QualityPreference, Track, TrackId,
};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Ceiling for the payload-less connection warm-up
const WARM_UP_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for a Chorus catalog server.
///
/// Covers the playback engine's catalog needs: stream URL resolution by
/// quality tier, loudness metadata, playback telemetry and connection
/// warm-up. Implements [`CatalogBackend`] so it can be handed to the
/// engine directly.
///
/// # Example
///
/// ```ignore
/// use chorus_server_client::{CatalogClient, ClientConfig};
///
/// let client = CatalogClient::new(ClientConfig::new("https://music.example.com"))?;
///
/// let info = client.test_connection().await?;
/// println!("Connected to {} v{}", info.name, info.version);
///
/// let url = client
///     .resolve_stream_url(&track_id, QualityPreference::Auto)
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
}

impl CatalogClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let base_url = config.url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::InvalidUrl("URL cannot be empty".into()));
        }

        let parsed = Url::parse(&base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme '{}', expected http or https",
                parsed.scheme()
            )));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("Chorus/{} (Desktop)", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { http, base_url })
    }

    /// Get the server base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Test the connection to the server.
    pub async fn test_connection(&self) -> Result<ServerInfo> {
        let url = format!("{}/api/info", self.base_url);
        debug!(url = %url, "Testing server connection");

        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ClientError::ServerUnreachable(e.to_string())
            } else {
                ClientError::Request(e)
            }
        })?;

        if response.status().is_success() {
            let server_info: ServerInfo = response.json().await.map_err(|e| {
                ClientError::ParseError(format!("Failed to parse server info: {}", e))
            })?;

            info!(
                name = %server_info.name,
                version = %server_info.version,
                "Connected to catalog server"
            );

            Ok(server_info)
        } else {
            Err(Self::server_error(response).await)
        }
    }

    /// Fetch a single track's catalog metadata, validated at the boundary.
    pub async fn get_track(&self, track_id: &TrackId) -> Result<Track> {
        let url = format!("{}/api/tracks/{}", self.base_url, track_id);
        debug!(url = %url, track_id = %track_id, "Fetching track");

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            let dto: CatalogTrack = response.json().await.map_err(|e| {
                ClientError::ParseError(format!("Failed to parse track response: {}", e))
            })?;
            Track::try_from(dto)
        } else if status.as_u16() == 404 {
            Err(ClientError::ServerError {
                status: 404,
                message: format!("Track not found: {}", track_id),
            })
        } else {
            Err(Self::server_error(response).await)
        }
    }

    /// Resolve a streamable URL for a track at a quality preference.
    ///
    /// `Auto` asks for the original direct stream; explicit tiers ask the
    /// server for a bitrate-capped negotiated stream. The returned URL may
    /// be time-limited and should be used promptly.
    pub async fn resolve_stream_url(
        &self,
        track_id: &TrackId,
        quality: QualityPreference,
    ) -> Result<String> {
        let url = format!(
            "{}/api/tracks/{}/stream?quality={}",
            self.base_url,
            track_id,
            quality.as_str()
        );
        debug!(url = %url, track_id = %track_id, quality = quality.as_str(), "Resolving stream URL");

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            let stream_info: StreamUrlResponse = response.json().await.map_err(|e| {
                ClientError::ParseError(format!("Failed to parse stream response: {}", e))
            })?;
            Ok(stream_info.url)
        } else if status.as_u16() == 404 {
            Err(ClientError::ServerError {
                status: 404,
                message: format!("Track not found: {}", track_id),
            })
        } else {
            Err(Self::server_error(response).await)
        }
    }

    /// Fetch loudness analysis for a track.
    ///
    /// Returns `Ok(None)` when the server has no analysis for the track,
    /// which is common and not an error.
    pub async fn fetch_loudness(&self, track_id: &TrackId) -> Result<Option<LoudnessInfo>> {
        let url = format!("{}/api/tracks/{}/loudness", self.base_url, track_id);
        debug!(url = %url, track_id = %track_id, "Fetching loudness metadata");

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status.is_success() {
            let loudness: LoudnessResponse = response.json().await.map_err(|e| {
                ClientError::ParseError(format!("Failed to parse loudness response: {}", e))
            })?;
            Ok(Some(loudness.into()))
        } else if status.as_u16() == 404 {
            Ok(None)
        } else {
            Err(Self::server_error(response).await)
        }
    }

    /// Payload-less connection warm-up against a resolved stream URL.
    ///
    /// A HEAD request under a short timeout; primes DNS, the TCP/TLS
    /// handshake and any server-side cache without reading the body.
    pub async fn warm_up(&self, url: &str) -> Result<()> {
        debug!(url = %url, "Warming up stream connection");

        let response = self
            .http
            .head(url)
            .timeout(WARM_UP_TIMEOUT)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::server_error(response).await)
        }
    }

    /// Report that playback of a track started.
    pub async fn report_started(&self, report: &PlaybackReport) -> Result<()> {
        self.post_report("started", report).await
    }

    /// Report coarse playback progress.
    pub async fn report_progress(&self, report: &PlaybackReport) -> Result<()> {
        self.post_report("progress", report).await
    }

    /// Report that playback stopped.
    pub async fn report_stopped(&self, report: &PlaybackReport) -> Result<()> {
        self.post_report("stopped", report).await
    }

    async fn post_report(&self, phase: &str, report: &PlaybackReport) -> Result<()> {
        let url = format!("{}/api/playback/{}", self.base_url, phase);
        debug!(
            url = %url,
            track_id = %report.track_id,
            position = report.position_seconds,
            "Reporting playback telemetry"
        );

        let response = self.http.post(&url).json(report).send().await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::server_error(response).await)
        }
    }

    async fn server_error(response: Response) -> ClientError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        ClientError::ServerError { status, message }
    }
}

#[async_trait]
impl CatalogBackend for CatalogClient {
    async fn resolve_stream_url(
        &self,
        track_id: &TrackId,
        quality: QualityPreference,
    ) -> std::result::Result<String, BackendError> {
        self.resolve_stream_url(track_id, quality)
            .await
            .map_err(backend_error)
    }

    async fn fetch_loudness(
        &self,
        track_id: &TrackId,
    ) -> std::result::Result<Option<LoudnessInfo>, BackendError> {
        self.fetch_loudness(track_id).await.map_err(backend_error)
    }

    async fn warm_up(&self, url: &str) -> std::result::Result<(), BackendError> {
        self.warm_up(url).await.map_err(backend_error)
    }

    async fn report_started(&self, report: PlaybackReport) -> std::result::Result<(), BackendError> {
        self.report_started(&report).await.map_err(backend_error)
    }

    async fn report_progress(
        &self,
        report: PlaybackReport,
    ) -> std::result::Result<(), BackendError> {
        self.report_progress(&report).await.map_err(backend_error)
    }

    async fn report_stopped(&self, report: PlaybackReport) -> std::result::Result<(), BackendError> {
        self.report_stopped(&report).await.map_err(backend_error)
    }
}

/// The engine boundary only needs something to log.
fn backend_error(err: ClientError) -> BackendError {
    BackendError::from(err.to_string())
}
