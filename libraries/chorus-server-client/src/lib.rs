//! Chorus Server Client
//!
//! HTTP client library for the Chorus catalog API.
//!
//! # Features
//!
//! - **Stream resolution**: Negotiate stream URLs by quality tier
//! - **Loudness metadata**: Fetch per-track loudness analysis
//! - **Telemetry**: Report playback started/progress/stopped
//! - **Warm-up**: Prime connections for the upcoming track
//!
//! The client implements `chorus_playback::CatalogBackend`, so it plugs
//! straight into the playback engine.
//!
//! # Example
//!
//! ```ignore
//! use chorus_playback::{QualityPreference, TrackId};
//! use chorus_server_client::{CatalogClient, ClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create client
//!     let config = ClientConfig::new("https://music.example.com");
//!     let client = CatalogClient::new(config)?;
//!
//!     // Test connection
//!     let info = client.test_connection().await?;
//!     println!("Connected to {} v{}", info.name, info.version);
//!
//!     // Resolve a stream
//!     let track_id = TrackId::new("track-1");
//!     let url = client
//!         .resolve_stream_url(&track_id, QualityPreference::Auto)
//!         .await?;
//!     println!("Streaming from {}", url);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

// Re-export main types
pub use client::CatalogClient;
pub use error::{ClientError, Result};
pub use types::{
    CatalogSource, CatalogTrack, ClientConfig, LoudnessResponse, ServerInfo, StreamUrlResponse,
};
