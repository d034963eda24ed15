//! Error types for the playback engine

use thiserror::Error;

/// Playback engine errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Track failed boundary validation
    #[error("Invalid track: {0}")]
    InvalidTrack(String),

    /// Engine command channel is closed (engine task stopped)
    #[error("Engine is not running")]
    EngineStopped,
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;
