//! Chorus Storage
//!
//! `SQLite` persistence layer for Chorus clients.
//!
//! This crate stores player settings, the previous session's queue and
//! the local download registry.
//!
//! # Architecture
//!
//! - **Vertical slicing**: each feature owns its own queries and logic
//! - **Engine boundary**: [`Database`] implements the playback engine's
//!   `SettingsStore` and `DownloadCache` traits
//! - **Embedded migrations**: the schema ships inside the binary and is
//!   applied on open
//!
//! # Example
//!
//! ```rust,no_run
//! use chorus_storage::{settings, Database};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Open (or create) the database
//! let db = Database::new("sqlite://chorus.db").await?;
//!
//! // Load persisted player settings
//! let stored = settings::load_player_settings(db.pool()).await?;
//! # Ok(())
//! # }
//! ```

mod database;
mod error;

// Vertical slices
pub mod downloads;
pub mod settings;

pub use database::Database;
pub use error::{Result, StorageError};
