/// Database implementation
use crate::error::{Result, StorageError};
use crate::{downloads, settings};
use async_trait::async_trait;
use chorus_playback::{
    BackendError, DownloadCache, PlayerSettings, QueueSnapshot, SettingsStore, TrackId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// SQLite database backing the player's persistent state
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `database_url` and apply the schema.
    ///
    /// # Errors
    /// Returns an error if the connection fails or migrations fail
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        // Run migrations manually for reliability across different execution contexts
        Self::run_migrations(&pool).await?;

        info!(url = database_url, "storage ready");
        Ok(Self { pool })
    }

    /// Create an in-memory database (for tests and previews)
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        // Embedded migrations for reliability
        const MIGRATIONS: &[&str] = &[
            include_str!("../migrations/20250301000001_create_settings.sql"),
            include_str!("../migrations/20250301000002_create_downloads.sql"),
        ];

        for migration in MIGRATIONS {
            sqlx::query(migration)
                .execute(pool)
                .await
                .map_err(|e| StorageError::Migration(e.to_string()))?;
        }

        Ok(())
    }
}

#[async_trait]
impl SettingsStore for Database {
    async fn load_settings(&self) -> std::result::Result<Option<PlayerSettings>, BackendError> {
        settings::load_player_settings(&self.pool)
            .await
            .map_err(BackendError::from)
    }

    async fn save_settings(
        &self,
        settings: &PlayerSettings,
    ) -> std::result::Result<(), BackendError> {
        settings::save_player_settings(&self.pool, settings)
            .await
            .map_err(BackendError::from)
    }

    async fn load_queue_snapshot(&self) -> std::result::Result<Option<QueueSnapshot>, BackendError> {
        settings::load_queue_snapshot(&self.pool)
            .await
            .map_err(BackendError::from)
    }

    async fn save_queue_snapshot(
        &self,
        snapshot: &QueueSnapshot,
    ) -> std::result::Result<(), BackendError> {
        settings::save_queue_snapshot(&self.pool, snapshot)
            .await
            .map_err(BackendError::from)
    }
}

#[async_trait]
impl DownloadCache for Database {
    async fn resolve_local_url(&self, track_id: &TrackId) -> Option<String> {
        match downloads::resolve_verified(&self.pool, track_id).await {
            Ok(resolved) => resolved,
            Err(error) => {
                // A broken registry must read as a cache miss, not a failure
                warn!(%error, track_id = %track_id, "download lookup failed");
                None
            }
        }
    }
}
