//! Player settings and session persistence
//!
//! Settings are stored as key-value pairs with JSON-serialized values for
//! flexibility. The queue snapshot rides the same table, so one store
//! backs both preferences and session restore.
//!
//! # Example
//!
//! ```rust,no_run
//! use chorus_storage::settings;
//! # async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//! // Store an arbitrary value
//! settings::set_setting(pool, "ui.theme", &serde_json::json!("dark")).await?;
//!
//! // Read it back
//! let theme = settings::get_setting(pool, "ui.theme").await?;
//! # Ok(())
//! # }
//! ```

use chorus_playback::{PlayerSettings, QueueSnapshot};
use sqlx::{Row, SqlitePool};

use crate::error::{Result, StorageError};

// Setting key constants
/// Persisted player settings (volume, rate, quality, normalization, crossfade)
pub const SETTING_PLAYER: &str = "playback.settings";

/// Queue snapshot from the previous session
pub const SETTING_QUEUE_SNAPSHOT: &str = "playback.queue_snapshot";

/// Get a single setting value
///
/// Returns `Ok(Some(value))` if the setting exists, `Ok(None)` if not found
pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<serde_json::Value>> {
    let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let raw: String = row.get("value");
            let value = serde_json::from_str(&raw)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Set a setting value (JSON-serialized)
pub async fn set_setting(pool: &SqlitePool, key: &str, value: &serde_json::Value) -> Result<()> {
    let value_str = serde_json::to_string(value)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO settings (key, value, updated_at)
         VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value_str)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Delete a setting
///
/// Returns `Ok(true)` if a setting was deleted, `Ok(false)` if none was found
pub async fn delete_setting(pool: &SqlitePool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Load the persisted player settings, `None` on first run.
pub async fn load_player_settings(pool: &SqlitePool) -> Result<Option<PlayerSettings>> {
    match get_setting(pool, SETTING_PLAYER).await? {
        Some(value) => {
            let settings = serde_json::from_value(value)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            Ok(Some(settings))
        }
        None => Ok(None),
    }
}

/// Persist the player settings.
pub async fn save_player_settings(pool: &SqlitePool, settings: &PlayerSettings) -> Result<()> {
    let value = serde_json::to_value(settings)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    set_setting(pool, SETTING_PLAYER, &value).await
}

/// Load the previous session's queue snapshot.
pub async fn load_queue_snapshot(pool: &SqlitePool) -> Result<Option<QueueSnapshot>> {
    match get_setting(pool, SETTING_QUEUE_SNAPSHOT).await? {
        Some(value) => {
            let snapshot = serde_json::from_value(value)
                .map_err(|e| StorageError::SerializationError(e.to_string()))?;
            Ok(Some(snapshot))
        }
        None => Ok(None),
    }
}

/// Persist the queue snapshot for session restore.
pub async fn save_queue_snapshot(pool: &SqlitePool, snapshot: &QueueSnapshot) -> Result<()> {
    let value = serde_json::to_value(snapshot)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    set_setting(pool, SETTING_QUEUE_SNAPSHOT, &value).await
}
