//! Local download registry
//!
//! Fully downloaded tracks are registered here so playback can bypass the
//! network. Registered paths are verified against the filesystem at
//! resolve time; rows whose file disappeared are dropped.

use chorus_playback::TrackId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::error::{Result, StorageError};

/// One fully downloaded track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub track_id: TrackId,
    /// Absolute path of the downloaded file
    pub file_path: String,
    /// Quality tier the file was downloaded at, when known
    pub quality: Option<String>,
    pub size_bytes: Option<i64>,
    pub downloaded_at: DateTime<Utc>,
}

/// Register a download, replacing any previous file for the track.
pub async fn record_download(pool: &SqlitePool, record: &DownloadRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO downloads (track_id, file_path, quality, size_bytes, downloaded_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(track_id) DO UPDATE SET
            file_path = excluded.file_path,
            quality = excluded.quality,
            size_bytes = excluded.size_bytes,
            downloaded_at = excluded.downloaded_at",
    )
    .bind(record.track_id.as_str())
    .bind(&record.file_path)
    .bind(&record.quality)
    .bind(record.size_bytes)
    .bind(record.downloaded_at.timestamp())
    .execute(pool)
    .await?;

    Ok(())
}

/// Get the download record for a track, if any.
pub async fn get_download(pool: &SqlitePool, track_id: &TrackId) -> Result<Option<DownloadRecord>> {
    let row = sqlx::query(
        "SELECT track_id, file_path, quality, size_bytes, downloaded_at
         FROM downloads WHERE track_id = ?",
    )
    .bind(track_id.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(|row| record_from_row(&row)).transpose()
}

/// All registered downloads, newest first.
pub async fn all_downloads(pool: &SqlitePool) -> Result<Vec<DownloadRecord>> {
    let rows = sqlx::query(
        "SELECT track_id, file_path, quality, size_bytes, downloaded_at
         FROM downloads ORDER BY downloaded_at DESC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Remove a download record.
///
/// Returns `Ok(true)` if a record was removed, `Ok(false)` if none existed
pub async fn remove_download(pool: &SqlitePool, track_id: &TrackId) -> Result<bool> {
    let result = sqlx::query("DELETE FROM downloads WHERE track_id = ?")
        .bind(track_id.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Resolve a playable `file://` URL for a downloaded track.
///
/// The registered path is checked against the filesystem; a row whose
/// file no longer exists is removed and resolves to `None`.
pub async fn resolve_verified(pool: &SqlitePool, track_id: &TrackId) -> Result<Option<String>> {
    let record = match get_download(pool, track_id).await? {
        Some(record) => record,
        None => return Ok(None),
    };

    if tokio::fs::try_exists(&record.file_path).await.unwrap_or(false) {
        Ok(Some(format!("file://{}", record.file_path)))
    } else {
        remove_download(pool, track_id).await?;
        Ok(None)
    }
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<DownloadRecord> {
    let downloaded_at = row.get::<i64, _>("downloaded_at");

    Ok(DownloadRecord {
        track_id: TrackId::new(row.get::<String, _>("track_id")),
        file_path: row.get("file_path"),
        quality: row.get("quality"),
        size_bytes: row.get("size_bytes"),
        downloaded_at: DateTime::from_timestamp(downloaded_at, 0).ok_or_else(|| {
            StorageError::SerializationError(format!("invalid timestamp: {downloaded_at}"))
        })?,
    })
}
