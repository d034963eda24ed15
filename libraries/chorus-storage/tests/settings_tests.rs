use chorus_playback::types::{PlayerSettings, QualityPreference, QueueSnapshot, Track, TrackId};
use chorus_storage::{settings, Database, StorageError};
use std::time::Duration;

fn test_track(id: &str) -> Track {
    Track {
        id: TrackId::new(id),
        title: format!("Track {}", id),
        artist: "Test Artist".to_string(),
        album_artist: None,
        album: Some("Test Album".to_string()),
        artwork: None,
        duration: Some(Duration::from_secs(180)),
        sources: Vec::new(),
    }
}

#[tokio::test]
async fn test_set_and_get_setting() {
    let db = Database::in_memory().await.unwrap();

    let value = serde_json::json!("dark");
    settings::set_setting(db.pool(), "ui.theme", &value)
        .await
        .unwrap();

    let result = settings::get_setting(db.pool(), "ui.theme").await.unwrap();

    assert_eq!(result, Some(value));
}

#[tokio::test]
async fn test_get_non_existent_setting() {
    let db = Database::in_memory().await.unwrap();

    let result = settings::get_setting(db.pool(), "non_existent_key")
        .await
        .unwrap();

    assert_eq!(result, None);
}

#[tokio::test]
async fn test_update_existing_setting() {
    let db = Database::in_memory().await.unwrap();

    let value1 = serde_json::json!(40);
    settings::set_setting(db.pool(), "audio.volume", &value1)
        .await
        .unwrap();

    let value2 = serde_json::json!(75);
    settings::set_setting(db.pool(), "audio.volume", &value2)
        .await
        .unwrap();

    let result = settings::get_setting(db.pool(), "audio.volume")
        .await
        .unwrap();

    assert_eq!(result, Some(value2));
}

#[tokio::test]
async fn test_delete_setting() {
    let db = Database::in_memory().await.unwrap();

    settings::set_setting(db.pool(), "ui.theme", &serde_json::json!("dark"))
        .await
        .unwrap();

    let deleted = settings::delete_setting(db.pool(), "ui.theme").await.unwrap();
    assert!(deleted);

    let result = settings::get_setting(db.pool(), "ui.theme").await.unwrap();
    assert_eq!(result, None);

    // Second delete finds nothing
    let deleted = settings::delete_setting(db.pool(), "ui.theme").await.unwrap();
    assert!(!deleted);
}

#[tokio::test]
async fn test_first_run_has_no_player_settings() {
    let db = Database::in_memory().await.unwrap();

    let stored = settings::load_player_settings(db.pool()).await.unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_player_settings_round_trip() {
    let db = Database::in_memory().await.unwrap();

    let stored = PlayerSettings {
        volume: 65,
        rate: 1.25,
        quality: QualityPreference::High,
        normalization: false,
        crossfade: Duration::from_secs(4),
    };
    settings::save_player_settings(db.pool(), &stored)
        .await
        .unwrap();

    let loaded = settings::load_player_settings(db.pool()).await.unwrap();
    assert_eq!(loaded, Some(stored));
}

#[tokio::test]
async fn test_queue_snapshot_round_trip() {
    let db = Database::in_memory().await.unwrap();

    let snapshot = QueueSnapshot {
        tracks: vec![test_track("a"), test_track("b"), test_track("c")],
        current_index: Some(1),
    };
    settings::save_queue_snapshot(db.pool(), &snapshot)
        .await
        .unwrap();

    let loaded = settings::load_queue_snapshot(db.pool())
        .await
        .unwrap()
        .expect("snapshot stored");

    assert_eq!(loaded, snapshot);
}

#[tokio::test]
async fn test_no_snapshot_on_first_run() {
    let db = Database::in_memory().await.unwrap();

    let loaded = settings::load_queue_snapshot(db.pool()).await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn test_corrupt_settings_value_is_an_error() {
    let db = Database::in_memory().await.unwrap();

    // A value of the wrong shape under the settings key
    settings::set_setting(
        db.pool(),
        settings::SETTING_PLAYER,
        &serde_json::json!("not settings"),
    )
    .await
    .unwrap();

    let result = settings::load_player_settings(db.pool()).await;
    assert!(matches!(
        result.unwrap_err(),
        StorageError::SerializationError(_)
    ));
}
