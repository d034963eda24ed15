//! Playback Engine Integration Tests
//!
//! Drives the engine through its public handle with scripted lanes and an
//! in-memory backend, under a paused tokio clock so fades, the monitor
//! tick and telemetry cadence are all deterministic.
//!
//! The lanes here record every command they receive instead of producing
//! audio, which lets the tests assert on the exact gain staircases the
//! engine writes during crossfades and hard cuts.

use async_trait::async_trait;
use chorus_playback::{
    lane_event_channel, AudioLane, BackendError, CatalogBackend, DownloadCache, LaneEvent,
    LaneEventSender, LaneId, LoudnessInfo, PlaybackEngine, PlaybackReport, PlaybackState,
    PlayerDeps, PlayerEvent, PlayerHandle, PlayerSettings, QualityPreference, QueueSnapshot,
    SettingsStore, Track, TrackId,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time;

// ============================================================================
// TEST UTILITIES
// ============================================================================

/// Everything a scripted lane records and everything a test can script
#[derive(Debug)]
struct LaneScript {
    url: Option<String>,
    playing: bool,
    gain: f64,
    rate: f64,
    position: Duration,
    duration: Option<Duration>,
    buffered: Option<Duration>,
    /// Every gain ever applied, in order
    gain_log: Vec<f64>,
    /// Every seek target, in order
    seeks: Vec<Duration>,
    /// Remaining `play()` calls to fail before confirming a start
    fail_plays: u32,
}

impl Default for LaneScript {
    fn default() -> Self {
        Self {
            url: None,
            playing: false,
            gain: 0.0,
            rate: 1.0,
            position: Duration::ZERO,
            duration: None,
            buffered: None,
            gain_log: Vec::new(),
            seeks: Vec::new(),
            fail_plays: 0,
        }
    }
}

/// Lane fake: confirms or fails playback per script, records the rest
struct FakeLane {
    id: LaneId,
    events: LaneEventSender,
    script: Arc<Mutex<LaneScript>>,
    /// Durations handed out on load, keyed by track id inside the URL
    durations: Arc<Mutex<HashMap<String, Duration>>>,
}

impl AudioLane for FakeLane {
    fn load(&mut self, url: &str) {
        let duration = self
            .durations
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| url.contains(id.as_str()))
            .map(|(_, duration)| *duration);

        let mut script = self.script.lock().unwrap();
        script.url = Some(url.to_string());
        script.position = Duration::ZERO;
        script.duration = duration;
    }

    fn play(&mut self) {
        let mut script = self.script.lock().unwrap();
        if script.fail_plays > 0 {
            script.fail_plays -= 1;
            drop(script);
            let _ = self
                .events
                .send((self.id, LaneEvent::Error("scripted start failure".to_string())));
            return;
        }
        script.playing = true;
        drop(script);
        let _ = self.events.send((self.id, LaneEvent::Started));
    }

    fn pause(&mut self) {
        self.script.lock().unwrap().playing = false;
    }

    fn unload(&mut self) {
        let mut script = self.script.lock().unwrap();
        script.url = None;
        script.playing = false;
        script.position = Duration::ZERO;
        script.duration = None;
    }

    fn set_gain(&mut self, gain: f64) {
        let mut script = self.script.lock().unwrap();
        script.gain = gain;
        script.gain_log.push(gain);
    }

    fn set_rate(&mut self, rate: f64) {
        self.script.lock().unwrap().rate = rate;
    }

    fn seek(&mut self, position: Duration) {
        let mut script = self.script.lock().unwrap();
        script.position = position;
        script.seeks.push(position);
    }

    fn position(&self) -> Duration {
        self.script.lock().unwrap().position
    }

    fn duration(&self) -> Option<Duration> {
        self.script.lock().unwrap().duration
    }

    fn buffered_to(&self) -> Option<Duration> {
        self.script.lock().unwrap().buffered
    }
}

/// Shared record of every catalog interaction
#[derive(Debug, Default)]
struct CatalogLog {
    resolved: Vec<(String, QualityPreference)>,
    loudness_requests: u32,
    started: Vec<String>,
    progress: Vec<(String, f64)>,
    stopped: Vec<String>,
    warmed: Vec<String>,
    loudness: HashMap<String, LoudnessInfo>,
    fail_resolve: HashSet<String>,
    resolve_delay: Option<Duration>,
}

#[derive(Clone, Default)]
struct FakeCatalog {
    log: Arc<Mutex<CatalogLog>>,
}

#[async_trait]
impl CatalogBackend for FakeCatalog {
    async fn resolve_stream_url(
        &self,
        track_id: &TrackId,
        quality: QualityPreference,
    ) -> Result<String, BackendError> {
        let delay = {
            let mut log = self.log.lock().unwrap();
            log.resolved.push((track_id.as_str().to_string(), quality));
            if log.fail_resolve.contains(track_id.as_str()) {
                return Err(BackendError::from("scripted resolve failure"));
            }
            log.resolve_delay
        };
        if let Some(delay) = delay {
            time::sleep(delay).await;
        }
        Ok(format!(
            "https://music.example/stream/{}?quality={}",
            track_id,
            quality.as_str()
        ))
    }

    async fn fetch_loudness(
        &self,
        track_id: &TrackId,
    ) -> Result<Option<LoudnessInfo>, BackendError> {
        let mut log = self.log.lock().unwrap();
        log.loudness_requests += 1;
        Ok(log.loudness.get(track_id.as_str()).copied())
    }

    async fn warm_up(&self, url: &str) -> Result<(), BackendError> {
        self.log.lock().unwrap().warmed.push(url.to_string());
        Ok(())
    }

    async fn report_started(&self, report: PlaybackReport) -> Result<(), BackendError> {
        self.log
            .lock()
            .unwrap()
            .started
            .push(report.track_id.as_str().to_string());
        Ok(())
    }

    async fn report_progress(&self, report: PlaybackReport) -> Result<(), BackendError> {
        self.log
            .lock()
            .unwrap()
            .progress
            .push((report.track_id.as_str().to_string(), report.position_seconds));
        Ok(())
    }

    async fn report_stopped(&self, report: PlaybackReport) -> Result<(), BackendError> {
        self.log
            .lock()
            .unwrap()
            .stopped
            .push(report.track_id.as_str().to_string());
        Ok(())
    }
}

#[derive(Clone, Default)]
struct FakeCache {
    local: Arc<Mutex<HashMap<String, String>>>,
}

#[async_trait]
impl DownloadCache for FakeCache {
    async fn resolve_local_url(&self, track_id: &TrackId) -> Option<String> {
        self.local.lock().unwrap().get(track_id.as_str()).cloned()
    }
}

#[derive(Clone, Default)]
struct MemoryStore {
    settings: Arc<Mutex<Option<PlayerSettings>>>,
    queue: Arc<Mutex<Option<QueueSnapshot>>>,
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_settings(&self) -> Result<Option<PlayerSettings>, BackendError> {
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn save_settings(&self, settings: &PlayerSettings) -> Result<(), BackendError> {
        *self.settings.lock().unwrap() = Some(settings.clone());
        Ok(())
    }

    async fn load_queue_snapshot(&self) -> Result<Option<QueueSnapshot>, BackendError> {
        Ok(self.queue.lock().unwrap().clone())
    }

    async fn save_queue_snapshot(&self, snapshot: &QueueSnapshot) -> Result<(), BackendError> {
        *self.queue.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}

/// A running engine plus handles onto all of its fakes
struct TestPlayer {
    player: PlayerHandle,
    scripts: [Arc<Mutex<LaneScript>>; 2],
    durations: Arc<Mutex<HashMap<String, Duration>>>,
    catalog: FakeCatalog,
    cache: FakeCache,
    store: MemoryStore,
    lane_events: LaneEventSender,
}

impl TestPlayer {
    async fn start() -> Self {
        Self::start_with(MemoryStore::default(), FakeCatalog::default()).await
    }

    async fn start_with(store: MemoryStore, catalog: FakeCatalog) -> Self {
        let cache = FakeCache::default();
        let (events_tx, events_rx) = lane_event_channel();
        let durations = Arc::new(Mutex::new(HashMap::new()));
        let scripts = [
            Arc::new(Mutex::new(LaneScript::default())),
            Arc::new(Mutex::new(LaneScript::default())),
        ];
        let lanes = [
            FakeLane {
                id: LaneId::A,
                events: events_tx.clone(),
                script: Arc::clone(&scripts[0]),
                durations: Arc::clone(&durations),
            },
            FakeLane {
                id: LaneId::B,
                events: events_tx.clone(),
                script: Arc::clone(&scripts[1]),
                durations: Arc::clone(&durations),
            },
        ];
        let deps = PlayerDeps {
            catalog: Arc::new(catalog.clone()),
            cache: Arc::new(cache.clone()),
            store: Arc::new(store.clone()),
        };
        let (player, _task) = PlaybackEngine::spawn(lanes, events_rx, deps).await;

        Self {
            player,
            scripts,
            durations,
            catalog,
            cache,
            store,
            lane_events: events_tx,
        }
    }

    fn lane(&self, id: LaneId) -> MutexGuard<'_, LaneScript> {
        match id {
            LaneId::A => self.scripts[0].lock().unwrap(),
            LaneId::B => self.scripts[1].lock().unwrap(),
        }
    }

    fn set_position(&self, id: LaneId, position: Duration) {
        self.lane(id).position = position;
    }

    fn set_buffered(&self, id: LaneId, extent: Duration) {
        self.lane(id).buffered = Some(extent);
    }

    fn set_duration(&self, track_id: &str, duration: Duration) {
        self.durations
            .lock()
            .unwrap()
            .insert(track_id.to_string(), duration);
    }

    /// Inject the lane's end-of-source notification.
    fn end_track(&self, id: LaneId) {
        self.lane_events.send((id, LaneEvent::Ended)).unwrap();
    }
}

fn test_track(id: &str) -> Track {
    Track {
        id: TrackId::new(id),
        title: format!("Track {id}"),
        artist: "Integration Artist".to_string(),
        album_artist: None,
        album: Some("Integration Album".to_string()),
        artwork: None,
        duration: Some(Duration::from_secs(180)),
        sources: Vec::new(),
    }
}

fn three_tracks() -> Vec<Track> {
    vec![test_track("t-0"), test_track("t-1"), test_track("t-2")]
}

/// Perceptual master gain for a volume level, matching the engine's curve
fn master_gain(level: u8) -> f64 {
    10f64.powf(((f64::from(level) - 100.0) * 0.6) / 20.0)
}

/// Let in-flight resolutions and the dispatcher drain; short enough that
/// no monitor tick fires
async fn settle() {
    time::sleep(Duration::from_millis(20)).await;
}

fn drain_events(events: &mut tokio::sync::broadcast::Receiver<PlayerEvent>) -> Vec<PlayerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

// ============================================================================
// TESTS: Starting Playback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_play_queue_starts_first_track() {
    let tp = TestPlayer::start().await;

    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.current_index, Some(0));
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-0")
    );

    // The first transition binds the idle lane, B on a fresh engine
    let lane = tp.lane(LaneId::B);
    assert!(lane.playing);
    assert!(lane.url.as_deref().unwrap_or("").contains("t-0"));
    let expected = master_gain(80);
    assert!(
        (lane.gain - expected).abs() < 1e-9,
        "gain {} should be the default master gain {}",
        lane.gain,
        expected
    );
    drop(lane);

    let log = tp.catalog.log.lock().unwrap();
    assert_eq!(log.started, vec!["t-0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_local_download_wins_over_streaming() {
    let tp = TestPlayer::start().await;
    tp.cache
        .local
        .lock()
        .unwrap()
        .insert("t-0".to_string(), "file:///cache/t-0.flac".to_string());

    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    let lane = tp.lane(LaneId::B);
    assert_eq!(lane.url.as_deref(), Some("file:///cache/t-0.flac"));
    drop(lane);

    // No stream negotiation happened for a cached track
    assert!(tp.catalog.log.lock().unwrap().resolved.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_from_idle_returns_to_idle() {
    let catalog = FakeCatalog::default();
    catalog
        .log
        .lock()
        .unwrap()
        .fail_resolve
        .insert("t-0".to_string());
    let tp = TestPlayer::start_with(MemoryStore::default(), catalog).await;
    let mut events = tp.player.subscribe();

    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    assert_eq!(tp.player.snapshot().state, PlaybackState::Idle);
    assert!(!tp.lane(LaneId::A).playing);
    assert!(!tp.lane(LaneId::B).playing);
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, PlayerEvent::PlaybackError { .. })));
}

// ============================================================================
// TESTS: Manual Navigation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_manual_skip_is_a_hard_cut() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.next().unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.current_index, Some(1));
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-1")
    );

    // Old lane silenced and released, new lane at full gain
    let old = tp.lane(LaneId::B);
    assert!(!old.playing);
    assert!(old.url.is_none());
    drop(old);

    let new = tp.lane(LaneId::A);
    assert!(new.playing);
    assert!(new.url.as_deref().unwrap_or("").contains("t-1"));

    // The incoming side never ramped: its first audible gain was already
    // the full target
    let first_audible = new
        .gain_log
        .iter()
        .copied()
        .find(|gain| *gain > 0.0)
        .expect("incoming lane should have been given a gain");
    assert!(
        (first_audible - master_gain(80)).abs() < 1e-9,
        "manual skip must not fade in, first audible gain was {first_audible}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_rapid_skips_newest_wins() {
    let catalog = FakeCatalog::default();
    catalog.log.lock().unwrap().resolve_delay = Some(Duration::from_millis(100));
    let tp = TestPlayer::start_with(MemoryStore::default(), catalog).await;

    tp.player.play_queue(three_tracks(), 0).unwrap();
    time::sleep(Duration::from_millis(150)).await;
    let mut events = tp.player.subscribe();

    // Two jumps in quick succession: only the second may win
    tp.player.jump_to_track(1).unwrap();
    tp.player.jump_to_track(2).unwrap();
    time::sleep(Duration::from_millis(400)).await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.current_index, Some(2));
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-2")
    );

    // t-1 resolved too, but its result arrived under a stale token
    let started = tp.catalog.log.lock().unwrap().started.clone();
    assert_eq!(started, vec!["t-0".to_string(), "t-2".to_string()]);

    let changed: Vec<String> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            PlayerEvent::TrackChanged { track, .. } => Some(track.id.as_str().to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(changed, vec!["t-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_previous_restarts_then_steps_back() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 1).unwrap();
    settle().await;

    // Deep into the track, previous restarts it in place
    tp.set_position(LaneId::B, Duration::from_secs(10));
    tp.player.previous().unwrap();
    settle().await;

    assert_eq!(tp.player.snapshot().current_index, Some(1));
    assert_eq!(tp.lane(LaneId::B).seeks.last(), Some(&Duration::ZERO));

    // Near the start it steps to the prior track
    tp.set_position(LaneId::B, Duration::from_secs(1));
    tp.player.previous().unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.current_index, Some(0));
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-0")
    );
}

#[tokio::test(start_paused = true)]
async fn test_resolution_failure_keeps_current_track_playing() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.catalog
        .log
        .lock()
        .unwrap()
        .fail_resolve
        .insert("t-1".to_string());
    let mut events = tp.player.subscribe();

    tp.player.next().unwrap();
    settle().await;

    // The skip failed before any lane was touched
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.current_index, Some(0));
    assert!(tp.lane(LaneId::B).playing);
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, PlayerEvent::PlaybackError { .. })));
}

// ============================================================================
// TESTS: Crossfade and Automatic Advance
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_auto_advance_crossfades_between_lanes() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(60));
    tp.set_duration("t-1", Duration::from_secs(60));
    tp.player.set_crossfade(Duration::from_secs(5)).unwrap();

    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;
    let mut events = tp.player.subscribe();

    // Move the current track into the fade window and let a tick fire
    tp.set_position(LaneId::B, Duration::from_secs(56));
    time::sleep(Duration::from_millis(300)).await;

    // The advance begins unprompted: t-1 comes up silent on lane A while
    // t-0 keeps sounding, and the cursor is already committed
    {
        let incoming = tp.lane(LaneId::A);
        assert!(incoming.playing, "incoming lane should be live during fade");
        assert!(incoming.url.as_deref().unwrap_or("").contains("t-1"));
        assert!(
            incoming.gain < 0.05,
            "incoming starts near silence, got {}",
            incoming.gain
        );
        let outgoing = tp.lane(LaneId::B);
        assert!(outgoing.playing, "outgoing keeps sounding through the fade");
    }
    assert_eq!(tp.player.snapshot().current_index, Some(1));

    // Mid-fade both lanes are audible, between silence and full gain
    time::sleep(Duration::from_secs(2)).await;
    {
        let master = master_gain(80);
        let incoming = tp.lane(LaneId::A).gain;
        let outgoing = tp.lane(LaneId::B).gain;
        assert!(
            incoming > 0.3 * master && incoming < master,
            "incoming mid-fade gain {incoming}"
        );
        assert!(
            outgoing > 0.0 && outgoing < master,
            "outgoing mid-fade gain {outgoing}"
        );
    }

    // Past the end: outgoing released, incoming at full master gain
    time::sleep(Duration::from_secs(3)).await;
    {
        let incoming = tp.lane(LaneId::A);
        assert!((incoming.gain - master_gain(80)).abs() < 1e-6);
        let outgoing = tp.lane(LaneId::B);
        assert!(!outgoing.playing);
        assert!(outgoing.url.is_none());
    }

    // The incoming ramp never moved backwards
    let ramp: Vec<f64> = tp
        .lane(LaneId::A)
        .gain_log
        .iter()
        .copied()
        .filter(|gain| *gain > 0.0)
        .collect();
    assert!(
        ramp.windows(2).all(|pair| pair[1] >= pair[0] - 1e-9),
        "incoming ramp must be monotonic: {ramp:?}"
    );

    // Events bracket the fade, with the length cut to the remaining time
    let drained = drain_events(&mut events);
    let fade_len = drained.iter().find_map(|event| match event {
        PlayerEvent::TransitionStarted { fade, .. } => Some(*fade),
        _ => None,
    });
    assert_eq!(fade_len, Some(Duration::from_secs(4)));
    assert!(drained
        .iter()
        .any(|e| matches!(e, PlayerEvent::TransitionCompleted { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_gapless_advance_when_crossfade_disabled() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(30));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.set_position(LaneId::B, Duration::from_secs(30));
    tp.end_track(LaneId::B);
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.current_index, Some(1));

    let incoming = tp.lane(LaneId::A);
    assert!(incoming.playing);
    assert!((incoming.gain - master_gain(80)).abs() < 1e-9);
    drop(incoming);

    let outgoing = tp.lane(LaneId::B);
    assert!(!outgoing.playing);
    assert!(outgoing.url.is_none());
    drop(outgoing);

    let started = tp.catalog.log.lock().unwrap().started.clone();
    assert_eq!(started, vec!["t-0".to_string(), "t-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_repeat_one_replays_in_place() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    // Off -> All -> One
    tp.player.toggle_repeat().unwrap();
    tp.player.toggle_repeat().unwrap();
    settle().await;

    tp.end_track(LaneId::B);
    settle().await;

    // Same track, same lane, rewound and playing again
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.current_index, Some(0));

    let lane = tp.lane(LaneId::B);
    assert!(lane.playing);
    assert_eq!(lane.seeks.last(), Some(&Duration::ZERO));
    drop(lane);

    let started = tp.catalog.log.lock().unwrap().started.clone();
    assert_eq!(started, vec!["t-0".to_string(), "t-0".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_queue_exhaustion_stops_and_reports() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(vec![test_track("t-0")], 0).unwrap();
    settle().await;

    tp.end_track(LaneId::B);
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    // Queue and selection survive for a later play
    assert_eq!(snapshot.queue.len(), 1);
    assert_eq!(snapshot.current_index, Some(0));
    assert!(snapshot.current_track.is_none());

    assert!(!tp.lane(LaneId::B).playing);
    assert!(tp.lane(LaneId::B).url.is_none());
    let stopped = tp.catalog.log.lock().unwrap().stopped.clone();
    assert_eq!(stopped, vec!["t-0".to_string()]);
}

// ============================================================================
// TESTS: Transport
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.pause().unwrap();
    settle().await;
    assert_eq!(tp.player.snapshot().state, PlaybackState::Paused);
    assert!(!tp.lane(LaneId::B).playing);
    // The pause was reported so the server sees the position freeze
    assert!(!tp.catalog.log.lock().unwrap().progress.is_empty());

    tp.player.resume().unwrap();
    settle().await;
    assert_eq!(tp.player.snapshot().state, PlaybackState::Playing);
    assert!(tp.lane(LaneId::B).playing);
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_queue_and_selection() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;
    tp.player.jump_to_track(1).unwrap();
    settle().await;

    tp.player.stop().unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.queue.len(), 3);
    assert_eq!(snapshot.current_index, Some(1));
    let stopped = tp.catalog.log.lock().unwrap().stopped.clone();
    assert_eq!(stopped, vec!["t-1".to_string()]);

    // Play resumes from the retained selection
    tp.player.play().unwrap();
    settle().await;
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-1")
    );
}

#[tokio::test(start_paused = true)]
async fn test_seek_is_clamped_short_of_the_end() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(60));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.seek(Duration::from_secs(1000)).unwrap();
    settle().await;

    let expected = Duration::from_secs(60) - Duration::from_millis(250);
    assert_eq!(tp.lane(LaneId::B).seeks.last(), Some(&expected));
}

#[tokio::test(start_paused = true)]
async fn test_seek_clamps_to_buffered_extent_before_declared_runtime() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    // The lane has no duration of its own and only 100s buffered; the
    // catalog claims 180s. Seeks must not outrun what is seekable.
    tp.set_buffered(LaneId::B, Duration::from_secs(100));
    tp.player.seek(Duration::from_secs(1000)).unwrap();
    settle().await;

    let expected = Duration::from_secs(100) - Duration::from_millis(250);
    assert_eq!(tp.lane(LaneId::B).seeks.last(), Some(&expected));
}

#[tokio::test(start_paused = true)]
async fn test_rate_applies_to_both_lanes_and_clamps() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.set_rate(1.5).unwrap();
    settle().await;
    assert_eq!(tp.lane(LaneId::A).rate, 1.5);
    assert_eq!(tp.lane(LaneId::B).rate, 1.5);
    assert_eq!(tp.player.snapshot().rate, 1.5);

    tp.player.set_rate(9.0).unwrap();
    settle().await;
    assert_eq!(tp.player.snapshot().rate, 2.0, "rate is clamped to 2.0x");
    assert_eq!(tp.lane(LaneId::B).rate, 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_queue_stops_playback() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.clear_queue().unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert!(snapshot.queue.is_empty());
    assert_eq!(snapshot.current_index, None);
    let stopped = tp.catalog.log.lock().unwrap().stopped.clone();
    assert_eq!(stopped, vec!["t-0".to_string()]);
}

// ============================================================================
// TESTS: Queue Edits During Playback
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_removing_other_tracks_does_not_interrupt() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.remove_from_queue(2).unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.queue.len(), 2);
    assert_eq!(snapshot.current_index, Some(0));
    assert!(tp.lane(LaneId::B).playing);
    // Still only the one start, nothing was re-triggered
    assert_eq!(tp.catalog.log.lock().unwrap().started.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_removing_current_track_plays_its_successor() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.remove_from_queue(0).unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.queue.len(), 2);
    assert_eq!(snapshot.current_index, Some(0));
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-1")
    );
    let started = tp.catalog.log.lock().unwrap().started.clone();
    assert_eq!(started, vec!["t-0".to_string(), "t-1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_removing_selected_row_while_idle_stays_idle() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 1).unwrap();
    settle().await;
    tp.player.stop().unwrap();
    settle().await;

    tp.player.remove_from_queue(1).unwrap();
    settle().await;

    // The selection moved to the successor but nothing started
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.queue.len(), 2);
    assert_eq!(snapshot.current_index, Some(1));
    assert_eq!(tp.catalog.log.lock().unwrap().started.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shuffle_keeps_current_and_restores_order() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.toggle_shuffle().unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert!(snapshot.shuffled);
    assert_eq!(snapshot.queue.len(), 3);
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-0")
    );
    // Playback was not disturbed by reordering
    assert!(tp.lane(LaneId::B).playing);

    tp.player.toggle_shuffle().unwrap();
    settle().await;

    let snapshot = tp.player.snapshot();
    assert!(!snapshot.shuffled);
    let order: Vec<&str> = snapshot.queue.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(order, vec!["t-0", "t-1", "t-2"]);
}

// ============================================================================
// TESTS: Quality Swapping
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_quality_swap_preserves_position_and_keeps_playing() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(300));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.set_position(LaneId::B, Duration::from_secs(42));
    tp.player.set_quality(QualityPreference::High).unwrap();
    settle().await;

    let lane = tp.lane(LaneId::B);
    assert!(lane.url.as_deref().unwrap_or("").contains("quality=high"));
    assert_eq!(lane.position, Duration::from_secs(42));
    assert!(lane.playing);
    drop(lane);

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.current_index, Some(0));
    assert_eq!(snapshot.quality, QualityPreference::High);
}

#[tokio::test(start_paused = true)]
async fn test_quality_swap_while_paused_stays_paused() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(300));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.set_position(LaneId::B, Duration::from_secs(30));
    tp.player.pause().unwrap();
    settle().await;

    tp.player.set_quality(QualityPreference::Low).unwrap();
    settle().await;

    let lane = tp.lane(LaneId::B);
    assert!(lane.url.as_deref().unwrap_or("").contains("quality=low"));
    assert_eq!(lane.position, Duration::from_secs(30));
    assert!(!lane.playing);
    drop(lane);
    assert_eq!(tp.player.snapshot().state, PlaybackState::Paused);
}

#[tokio::test(start_paused = true)]
async fn test_pause_during_quality_swap_holds_after_the_stream_lands() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(300));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    // Make the re-resolution slow enough to pause underneath it
    tp.catalog.log.lock().unwrap().resolve_delay = Some(Duration::from_millis(100));
    tp.set_position(LaneId::B, Duration::from_secs(42));
    tp.player.set_quality(QualityPreference::High).unwrap();
    tp.player.pause().unwrap();
    time::sleep(Duration::from_millis(200)).await;

    // The swapped-in stream follows the live transport state, not the
    // state the swap was started under
    let lane = tp.lane(LaneId::B);
    assert!(lane.url.as_deref().unwrap_or("").contains("quality=high"));
    assert_eq!(lane.position, Duration::from_secs(42));
    assert!(!lane.playing, "the pause must hold across the swap");
    drop(lane);
    assert_eq!(tp.player.snapshot().state, PlaybackState::Paused);

    // Resume picks the new stream up where it held
    tp.player.resume().unwrap();
    settle().await;
    assert_eq!(tp.player.snapshot().state, PlaybackState::Playing);
    assert!(tp.lane(LaneId::B).playing);
}

// ============================================================================
// TESTS: Lane Start Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_lane_start_failure_is_retried_once() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.lane(LaneId::A).fail_plays = 1;
    tp.player.next().unwrap();
    settle().await;

    // First play errored, the retry carried it
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-1")
    );
    assert!(tp.lane(LaneId::A).playing);
}

#[tokio::test(start_paused = true)]
async fn test_lane_start_failure_twice_abandons_the_switch() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.lane(LaneId::A).fail_plays = 2;
    let mut events = tp.player.subscribe();
    tp.player.next().unwrap();
    settle().await;

    // Both attempts failed: the old track stays current in the transport
    // state it had before the switch, undoing the cut's silencing
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.current_index, Some(0));
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-0")
    );

    let failed = tp.lane(LaneId::A);
    assert!(failed.url.is_none(), "failed lane should be released");
    drop(failed);

    let old = tp.lane(LaneId::B);
    assert!(old.playing, "the silenced outgoing lane should sound again");
    assert!(
        (old.gain - master_gain(80)).abs() < 1e-9,
        "outgoing gain should be restored"
    );
    drop(old);

    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, PlayerEvent::PlaybackError { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_switch_from_paused_stays_paused() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;
    tp.player.pause().unwrap();
    settle().await;

    tp.lane(LaneId::A).fail_plays = 2;
    tp.player.next().unwrap();
    settle().await;

    // The engine was paused going in, so it comes out paused: gain is
    // restored for a later resume but nothing starts sounding
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Paused);
    assert_eq!(snapshot.current_index, Some(0));
    let old = tp.lane(LaneId::B);
    assert!(!old.playing);
    assert!((old.gain - master_gain(80)).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_advance_failure_after_the_track_runs_out_stops_cleanly() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(30));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;
    let mut events = tp.player.subscribe();

    // The source ends and the gapless advance dies on both start attempts
    tp.lane(LaneId::A).fail_plays = 2;
    tp.set_position(LaneId::B, Duration::from_secs(30));
    tp.end_track(LaneId::B);
    settle().await;

    // With the outgoing stream already over there is nothing to fall back
    // to; the engine must not sit in Playing over silence
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.current_index, Some(0));
    assert!(snapshot.current_track.is_none());
    assert!(!tp.lane(LaneId::A).playing);
    assert!(!tp.lane(LaneId::B).playing);
    assert!(drain_events(&mut events)
        .iter()
        .any(|e| matches!(e, PlayerEvent::PlaybackError { .. })));

    // And it is recoverable: a fresh play starts the selection over
    tp.player.play().unwrap();
    settle().await;
    assert_eq!(tp.player.snapshot().state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_failed_auto_advance_is_retried_on_a_later_tick() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(60));
    tp.set_duration("t-1", Duration::from_secs(60));
    tp.player.set_crossfade(Duration::from_secs(5)).unwrap();
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    // First advance dies on both start attempts while t-0 keeps sounding
    tp.lane(LaneId::A).fail_plays = 2;
    tp.set_position(LaneId::B, Duration::from_secs(56));
    time::sleep(Duration::from_millis(300)).await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(snapshot.current_index, Some(0));
    assert!(tp.lane(LaneId::B).playing, "outgoing keeps sounding");

    // The next tick notices the window again and this attempt carries
    time::sleep(Duration::from_millis(300)).await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.current_index, Some(1));
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-1")
    );
    assert!(tp.lane(LaneId::A).playing);
}

// ============================================================================
// TESTS: Volume and Normalization
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_volume_and_mute_scale_the_active_lane() {
    let tp = TestPlayer::start().await;
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.player.set_volume(50).unwrap();
    settle().await;
    assert!((tp.lane(LaneId::B).gain - master_gain(50)).abs() < 1e-9);

    tp.player.toggle_mute().unwrap();
    settle().await;
    assert_eq!(tp.lane(LaneId::B).gain, 0.0);
    let snapshot = tp.player.snapshot();
    assert!(snapshot.muted);
    assert_eq!(snapshot.volume, 50, "mute must preserve the level");

    tp.player.toggle_mute().unwrap();
    settle().await;
    assert!((tp.lane(LaneId::B).gain - master_gain(50)).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_loudness_gain_is_applied_under_master_volume() {
    let catalog = FakeCatalog::default();
    catalog.log.lock().unwrap().loudness.insert(
        "t-0".to_string(),
        LoudnessInfo {
            album_gain_db: Some(-6.0),
            ..LoudnessInfo::default()
        },
    );
    let tp = TestPlayer::start_with(MemoryStore::default(), catalog).await;

    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    let scalar = 10f64.powf(-6.0 / 20.0);
    let expected = scalar * master_gain(80);
    let gain = tp.lane(LaneId::B).gain;
    assert!(
        (gain - expected).abs() < 1e-9,
        "gain {gain} should be loudness scalar times master, {expected}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_normalization_off_skips_loudness_lookup() {
    let catalog = FakeCatalog::default();
    catalog.log.lock().unwrap().loudness.insert(
        "t-0".to_string(),
        LoudnessInfo {
            album_gain_db: Some(-6.0),
            ..LoudnessInfo::default()
        },
    );
    let tp = TestPlayer::start_with(MemoryStore::default(), catalog).await;

    tp.player.set_normalization(false).unwrap();
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    assert!((tp.lane(LaneId::B).gain - master_gain(80)).abs() < 1e-9);
    assert_eq!(tp.catalog.log.lock().unwrap().loudness_requests, 0);
}

// ============================================================================
// TESTS: Persistence and Session Restore
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_settings_changes_are_persisted() {
    let tp = TestPlayer::start().await;

    tp.player.set_volume(30).unwrap();
    tp.player.set_crossfade(Duration::from_secs(3)).unwrap();
    settle().await;

    let stored = tp
        .store
        .settings
        .lock()
        .unwrap()
        .clone()
        .expect("settings should have been saved");
    assert_eq!(stored.volume, 30);
    assert_eq!(stored.crossfade, Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_restored_session_is_selected_but_idle() {
    let store = MemoryStore::default();
    *store.queue.lock().unwrap() = Some(QueueSnapshot {
        tracks: three_tracks(),
        current_index: Some(2),
    });
    *store.settings.lock().unwrap() = Some(PlayerSettings {
        volume: 55,
        ..PlayerSettings::default()
    });

    let tp = TestPlayer::start_with(store, FakeCatalog::default()).await;
    settle().await;

    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Idle);
    assert_eq!(snapshot.queue.len(), 3);
    assert_eq!(snapshot.current_index, Some(2));
    assert_eq!(snapshot.volume, 55);
    assert!(snapshot.current_track.is_none());
    assert!(tp.catalog.log.lock().unwrap().started.is_empty());

    // Play picks up from the restored selection
    tp.player.play().unwrap();
    settle().await;
    let snapshot = tp.player.snapshot();
    assert_eq!(snapshot.state, PlaybackState::Playing);
    assert_eq!(
        snapshot.current_track.as_ref().map(|t| t.id.as_str()),
        Some("t-2")
    );
}

// ============================================================================
// TESTS: Monitor Side Work
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_upcoming_track_is_warmed_up_once() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(60));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    // Inside the prefetch window; several ticks pass
    tp.set_position(LaneId::B, Duration::from_secs(52));
    time::sleep(Duration::from_millis(800)).await;

    let warmed = tp.catalog.log.lock().unwrap().warmed.clone();
    assert_eq!(warmed.len(), 1, "warm-up must fire exactly once");
    assert!(warmed[0].contains("t-1"));
}

#[tokio::test(start_paused = true)]
async fn test_cached_next_track_needs_no_warm_up() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(60));
    tp.cache
        .local
        .lock()
        .unwrap()
        .insert("t-1".to_string(), "file:///cache/t-1.flac".to_string());
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;

    tp.set_position(LaneId::B, Duration::from_secs(52));
    time::sleep(Duration::from_millis(800)).await;

    assert!(tp.catalog.log.lock().unwrap().warmed.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_progress_reports_follow_the_cadence() {
    let tp = TestPlayer::start().await;
    tp.set_duration("t-0", Duration::from_secs(600));
    tp.player.play_queue(three_tracks(), 0).unwrap();
    settle().await;
    assert!(tp.catalog.log.lock().unwrap().progress.is_empty());

    time::sleep(Duration::from_secs(6)).await;
    assert_eq!(tp.catalog.log.lock().unwrap().progress.len(), 1);

    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(tp.catalog.log.lock().unwrap().progress.len(), 2);
}
