//! Playback engine
//!
//! One dispatcher task owns every piece of mutable playback state: the
//! two lanes, the queue, the transport state, the transition token and
//! flags. Commands from [`PlayerHandle`], lane events, completions of
//! spawned async work and the monitor tick all arrive over channels and
//! are handled strictly one at a time, so no mutation ever races another.
//!
//! Spawned tasks (source resolution, loudness fetch, telemetry, warm-up)
//! never touch state themselves. Each carries the transition token it was
//! started under and reports back as a message; the dispatcher drops any
//! message whose token has been superseded. That token comparison is the
//! engine's entire cancellation story.

mod monitor;
mod transition;

use crate::backend::{CatalogBackend, DownloadCache, PlaybackReport, ResolvedSource, SettingsStore};
use crate::error::{PlaybackError, Result};
use crate::events::{PlayerEvent, PlayerSnapshot};
use crate::fade::FadePlan;
use crate::lane::{AudioLane, LaneEvents, LaneId};
use crate::queue::{PlayQueue, RemoveOutcome};
use crate::types::{
    PlaybackState, PlayerSettings, QualityPreference, Track, TrackId, MAX_CROSSFADE, MAX_RATE,
    MIN_RATE,
};
use crate::volume::MasterVolume;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Monitor cadence; fades are also resampled on this tick
pub(crate) const MONITOR_TICK: Duration = Duration::from_millis(250);

/// Minimum spacing between progress telemetry reports
pub(crate) const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Floor under the near-end telemetry fast path
pub(crate) const PROGRESS_FLOOR: Duration = Duration::from_secs(1);

/// Remaining-time window that triggers the gapless warm-up
pub(crate) const PREFETCH_WINDOW: Duration = Duration::from_secs(10);

/// Warm-up requests are abandoned after this long
pub(crate) const WARM_UP_TIMEOUT: Duration = Duration::from_secs(3);

/// Seeks stop short of the very end by this margin
pub(crate) const SEEK_END_GUARD: Duration = Duration::from_millis(250);

/// `previous()` restarts the current track beyond this position
pub(crate) const PREVIOUS_RESTART_AFTER: Duration = Duration::from_secs(3);

/// Broadcast buffer for player events
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Commands accepted by the dispatcher
#[derive(Debug)]
pub(crate) enum Command {
    PlayQueue { tracks: Vec<Track>, start_index: usize },
    AddToQueue { track: Track },
    AddToQueueNext { track: Track },
    RemoveFromQueue { index: usize },
    ReorderQueue { from: usize, to: usize },
    JumpToTrack { index: usize },
    Next,
    Previous,
    ToggleShuffle,
    ToggleRepeat,
    ClearQueue,
    Play,
    Pause,
    Resume,
    Stop,
    Seek { position: Duration },
    SetVolume { level: u8 },
    ToggleMute,
    SetRate { rate: f64 },
    SetQuality { quality: QualityPreference },
    SetCrossfade { length: Duration },
    SetNormalization { enabled: bool },
    Shutdown,
}

/// Completions of spawned async work, stamped with the token they were
/// started under
#[derive(Debug)]
pub(crate) enum Msg {
    SourceReady {
        token: u64,
        target_index: usize,
        track: Box<Track>,
        source: ResolvedSource,
        scalar: f64,
    },
    SourceFailed {
        token: u64,
        track_id: TrackId,
        error: String,
    },
    SwapReady {
        token: u64,
        source: ResolvedSource,
    },
    SwapFailed {
        token: u64,
        error: String,
    },
}

/// An accepted transition between lanes, awaiting start confirmation
#[derive(Debug)]
pub(crate) struct PendingTransition {
    pub(crate) token: u64,
    pub(crate) target_index: usize,
    pub(crate) track: Track,
    pub(crate) scalar: f64,
    /// Hard cut: the outgoing lane was silenced when this was accepted
    pub(crate) cut: bool,
    pub(crate) lane: LaneId,
    pub(crate) retried: bool,
}

/// An in-place quality swap on the active lane, awaiting confirmation
#[derive(Debug)]
pub(crate) struct PendingSwap {
    pub(crate) token: u64,
    pub(crate) position: Duration,
    pub(crate) retried: bool,
}

/// A crossfade in progress between the two lanes
#[derive(Debug)]
pub(crate) struct ActiveFade {
    pub(crate) plan: FadePlan,
    pub(crate) started_at: Instant,
    pub(crate) incoming: LaneId,
}

/// Engine-side mirror of what a lane holds
#[derive(Debug, Default)]
pub(crate) struct LaneState {
    pub(crate) track: Option<Track>,
    pub(crate) url: Option<String>,
    /// Normalization scalar for the loaded track
    pub(crate) scalar: f64,
    /// Last applied pre-master gain
    pub(crate) gain: f64,
}

impl LaneState {
    pub(crate) fn clear(&mut self) {
        self.track = None;
        self.url = None;
        self.scalar = 0.0;
        self.gain = 0.0;
    }
}

/// External collaborators the engine talks through
pub struct PlayerDeps {
    pub catalog: Arc<dyn CatalogBackend>,
    pub cache: Arc<dyn DownloadCache>,
    pub store: Arc<dyn SettingsStore>,
}

/// Cloneable facade over the engine's command channel and read paths
#[derive(Clone)]
pub struct PlayerHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<PlayerSnapshot>,
    events: broadcast::Sender<PlayerEvent>,
}

impl PlayerHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| PlaybackError::EngineStopped)
    }

    /// Replace the queue and start playing at `start_index`.
    pub fn play_queue(&self, tracks: Vec<Track>, start_index: usize) -> Result<()> {
        self.send(Command::PlayQueue {
            tracks,
            start_index,
        })
    }

    /// Append a track to the end of the queue.
    pub fn add_to_queue(&self, track: Track) -> Result<()> {
        self.send(Command::AddToQueue { track })
    }

    /// Insert a track right after the current one (de-duplicated).
    pub fn add_to_queue_next(&self, track: Track) -> Result<()> {
        self.send(Command::AddToQueueNext { track })
    }

    pub fn remove_from_queue(&self, index: usize) -> Result<()> {
        self.send(Command::RemoveFromQueue { index })
    }

    pub fn reorder_queue(&self, from: usize, to: usize) -> Result<()> {
        self.send(Command::ReorderQueue { from, to })
    }

    pub fn jump_to_track(&self, index: usize) -> Result<()> {
        self.send(Command::JumpToTrack { index })
    }

    pub fn next(&self) -> Result<()> {
        self.send(Command::Next)
    }

    pub fn previous(&self) -> Result<()> {
        self.send(Command::Previous)
    }

    pub fn toggle_shuffle(&self) -> Result<()> {
        self.send(Command::ToggleShuffle)
    }

    pub fn toggle_repeat(&self) -> Result<()> {
        self.send(Command::ToggleRepeat)
    }

    pub fn clear_queue(&self) -> Result<()> {
        self.send(Command::ClearQueue)
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    pub fn seek(&self, position: Duration) -> Result<()> {
        self.send(Command::Seek { position })
    }

    /// Set master volume (0-100).
    pub fn set_volume(&self, level: u8) -> Result<()> {
        self.send(Command::SetVolume { level })
    }

    pub fn toggle_mute(&self) -> Result<()> {
        self.send(Command::ToggleMute)
    }

    pub fn set_rate(&self, rate: f64) -> Result<()> {
        self.send(Command::SetRate { rate })
    }

    /// Change quality; hot-swaps the stream when something is playing.
    pub fn set_quality(&self, quality: QualityPreference) -> Result<()> {
        self.send(Command::SetQuality { quality })
    }

    pub fn set_crossfade(&self, length: Duration) -> Result<()> {
        self.send(Command::SetCrossfade { length })
    }

    pub fn set_normalization(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetNormalization { enabled })
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch receiver for state changes, for callers that await updates.
    pub fn watch(&self) -> watch::Receiver<PlayerSnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to edge-triggered player events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }

    /// Ask the engine task to exit.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }
}

/// The dispatcher: owns all mutable playback state
pub struct PlaybackEngine<L: AudioLane> {
    pub(crate) lanes: [L; 2],
    pub(crate) lane_state: [LaneState; 2],
    pub(crate) active: LaneId,

    pub(crate) queue: PlayQueue,
    pub(crate) state: PlaybackState,
    pub(crate) settings: PlayerSettings,
    pub(crate) volume: MasterVolume,

    /// Monotonic transition token; bumped by every transition request
    pub(crate) token: u64,
    /// User explicitly skipped/jumped; suppresses crossfade
    pub(crate) manual: bool,
    /// The monitor already triggered the next transition
    pub(crate) auto_advanced: bool,

    pub(crate) pending: Option<PendingTransition>,
    pub(crate) pending_swap: Option<PendingSwap>,
    pub(crate) fade: Option<ActiveFade>,

    /// Upcoming track already warmed up (one-shot, never retried)
    pub(crate) warmed_for: Option<TrackId>,
    pub(crate) last_progress: Option<Instant>,

    pub(crate) catalog: Arc<dyn CatalogBackend>,
    pub(crate) cache: Arc<dyn DownloadCache>,
    pub(crate) store: Arc<dyn SettingsStore>,

    pub(crate) msg_tx: mpsc::UnboundedSender<Msg>,
    pub(crate) snapshot_tx: watch::Sender<PlayerSnapshot>,
    pub(crate) events_tx: broadcast::Sender<PlayerEvent>,
}

impl<L: AudioLane> PlaybackEngine<L> {
    /// Load persisted state, start the dispatcher task and hand back the
    /// command facade.
    ///
    /// The previous session's queue is restored selected-but-idle; nothing
    /// auto-plays.
    pub async fn spawn(
        lanes: [L; 2],
        lane_events: LaneEvents,
        deps: PlayerDeps,
    ) -> (PlayerHandle, JoinHandle<()>) {
        let settings = match deps.store.load_settings().await {
            Ok(Some(stored)) => stored.clamped(),
            Ok(None) => PlayerSettings::default(),
            Err(error) => {
                warn!(%error, "failed to load settings, using defaults");
                PlayerSettings::default()
            }
        };

        let mut queue = PlayQueue::new();
        match deps.store.load_queue_snapshot().await {
            Ok(Some(snapshot)) => {
                debug!(tracks = snapshot.tracks.len(), "restoring queue snapshot");
                queue.restore(snapshot);
            }
            Ok(None) => {}
            Err(error) => warn!(%error, "failed to load queue snapshot"),
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let volume = MasterVolume::new(settings.volume);

        let (snapshot_tx, snapshot_rx) = watch::channel(PlayerSnapshot::default());

        let engine = Self {
            lanes,
            lane_state: [LaneState::default(), LaneState::default()],
            active: LaneId::A,
            queue,
            state: PlaybackState::Idle,
            settings,
            volume,
            token: 0,
            manual: false,
            auto_advanced: false,
            pending: None,
            pending_swap: None,
            fade: None,
            warmed_for: None,
            last_progress: None,
            catalog: deps.catalog,
            cache: deps.cache,
            store: deps.store,
            msg_tx,
            snapshot_tx,
            events_tx: events_tx.clone(),
        };
        engine.publish();

        let handle = PlayerHandle {
            commands: cmd_tx,
            snapshot: snapshot_rx,
            events: events_tx,
        };
        let task = tokio::spawn(engine.run(cmd_rx, msg_rx, lane_events));

        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut msgs: mpsc::UnboundedReceiver<Msg>,
        mut lane_events: LaneEvents,
    ) {
        let mut tick = tokio::time::interval(MONITOR_TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(msg) = msgs.recv() => self.handle_msg(msg),
                event = lane_events.recv() => match event {
                    Some((lane, event)) => self.handle_lane_event(lane, event),
                    None => break,
                },
                _ = tick.tick() => self.handle_tick(),
            }
        }
        debug!("engine task exiting");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::PlayQueue {
                tracks,
                start_index,
            } => self.cmd_play_queue(tracks, start_index),
            Command::AddToQueue { track } => self.cmd_add_to_queue(track),
            Command::AddToQueueNext { track } => self.cmd_add_to_queue_next(track),
            Command::RemoveFromQueue { index } => self.cmd_remove_from_queue(index),
            Command::ReorderQueue { from, to } => self.cmd_reorder_queue(from, to),
            Command::JumpToTrack { index } => self.cmd_jump_to_track(index),
            Command::Next => self.cmd_next(),
            Command::Previous => self.cmd_previous(),
            Command::ToggleShuffle => self.cmd_toggle_shuffle(),
            Command::ToggleRepeat => self.cmd_toggle_repeat(),
            Command::ClearQueue => self.cmd_clear_queue(),
            Command::Play => self.cmd_play(),
            Command::Pause => self.cmd_pause(),
            Command::Resume => self.cmd_resume(),
            Command::Stop => self.cmd_stop(),
            Command::Seek { position } => self.cmd_seek(position),
            Command::SetVolume { level } => self.cmd_set_volume(level),
            Command::ToggleMute => self.cmd_toggle_mute(),
            Command::SetRate { rate } => self.cmd_set_rate(rate),
            Command::SetQuality { quality } => self.cmd_set_quality(quality),
            Command::SetCrossfade { length } => self.cmd_set_crossfade(length),
            Command::SetNormalization { enabled } => self.cmd_set_normalization(enabled),
            Command::Shutdown => {}
        }
    }

    // ===== Queue & navigation commands =====

    fn cmd_play_queue(&mut self, tracks: Vec<Track>, start_index: usize) {
        let mut valid = Vec::with_capacity(tracks.len());
        for track in tracks {
            match track.validate() {
                Ok(()) => valid.push(track),
                Err(error) => warn!(%error, "dropping invalid track from play_queue"),
            }
        }

        info!(tracks = valid.len(), start_index, "play queue");
        self.queue.replace(valid, start_index);
        self.publish_queue_changed();
        self.persist_queue();

        match self.queue.current_index() {
            Some(index) => self.begin_transition(index, true),
            None => self.stop_playback(true),
        }
    }

    fn cmd_add_to_queue(&mut self, track: Track) {
        if let Err(error) = track.validate() {
            warn!(%error, "rejecting invalid track");
            return;
        }
        self.queue.append(track);
        self.publish_queue_changed();
        self.persist_queue();
    }

    fn cmd_add_to_queue_next(&mut self, track: Track) {
        if let Err(error) = track.validate() {
            warn!(%error, "rejecting invalid track");
            return;
        }
        if self.queue.insert_next(track) {
            self.publish_queue_changed();
            self.persist_queue();
        }
    }

    fn cmd_remove_from_queue(&mut self, index: usize) {
        match self.queue.remove(index) {
            RemoveOutcome::OutOfRange => {}
            RemoveOutcome::Removed => {
                self.publish_queue_changed();
                self.persist_queue();
            }
            RemoveOutcome::CurrentRemoved { restart_at } => {
                self.publish_queue_changed();
                self.persist_queue();
                // While idle the selection just moves; nothing starts
                if self.state != PlaybackState::Idle {
                    match restart_at {
                        Some(next_index) => self.begin_transition(next_index, true),
                        None => self.stop_playback(true),
                    }
                }
            }
        }
    }

    fn cmd_reorder_queue(&mut self, from: usize, to: usize) {
        if self.queue.reorder(from, to) {
            self.publish_queue_changed();
            self.persist_queue();
        }
    }

    fn cmd_jump_to_track(&mut self, index: usize) {
        if self.queue.track_at(index).is_some() {
            self.begin_transition(index, true);
        }
    }

    fn cmd_next(&mut self) {
        match self.queue.peek_next_manual() {
            Some(index) => self.begin_transition(index, true),
            None => {
                if self.state != PlaybackState::Idle {
                    info!("skip past queue end");
                    self.stop_playback(true);
                }
            }
        }
    }

    fn cmd_previous(&mut self) {
        let position = self.lanes[self.active.index()].position();
        if position > PREVIOUS_RESTART_AFTER {
            self.lanes[self.active.index()].seek(Duration::ZERO);
            self.publish();
            return;
        }
        match self.queue.peek_previous() {
            Some(index) => self.begin_transition(index, true),
            None => {
                // First track: restart from the top
                self.lanes[self.active.index()].seek(Duration::ZERO);
                self.publish();
            }
        }
    }

    fn cmd_toggle_shuffle(&mut self) {
        let shuffled = self.queue.toggle_shuffle();
        debug!(shuffled, "shuffle toggled");
        self.publish_queue_changed();
        self.persist_queue();
    }

    fn cmd_toggle_repeat(&mut self) {
        let mode = self.queue.toggle_repeat();
        debug!(?mode, "repeat toggled");
        self.publish();
    }

    fn cmd_clear_queue(&mut self) {
        if self.state != PlaybackState::Idle {
            self.stop_playback(true);
        }
        self.queue.clear();
        self.publish_queue_changed();
        self.persist_queue();
    }

    // ===== Transport commands =====

    fn cmd_play(&mut self) {
        match self.state {
            PlaybackState::Paused => self.resume_active(),
            PlaybackState::Idle => {
                let target = match self.queue.current_index() {
                    Some(index) => Some(index),
                    None if !self.queue.is_empty() => Some(0),
                    None => None,
                };
                if let Some(index) = target {
                    self.begin_transition(index, true);
                }
            }
            PlaybackState::Playing | PlaybackState::Loading => {}
        }
    }

    fn cmd_pause(&mut self) {
        if self.state != PlaybackState::Playing {
            return;
        }
        // Pausing mid-crossfade snaps the fade to its end state first so
        // the outgoing lane does not keep sounding under a paused transport
        self.finish_fade_early();
        self.lanes[self.active.index()].pause();
        self.set_state(PlaybackState::Paused);
        self.publish();
        // One progress report so the backend sees the pause
        self.report_progress_now(true);
    }

    fn cmd_resume(&mut self) {
        if self.state == PlaybackState::Paused {
            self.resume_active();
        }
    }

    fn resume_active(&mut self) {
        self.lanes[self.active.index()].play();
        self.set_state(PlaybackState::Playing);
        self.publish();
    }

    fn cmd_stop(&mut self) {
        info!("stop");
        self.stop_playback(true);
    }

    fn cmd_seek(&mut self, position: Duration) {
        if self.current_track().is_none() {
            return;
        }
        let clamped = match self.effective_duration() {
            Some(duration) => position.min(duration.saturating_sub(SEEK_END_GUARD)),
            None => position,
        };
        debug!(?clamped, "seek");
        self.lanes[self.active.index()].seek(clamped);
        self.publish();
    }

    fn cmd_set_volume(&mut self, level: u8) {
        self.volume.set_level(level);
        self.settings.volume = self.volume.level();
        self.apply_gains();
        self.publish();
        self.persist_settings();
    }

    fn cmd_toggle_mute(&mut self) {
        let muted = self.volume.toggle_mute();
        debug!(muted, "mute toggled");
        self.apply_gains();
        self.publish();
    }

    fn cmd_set_rate(&mut self, rate: f64) {
        self.settings.rate = rate.clamp(MIN_RATE, MAX_RATE);
        for lane in &mut self.lanes {
            lane.set_rate(self.settings.rate);
        }
        self.publish();
        self.persist_settings();
    }

    fn cmd_set_quality(&mut self, quality: QualityPreference) {
        if self.settings.quality == quality {
            return;
        }
        info!(quality = quality.as_str(), "quality changed");
        self.settings.quality = quality;
        self.publish();
        self.persist_settings();

        let mid_playback = matches!(self.state, PlaybackState::Playing | PlaybackState::Paused);
        if mid_playback && self.current_track().is_some() {
            self.begin_quality_swap();
        }
    }

    fn cmd_set_crossfade(&mut self, length: Duration) {
        self.settings.crossfade = length.min(MAX_CROSSFADE);
        self.publish();
        self.persist_settings();
    }

    fn cmd_set_normalization(&mut self, enabled: bool) {
        self.settings.normalization = enabled;
        self.publish();
        self.persist_settings();
    }

    // ===== Shared helpers =====

    pub(crate) fn current_track(&self) -> Option<&Track> {
        self.lane_state[self.active.index()].track.as_ref()
    }

    /// Halt output on both lanes and return to Idle.
    ///
    /// Supersedes any in-flight transition via the token. The queue and
    /// cursor survive so a later `play` resumes the selection.
    pub(crate) fn stop_playback(&mut self, report: bool) {
        self.token += 1;
        self.pending = None;
        self.pending_swap = None;
        self.fade = None;
        self.manual = false;
        self.auto_advanced = false;
        self.warmed_for = None;
        self.last_progress = None;

        if report {
            if let Some(track) = self.current_track() {
                let position = self.lanes[self.active.index()].position();
                let report = PlaybackReport::new(
                    track.id.clone(),
                    position.as_secs_f64(),
                    self.effective_duration().map(|d| d.as_secs_f64()),
                    false,
                );
                self.spawn_report_stopped(report);
            }
        }

        for lane in &mut self.lanes {
            lane.pause();
            lane.set_gain(0.0);
            lane.unload();
        }
        for state in &mut self.lane_state {
            state.clear();
        }

        self.set_state(PlaybackState::Idle);
        self.publish();
    }

    pub(crate) fn set_state(&mut self, state: PlaybackState) {
        if self.state != state {
            info!(?state, "transport state");
            self.state = state;
            self.emit(PlayerEvent::StateChanged { state });
        }
    }

    /// Re-apply master volume to both lanes' current pre-master gains.
    pub(crate) fn apply_gains(&mut self) {
        let master = self.volume.gain();
        for id in [LaneId::A, LaneId::B] {
            let gain = self.lane_state[id.index()].gain * master;
            self.lanes[id.index()].set_gain(gain);
        }
    }

    pub(crate) fn emit(&self, event: PlayerEvent) {
        // Nobody listening is fine
        let _ = self.events_tx.send(event);
    }

    pub(crate) fn publish(&self) {
        let snapshot = PlayerSnapshot {
            current_track: self.current_track().cloned(),
            state: self.state,
            position: self.lanes[self.active.index()].position(),
            duration: self.effective_duration(),
            queue: self.queue.tracks().to_vec(),
            current_index: self.queue.current_index(),
            repeat: self.queue.repeat(),
            shuffled: self.queue.is_shuffled(),
            volume: self.volume.level(),
            muted: self.volume.is_muted(),
            rate: self.settings.rate,
            quality: self.settings.quality,
            crossfade: self.settings.crossfade,
        };
        let _ = self.snapshot_tx.send(snapshot);
    }

    pub(crate) fn publish_queue_changed(&self) {
        self.emit(PlayerEvent::QueueChanged {
            length: self.queue.len(),
            current_index: self.queue.current_index(),
        });
        self.publish();
    }

    // ===== Persistence (fire-and-forget) =====

    pub(crate) fn persist_settings(&self) {
        let store = Arc::clone(&self.store);
        let settings = self.settings.clone();
        tokio::spawn(async move {
            if let Err(error) = store.save_settings(&settings).await {
                warn!(%error, "failed to persist settings");
            }
        });
    }

    pub(crate) fn persist_queue(&self) {
        let store = Arc::clone(&self.store);
        let snapshot = self.queue.snapshot();
        tokio::spawn(async move {
            if let Err(error) = store.save_queue_snapshot(&snapshot).await {
                warn!(%error, "failed to persist queue snapshot");
            }
        });
    }

    // ===== Telemetry (fire-and-forget) =====

    pub(crate) fn spawn_report_started(&self, report: PlaybackReport) {
        let catalog = Arc::clone(&self.catalog);
        tokio::spawn(async move {
            if let Err(error) = catalog.report_started(report).await {
                warn!(%error, "playback start report failed");
            }
        });
    }

    pub(crate) fn spawn_report_progress(&self, report: PlaybackReport) {
        let catalog = Arc::clone(&self.catalog);
        tokio::spawn(async move {
            if let Err(error) = catalog.report_progress(report).await {
                warn!(%error, "progress report failed");
            }
        });
    }

    pub(crate) fn spawn_report_stopped(&self, report: PlaybackReport) {
        let catalog = Arc::clone(&self.catalog);
        tokio::spawn(async move {
            if let Err(error) = catalog.report_stopped(report).await {
                warn!(%error, "stop report failed");
            }
        });
    }

    /// Send one progress report immediately, outside the tick cadence.
    pub(crate) fn report_progress_now(&mut self, is_paused: bool) {
        if let Some(track) = self.current_track() {
            let position = self.lanes[self.active.index()].position();
            let report = PlaybackReport::new(
                track.id.clone(),
                position.as_secs_f64(),
                self.effective_duration().map(|d| d.as_secs_f64()),
                is_paused,
            );
            self.spawn_report_progress(report);
            self.last_progress = Some(Instant::now());
        }
    }
}
