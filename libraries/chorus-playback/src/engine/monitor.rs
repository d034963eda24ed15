//! Playback monitor: the engine's heartbeat
//!
//! Each tick samples the active crossfade, checks whether the next track
//! should start coming in, warms up the upcoming source, and reports
//! coarse progress to the catalog. Natural end-of-track handling lives
//! here too, since it is the other trigger for an automatic advance.

use super::{
    PlaybackEngine, PREFETCH_WINDOW, PROGRESS_FLOOR, PROGRESS_INTERVAL, WARM_UP_TIMEOUT,
};
use crate::backend::{BackendError, CatalogBackend, PlaybackReport};
use crate::events::PlayerEvent;
use crate::fade::{lead_for, MIN_FADE};
use crate::lane::{AudioLane, LaneId};
use crate::queue::AutoAdvance;
use crate::types::{PlaybackState, QualityPreference, TrackId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl<L: AudioLane> PlaybackEngine<L> {
    pub(crate) fn handle_tick(&mut self) {
        self.advance_fade();

        if self.state != PlaybackState::Playing {
            return;
        }

        let remaining = self.remaining_on_active();
        self.check_auto_advance(remaining);
        self.check_warm_up(remaining);
        self.check_progress_report(remaining);
        self.publish();
    }

    /// Track length used for gating: the lane's own notion first, then
    /// however far the buffer reaches, then catalog metadata.
    pub(crate) fn effective_duration(&self) -> Option<Duration> {
        let lane = &self.lanes[self.active.index()];
        lane.duration()
            .or_else(|| lane.buffered_to())
            .or_else(|| self.current_track().and_then(|t| t.duration))
    }

    pub(crate) fn remaining_on_active(&self) -> Option<Duration> {
        let duration = self.effective_duration()?;
        let position = self.lanes[self.active.index()].position();
        Some(duration.saturating_sub(position))
    }

    fn advance_fade(&mut self) {
        let Some(fade) = &self.fade else { return };
        let elapsed = fade.started_at.elapsed();
        let gains = fade.plan.gains_at(elapsed);
        let incoming = fade.incoming;
        let outgoing = incoming.other();

        let master = self.volume.gain();
        self.lane_state[incoming.index()].gain = gains.incoming;
        self.lane_state[outgoing.index()].gain = gains.outgoing;
        self.lanes[incoming.index()].set_gain(gains.incoming * master);
        self.lanes[outgoing.index()].set_gain(gains.outgoing * master);

        if gains.complete {
            self.fade = None;
            self.lanes[outgoing.index()].pause();
            self.lanes[outgoing.index()].unload();
            self.lane_state[outgoing.index()].clear();
            if let Some(track) = self.lane_state[incoming.index()].track.as_ref() {
                let track = track.id.clone();
                self.emit(PlayerEvent::TransitionCompleted { track });
            }
            debug!(%incoming, "crossfade complete");
        }
    }

    /// Snap an in-progress fade to its end state: incoming at full target,
    /// outgoing silenced and released.
    pub(crate) fn finish_fade_early(&mut self) {
        let Some(fade) = self.fade.take() else { return };
        let incoming = fade.incoming;
        let outgoing = incoming.other();
        let target = fade.plan.gains_at(fade.plan.total());
        let master = self.volume.gain();

        self.lane_state[incoming.index()].gain = target.incoming;
        self.lanes[incoming.index()].set_gain(target.incoming * master);
        self.lane_state[outgoing.index()].gain = 0.0;
        self.lanes[outgoing.index()].pause();
        self.lanes[outgoing.index()].set_gain(0.0);
        self.lanes[outgoing.index()].unload();
        self.lane_state[outgoing.index()].clear();

        if let Some(track) = self.lane_state[incoming.index()].track.as_ref() {
            let track = track.id.clone();
            self.emit(PlayerEvent::TransitionCompleted { track });
        }
        debug!(%incoming, "crossfade finished early");
    }

    /// Crossfades start before the track ends; a hard gapless advance
    /// waits for the lane's `Ended` instead.
    fn check_auto_advance(&mut self, remaining: Option<Duration>) {
        if self.auto_advanced || self.manual || self.pending.is_some() || self.fade.is_some() {
            return;
        }
        if self.settings.crossfade < MIN_FADE {
            return;
        }
        let Some(remaining) = remaining else { return };
        let window = self.settings.crossfade + lead_for(self.settings.crossfade);
        if remaining > window {
            return;
        }
        if let AutoAdvance::Next(next_index) = self.queue.peek_auto_advance() {
            debug!(next_index, ?remaining, "auto-advance window reached");
            self.auto_advanced = true;
            self.begin_transition(next_index, false);
        }
    }

    /// One-shot connection warm-up for the upcoming track, never retried
    /// within the same track.
    fn check_warm_up(&mut self, remaining: Option<Duration>) {
        if self.pending.is_some() {
            return;
        }
        let Some(remaining) = remaining else { return };
        let AutoAdvance::Next(next_index) = self.queue.peek_auto_advance() else {
            return;
        };
        let Some(upcoming) = self.queue.track_at(next_index) else {
            return;
        };
        if self.warmed_for.as_ref() == Some(&upcoming.id) {
            return;
        }
        let fade_window = self.settings.crossfade + lead_for(self.settings.crossfade);
        if remaining > fade_window.max(PREFETCH_WINDOW) {
            return;
        }

        let track_id = upcoming.id.clone();
        self.warmed_for = Some(track_id.clone());

        let catalog = Arc::clone(&self.catalog);
        let cache = Arc::clone(&self.cache);
        let quality = self.settings.quality;
        tokio::spawn(async move {
            // Local files need no connection warm-up
            if cache.resolve_local_url(&track_id).await.is_some() {
                return;
            }
            let outcome = tokio::time::timeout(
                WARM_UP_TIMEOUT,
                warm_up_remote(catalog, track_id.clone(), quality),
            )
            .await;
            match outcome {
                Ok(Ok(())) => debug!(%track_id, "upcoming track warmed up"),
                Ok(Err(error)) => warn!(%track_id, %error, "warm-up failed"),
                Err(_) => warn!(%track_id, "warm-up timed out"),
            }
        });
    }

    fn check_progress_report(&mut self, remaining: Option<Duration>) {
        if self.current_track().is_none() {
            return;
        }
        let due = match self.last_progress {
            None => true,
            Some(last) => {
                let since = last.elapsed();
                since >= PROGRESS_INTERVAL
                    || (remaining.is_some_and(|r| r <= PROGRESS_INTERVAL)
                        && since >= PROGRESS_FLOOR)
            }
        };
        if due {
            self.report_progress_now(false);
        }
    }

    pub(crate) fn handle_ended(&mut self, lane: LaneId) {
        // Outgoing side of a fade ran out before the ramp finished
        if let Some(fade) = &self.fade {
            if fade.incoming.other() == lane {
                debug!(%lane, "outgoing track ended mid-fade");
                self.finish_fade_early();
                return;
            }
        }

        if lane != self.active {
            debug!(%lane, "stray end on inactive lane");
            self.silence_lane(lane);
            self.lanes[lane.index()].unload();
            self.lane_state[lane.index()].clear();
            return;
        }

        // An in-flight transition will take over when its lane confirms
        if self.pending.is_some() {
            debug!(%lane, "active lane ended with a transition in flight");
            return;
        }

        match self.queue.peek_auto_advance() {
            AutoAdvance::Replay => {
                debug!("repeat-one, replaying current track");
                let idx = self.active.index();
                self.lanes[idx].seek(Duration::ZERO);
                self.lanes[idx].play();
                if let Some(track) = self.current_track() {
                    let report = PlaybackReport::new(
                        track.id.clone(),
                        0.0,
                        self.effective_duration().map(|d| d.as_secs_f64()),
                        false,
                    );
                    self.spawn_report_started(report);
                }
                self.last_progress = Some(Instant::now());
                self.publish();
            }
            AutoAdvance::Next(next_index) => {
                debug!(next_index, "track ended, advancing");
                self.begin_transition(next_index, false);
            }
            AutoAdvance::Exhausted => {
                info!("queue exhausted");
                self.stop_playback(true);
            }
        }
    }
}

async fn warm_up_remote(
    catalog: Arc<dyn CatalogBackend>,
    track_id: TrackId,
    quality: QualityPreference,
) -> Result<(), BackendError> {
    let url = catalog.resolve_stream_url(&track_id, quality).await?;
    catalog.warm_up(&url).await
}
