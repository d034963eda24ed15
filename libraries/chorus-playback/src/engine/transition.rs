//! Transition lifecycle: request, resolve, confirm, commit
//!
//! A transition runs in three stages. [`PlaybackEngine::begin_transition`]
//! bumps the token and spawns source resolution off the dispatcher. The
//! resolved source binds the idle lane and asks it to play. The lane's
//! `Started` confirmation commits the switch: the active lane flips, the
//! queue cursor moves, and any crossfade begins.
//!
//! The cursor only moves at commit, so a transition that dies anywhere
//! along the way (resolution failure, lane error, supersession by a newer
//! token) leaves the previous selection intact. Every stage re-validates
//! its target against the live queue by track id, because the queue is
//! free to mutate between stages.

use super::{ActiveFade, Msg, PendingSwap, PendingTransition, PlaybackEngine};
use crate::backend::{resolve_playable_source, PlaybackReport, ResolvedSource};
use crate::events::PlayerEvent;
use crate::fade::{effective_fade, FadePlan, MIN_FADE};
use crate::lane::{AudioLane, LaneEvent, LaneId};
use crate::normalization::normalization_scalar;
use crate::types::{PlaybackState, Track, TrackId};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

impl<L: AudioLane> PlaybackEngine<L> {
    pub(crate) fn handle_msg(&mut self, msg: Msg) {
        match msg {
            Msg::SourceReady {
                token,
                target_index,
                track,
                source,
                scalar,
            } => self.handle_source_ready(token, target_index, track, source, scalar),
            Msg::SourceFailed {
                token,
                track_id,
                error,
            } => self.handle_source_failed(token, &track_id, error),
            Msg::SwapReady { token, source } => self.handle_swap_ready(token, &source),
            Msg::SwapFailed { token, error } => self.handle_swap_failed(token, error),
        }
    }

    pub(crate) fn handle_lane_event(&mut self, lane: LaneId, event: LaneEvent) {
        match event {
            LaneEvent::Started => self.handle_started(lane),
            LaneEvent::Ended => self.handle_ended(lane),
            LaneEvent::Error(message) => self.handle_lane_error(lane, message),
        }
    }

    /// Start switching playback to `target_index`.
    ///
    /// Supersedes any transition or quality swap still in flight. `manual`
    /// marks a user-initiated switch, which hard-cuts instead of fading.
    pub(crate) fn begin_transition(&mut self, target_index: usize, manual: bool) {
        let Some(track) = self.queue.track_at(target_index).cloned() else {
            return;
        };

        self.token += 1;
        let token = self.token;
        self.pending = None;
        self.pending_swap = None;
        self.manual = manual;

        if self.state == PlaybackState::Idle {
            self.set_state(PlaybackState::Loading);
            self.publish();
        }

        info!(track = %track.id, target_index, manual, "transition requested");

        let catalog = Arc::clone(&self.catalog);
        let cache = Arc::clone(&self.cache);
        let msg_tx = self.msg_tx.clone();
        let quality = self.settings.quality;
        let normalization = self.settings.normalization;

        tokio::spawn(async move {
            let source = match resolve_playable_source(
                cache.as_ref(),
                catalog.as_ref(),
                &track.id,
                quality,
            )
            .await
            {
                Ok(source) => source,
                Err(error) => {
                    let _ = msg_tx.send(Msg::SourceFailed {
                        token,
                        track_id: track.id.clone(),
                        error: error.to_string(),
                    });
                    return;
                }
            };

            // Loudness is best-effort; anything missing means neutral gain
            let loudness = if normalization {
                match catalog.fetch_loudness(&track.id).await {
                    Ok(info) => info,
                    Err(error) => {
                        warn!(track = %track.id, %error, "loudness lookup failed");
                        None
                    }
                }
            } else {
                None
            };
            let scalar = normalization_scalar(loudness.as_ref());

            let _ = msg_tx.send(Msg::SourceReady {
                token,
                target_index,
                track: Box::new(track),
                source,
                scalar,
            });
        });
    }

    fn handle_source_ready(
        &mut self,
        token: u64,
        target_index: usize,
        track: Box<Track>,
        source: ResolvedSource,
        scalar: f64,
    ) {
        if token != self.token {
            debug!(track = %track.id, "stale source resolution, dropping");
            return;
        }
        let track = *track;

        // The queue may have mutated while we were resolving
        let target_index = if self
            .queue
            .track_at(target_index)
            .is_some_and(|t| t.id == track.id)
        {
            target_index
        } else if let Some(found) = self.queue.index_of(&track.id) {
            found
        } else {
            debug!(track = %track.id, "target vanished during resolution");
            if self.state == PlaybackState::Loading {
                self.set_state(PlaybackState::Idle);
                self.publish();
            }
            return;
        };

        // A fade still in progress holds the lane we are about to reuse
        self.fade = None;

        let incoming = self.active.other();
        let idx = incoming.index();
        let url = source.url().to_string();

        self.lanes[idx].pause();
        self.lanes[idx].unload();
        self.lanes[idx].load(&url);
        self.lanes[idx].set_rate(self.settings.rate);

        let remaining = self.remaining_on_active();
        let window = effective_fade(self.settings.crossfade, remaining);
        let cut = self.manual
            || self.state != PlaybackState::Playing
            || self.current_track().is_none()
            || window < MIN_FADE;

        if cut {
            // Manual switches silence the outgoing side immediately; the
            // incoming lane comes up at its full normalization gain
            self.silence_lane(self.active);
            self.lane_state[idx].gain = scalar;
            self.lanes[idx].set_gain(scalar * self.volume.gain());
        } else {
            // Crossfade path: start silent, the monitor ramps it up
            self.lane_state[idx].gain = 0.0;
            self.lanes[idx].set_gain(0.0);
        }
        self.lane_state[idx].track = Some(track.clone());
        self.lane_state[idx].url = Some(url);
        self.lane_state[idx].scalar = scalar;

        debug!(
            track = %track.id,
            lane = %incoming,
            local = source.is_local(),
            cut,
            "source ready, starting lane"
        );
        self.lanes[idx].play();

        self.pending = Some(PendingTransition {
            token,
            target_index,
            track,
            scalar,
            cut,
            lane: incoming,
            retried: false,
        });
    }

    fn handle_source_failed(&mut self, token: u64, track_id: &TrackId, error: String) {
        if token != self.token {
            debug!(%track_id, "stale resolution failure, dropping");
            return;
        }
        warn!(%track_id, %error, "source resolution failed");
        self.emit(PlayerEvent::PlaybackError { message: error });

        // No lane was touched yet: whatever was playing keeps playing and
        // the cursor stays on it
        if self.state == PlaybackState::Loading {
            self.set_state(PlaybackState::Idle);
        } else if self.state == PlaybackState::Playing
            && self.remaining_on_active().is_some_and(|r| r.is_zero())
        {
            // The advance failed after the old track already ran out
            self.stop_playback(false);
            return;
        }
        self.publish();
    }

    fn handle_started(&mut self, lane: LaneId) {
        if let Some(swap) = self.pending_swap.take() {
            if lane == self.active && swap.token == self.token {
                debug!(%lane, "quality swap confirmed");
                self.publish();
                return;
            }
            self.pending_swap = Some(swap);
        }

        match self.pending.take() {
            Some(pending) if pending.lane == lane && pending.token == self.token => {
                self.commit_transition(pending);
            }
            Some(pending) => {
                self.pending = Some(pending);
                if lane != self.active {
                    self.silence_lane(lane);
                }
            }
            None => {
                // Start confirmations also follow resume and replay; only
                // a stray start on a non-active lane needs muting
                if lane != self.active {
                    self.silence_lane(lane);
                }
            }
        }
    }

    /// The incoming lane confirmed playback: flip lanes, move the cursor,
    /// begin the fade if one applies.
    fn commit_transition(&mut self, pending: PendingTransition) {
        // The queue may have shifted again while the lane confirmed
        let index = if self
            .queue
            .track_at(pending.target_index)
            .is_some_and(|t| t.id == pending.track.id)
        {
            pending.target_index
        } else if let Some(found) = self.queue.index_of(&pending.track.id) {
            found
        } else {
            debug!(track = %pending.track.id, "target vanished before start commit");
            self.abandon_transition(&pending);
            return;
        };

        let outgoing = self.active;
        let incoming = pending.lane;
        let previous = self.lane_state[outgoing.index()]
            .track
            .as_ref()
            .map(|t| t.id.clone());

        let mut fade_len = Duration::ZERO;
        if pending.cut {
            // Outgoing was silenced when the cut was accepted; release it
            self.lanes[outgoing.index()].unload();
            self.lane_state[outgoing.index()].clear();
        } else {
            let remaining = self.remaining_on_active();
            let len = effective_fade(self.settings.crossfade, remaining);
            if len >= MIN_FADE && previous.is_some() {
                let plan =
                    FadePlan::new(len, pending.scalar, self.lane_state[outgoing.index()].gain);
                self.fade = Some(ActiveFade {
                    plan,
                    started_at: Instant::now(),
                    incoming,
                });
                fade_len = len;
            } else {
                // The fade window closed while the lane was confirming
                self.silence_lane(outgoing);
                self.lanes[outgoing.index()].unload();
                self.lane_state[outgoing.index()].clear();
                self.lane_state[incoming.index()].gain = pending.scalar;
                let gain = pending.scalar * self.volume.gain();
                self.lanes[incoming.index()].set_gain(gain);
            }
        }

        self.active = incoming;
        self.queue.set_current(index);
        self.manual = false;
        self.auto_advanced = false;
        self.warmed_for = None;

        info!(track = %pending.track.id, index, fade = ?fade_len, "track started");
        self.emit(PlayerEvent::TransitionStarted {
            from: previous.clone(),
            to: pending.track.id.clone(),
            fade: fade_len,
        });
        self.set_state(PlaybackState::Playing);
        self.emit(PlayerEvent::TrackChanged {
            track: Box::new(pending.track.clone()),
            previous,
        });
        if fade_len.is_zero() {
            self.emit(PlayerEvent::TransitionCompleted {
                track: pending.track.id.clone(),
            });
        }

        let report = PlaybackReport::new(
            pending.track.id.clone(),
            0.0,
            self.effective_duration().map(|d| d.as_secs_f64()),
            false,
        );
        self.spawn_report_started(report);
        self.last_progress = Some(Instant::now());

        self.publish();
        self.persist_queue();
    }

    /// Give up on a pending transition, leaving whatever played before it
    /// exactly as it was.
    fn abandon_transition(&mut self, pending: &PendingTransition) {
        let idx = pending.lane.index();
        self.lanes[idx].pause();
        self.lanes[idx].set_gain(0.0);
        self.lanes[idx].unload();
        self.lane_state[idx].clear();
        // A failed automatic advance must not gate the monitor's next one
        self.auto_advanced = false;

        if self.lane_state[self.active.index()].track.is_some() {
            if self.state == PlaybackState::Playing
                && self.remaining_on_active().is_some_and(|r| r.is_zero())
            {
                // The outgoing track ran out while the transition was
                // failing; there is nothing left to keep playing
                self.stop_playback(false);
                return;
            }
            if pending.cut {
                // The cut silenced the outgoing lane; bring it back in
                // the transport state it had before the switch
                let gain = self.lane_state[self.active.index()].gain * self.volume.gain();
                self.lanes[self.active.index()].set_gain(gain);
                if self.state == PlaybackState::Playing {
                    self.lanes[self.active.index()].play();
                }
            }
            // Fade path: the outgoing lane never stopped, stay as we were
        } else {
            self.set_state(PlaybackState::Idle);
        }
        self.publish();
    }

    fn handle_lane_error(&mut self, lane: LaneId, message: String) {
        if let Some(mut pending) = self.pending.take() {
            if pending.lane == lane {
                if pending.retried {
                    error!(%lane, %message, "lane failed to start after retry");
                    self.emit(PlayerEvent::PlaybackError { message });
                    self.abandon_transition(&pending);
                } else {
                    warn!(%lane, %message, "lane failed to start, retrying once");
                    pending.retried = true;
                    self.lanes[lane.index()].play();
                    self.pending = Some(pending);
                }
                return;
            }
            self.pending = Some(pending);
        }

        if let Some(mut swap) = self.pending_swap.take() {
            if lane == self.active {
                if swap.retried {
                    error!(%lane, %message, "quality swap failed after retry");
                    self.emit(PlayerEvent::PlaybackError { message });
                    self.lanes[lane.index()].pause();
                    self.set_state(PlaybackState::Paused);
                    self.publish();
                } else {
                    warn!(%lane, %message, "quality swap start failed, retrying once");
                    swap.retried = true;
                    self.lanes[lane.index()].play();
                    self.pending_swap = Some(swap);
                }
                return;
            }
            self.pending_swap = Some(swap);
        }

        if lane == self.active && self.state == PlaybackState::Playing {
            warn!(%lane, %message, "active lane error, pausing");
            self.emit(PlayerEvent::PlaybackError { message });
            self.finish_fade_early();
            self.lanes[lane.index()].pause();
            self.set_state(PlaybackState::Paused);
            self.publish();
        } else if lane != self.active {
            debug!(%lane, %message, "inactive lane error");
            self.silence_lane(lane);
        }
    }

    /// Re-resolve the current track at the new quality and reload it in
    /// place on the active lane, preserving position and pause state.
    pub(crate) fn begin_quality_swap(&mut self) {
        let Some(track_id) = self.current_track().map(|t| t.id.clone()) else {
            return;
        };

        self.token += 1;
        let token = self.token;
        self.pending = None;
        self.finish_fade_early();

        let position = self.lanes[self.active.index()].position();
        info!(%track_id, ?position, state = ?self.state, "quality swap started");

        self.pending_swap = Some(PendingSwap {
            token,
            position,
            retried: false,
        });
        self.spawn_swap_resolution(token, track_id);
    }

    fn spawn_swap_resolution(&self, token: u64, track_id: TrackId) {
        let catalog = Arc::clone(&self.catalog);
        let cache = Arc::clone(&self.cache);
        let msg_tx = self.msg_tx.clone();
        let quality = self.settings.quality;

        tokio::spawn(async move {
            match resolve_playable_source(cache.as_ref(), catalog.as_ref(), &track_id, quality)
                .await
            {
                Ok(source) => {
                    let _ = msg_tx.send(Msg::SwapReady { token, source });
                }
                Err(error) => {
                    let _ = msg_tx.send(Msg::SwapFailed {
                        token,
                        error: error.to_string(),
                    });
                }
            }
        });
    }

    fn handle_swap_ready(&mut self, token: u64, source: &ResolvedSource) {
        if token != self.token {
            debug!("stale quality swap, dropping");
            return;
        }
        let Some(mut swap) = self.pending_swap.take() else {
            return;
        };

        let lane = self.active;
        let idx = lane.index();

        // Prefer the live position: the old stream kept playing while the
        // new one resolved
        let live = self.lanes[idx].position();
        let position = if live.is_zero() { swap.position } else { live };
        let url = source.url().to_string();
        debug!(%lane, ?position, "swapping stream in place");

        self.lanes[idx].load(&url);
        self.lanes[idx].set_rate(self.settings.rate);
        self.lanes[idx].seek(position);
        let gain = self.lane_state[idx].gain * self.volume.gain();
        self.lanes[idx].set_gain(gain);
        self.lane_state[idx].url = Some(url);

        // The transport state decides, not a snapshot from swap start: a
        // pause issued while the new stream resolved must hold
        if self.state == PlaybackState::Playing {
            self.lanes[idx].play();
            swap.position = position;
            self.pending_swap = Some(swap);
        } else {
            self.publish();
        }
    }

    fn handle_swap_failed(&mut self, token: u64, error: String) {
        if token != self.token {
            return;
        }
        match self.pending_swap.take() {
            Some(mut swap) if !swap.retried => {
                warn!(%error, "quality swap resolution failed, retrying");
                swap.retried = true;
                if let Some(track_id) = self.current_track().map(|t| t.id.clone()) {
                    self.pending_swap = Some(swap);
                    self.spawn_swap_resolution(token, track_id);
                }
            }
            Some(_) => {
                // The old stream was never touched; keep playing it
                warn!(%error, "quality swap failed, keeping the current stream");
                self.emit(PlayerEvent::PlaybackError { message: error });
            }
            None => {}
        }
    }

    pub(crate) fn silence_lane(&mut self, lane: LaneId) {
        let idx = lane.index();
        self.lanes[idx].pause();
        self.lanes[idx].set_gain(0.0);
    }
}
