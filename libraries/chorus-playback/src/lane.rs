//! Platform-agnostic playback lanes
//!
//! A lane is one of the two interchangeable output slots the engine fades
//! between. Implementations wrap whatever the platform plays media with
//! (a media element, a streaming pipeline); the engine only ever talks to
//! this trait, which keeps the core free of device and codec concerns.

use std::time::Duration;
use tokio::sync::mpsc;

/// Identifies one of the two playback lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneId {
    A,
    B,
}

impl LaneId {
    /// The opposite lane.
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Index into the engine's two-lane array.
    pub(crate) fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl std::fmt::Display for LaneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::B => f.write_str("B"),
        }
    }
}

/// Asynchronous reports from a lane back to the engine
///
/// Control methods on [`AudioLane`] are requests; outcomes that depend on
/// buffering or the output device arrive as events on the lane channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaneEvent {
    /// A start request was accepted and output is audible
    Started,

    /// The loaded source reached its natural end
    Ended,

    /// Loading or starting failed
    Error(String),
}

/// Sender half lanes use to report events, tagged with their id
pub type LaneEventSender = mpsc::UnboundedSender<(LaneId, LaneEvent)>;

/// Receiver half the engine consumes
pub type LaneEvents = mpsc::UnboundedReceiver<(LaneId, LaneEvent)>;

/// Channel pair wiring two lanes to one engine.
pub fn lane_event_channel() -> (LaneEventSender, LaneEvents) {
    mpsc::unbounded_channel()
}

/// One playback output slot
///
/// Contract:
/// - `load` begins fetching/buffering a source and implicitly discards
///   whatever was loaded before. It must not start output.
/// - `play` requests output; the lane confirms with [`LaneEvent::Started`]
///   once audio is actually running, or reports [`LaneEvent::Error`].
///   The engine issues at most one retry after an error.
/// - `pause`, `set_gain`, `set_rate` and `seek` apply immediately and
///   must be cheap; they are called from the engine's dispatch loop.
/// - [`LaneEvent::Ended`] fires exactly once per loaded source when it
///   plays to completion.
pub trait AudioLane: Send + 'static {
    /// Begin loading `url`, replacing any bound source.
    fn load(&mut self, url: &str);

    /// Request playback of the loaded source.
    fn play(&mut self);

    /// Halt output, keeping the source and position.
    fn pause(&mut self);

    /// Drop the bound source entirely.
    fn unload(&mut self);

    /// Set the lane gain (linear, `0.0` = silence). Values above 1.0 are
    /// legal when normalization boosts a quiet track.
    fn set_gain(&mut self, gain: f64);

    /// Set the playback rate multiplier.
    fn set_rate(&mut self, rate: f64);

    /// Jump to `position` in the loaded source.
    fn seek(&mut self, position: Duration);

    /// Current playback position.
    fn position(&self) -> Duration;

    /// Duration reported by the loaded source, once known.
    fn duration(&self) -> Option<Duration>;

    /// Furthest buffered/seekable extent, when the platform exposes it.
    fn buffered_to(&self) -> Option<Duration>;
}
