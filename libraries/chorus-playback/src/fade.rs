//! Equal-power crossfade envelope
//!
//! Pure time-to-gain math: the engine samples a [`FadePlan`] on its tick
//! and writes the resulting gains to the lanes. Gains here are pre-master
//! values; the engine multiplies in the master volume when applying.
//!
//! The incoming side ramps `sin(theta)` up to the track's normalization
//! scalar, the outgoing side ramps `cos(theta)` down from its last gain,
//! theta running 0..pi/2 across the fade. The outgoing ramp starts after
//! a short lead so both tracks are audible together, and because
//! `sin^2 + cos^2 = 1` the summed power stays flat through the overlap.

use std::f64::consts::FRAC_PI_2;
use std::time::Duration;

/// Upper bound on the outgoing ramp's lead offset
pub const MAX_LEAD: Duration = Duration::from_millis(100);

/// Lead offset as a fraction of the fade length
pub const LEAD_FRACTION: f64 = 0.1;

/// Fades shorter than this are treated as a hard cut
pub const MIN_FADE: Duration = Duration::from_millis(50);

/// Lead offset for a fade: `min(0.1s, 10% of fade)`.
pub fn lead_for(fade: Duration) -> Duration {
    fade.mul_f64(LEAD_FRACTION).min(MAX_LEAD)
}

/// Effective fade length when a transition starts late: the configured
/// length, shortened to whatever time remains on the outgoing track.
pub fn effective_fade(configured: Duration, remaining: Option<Duration>) -> Duration {
    match remaining {
        Some(remaining) => configured.min(remaining),
        None => configured,
    }
}

/// Gains for both sides of a fade at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeGains {
    /// Incoming lane gain (pre-master)
    pub incoming: f64,

    /// Outgoing lane gain (pre-master)
    pub outgoing: f64,

    /// Both ramps have finished; the outgoing lane can be paused
    pub complete: bool,
}

/// One scheduled crossfade between the two lanes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadePlan {
    duration: Duration,
    lead: Duration,

    /// Normalization scalar the incoming lane ramps up to
    incoming_target: f64,

    /// Gain the outgoing lane rings down from
    outgoing_start: f64,
}

impl FadePlan {
    pub fn new(duration: Duration, incoming_target: f64, outgoing_start: f64) -> Self {
        Self {
            duration,
            lead: lead_for(duration),
            incoming_target,
            outgoing_start,
        }
    }

    /// Total wall time until the outgoing ramp finishes.
    pub fn total(&self) -> Duration {
        self.duration + self.lead
    }

    /// Sample both gain curves at `elapsed` since the fade began.
    pub fn gains_at(&self, elapsed: Duration) -> FadeGains {
        let incoming = if elapsed >= self.duration {
            self.incoming_target
        } else {
            let theta = FRAC_PI_2 * (elapsed.as_secs_f64() / self.duration.as_secs_f64());
            theta.sin() * self.incoming_target
        };

        let outgoing = if elapsed < self.lead {
            self.outgoing_start
        } else if elapsed >= self.total() {
            0.0
        } else {
            let ramped = elapsed - self.lead;
            let theta = FRAC_PI_2 * (ramped.as_secs_f64() / self.duration.as_secs_f64());
            theta.cos() * self.outgoing_start
        };

        FadeGains {
            incoming,
            outgoing,
            complete: elapsed >= self.total(),
        }
    }
}
