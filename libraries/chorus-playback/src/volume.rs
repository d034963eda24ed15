//! Master volume with perceptual scaling
//!
//! Maps the 0-100% user level onto a -60 dB..0 dB curve so equal slider
//! steps sound like equal loudness steps. The engine folds the resulting
//! linear factor into every lane gain it sets; lanes never see the level.

/// Master volume state
///
/// Mute is tracked separately from the level so unmuting restores the
/// previous setting.
#[derive(Debug, Clone, Copy)]
pub struct MasterVolume {
    /// User-facing level (0-100)
    level: u8,

    /// Mute state (level preserved)
    muted: bool,

    /// Cached linear factor for the current level
    linear: f64,
}

impl MasterVolume {
    /// Create a volume control at `level`, clamped to 0-100.
    pub fn new(level: u8) -> Self {
        let level = level.min(100);
        Self {
            level,
            muted: false,
            linear: Self::linear_for(level),
        }
    }

    /// Set the level (0-100). Does not change the mute state.
    pub fn set_level(&mut self, level: u8) {
        self.level = level.min(100);
        self.linear = Self::linear_for(self.level);
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.muted = !self.muted;
        self.muted
    }

    /// Linear gain factor to multiply into lane gains.
    ///
    /// 0.0 when muted or at level 0, 1.0 at level 100.
    pub fn gain(&self) -> f64 {
        if self.muted {
            0.0
        } else {
            self.linear
        }
    }

    /// Level 0 is hard silence; above that the 0-100 range maps linearly
    /// in dB onto -60..0, then converts to a linear factor.
    fn linear_for(level: u8) -> f64 {
        if level == 0 {
            return 0.0;
        }
        let db = (f64::from(level) - 100.0) * 0.6;
        10.0_f64.powf(db / 20.0)
    }
}

impl Default for MasterVolume {
    fn default() -> Self {
        Self::new(80)
    }
}
