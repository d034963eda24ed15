//! Loudness normalization
//!
//! Converts catalog loudness metadata into a static linear gain scalar
//! applied per lane, on top of the fade envelope and master volume. The
//! preference order is album gain, then track gain, then loudness-standard
//! measurements converted against the -18 LUFS reference; with no usable
//! metadata the scalar is a neutral 1.0.

use serde::{Deserialize, Serialize};

/// Reference level for converting integrated loudness to a gain
pub const REFERENCE_LUFS: f64 = -18.0;

/// Scalar applied when no metadata is available
pub const NEUTRAL_SCALAR: f64 = 1.0;

/// Clamp bounds for the linear scalar
pub const MIN_SCALAR: f64 = 0.25;
pub const MAX_SCALAR: f64 = 4.0;

/// Loudness metadata for one track, as served by the catalog
///
/// Every field is optional; catalogs report whatever their analysis
/// pipeline produced. Peaks are carried for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoudnessInfo {
    /// Album ReplayGain in dB
    pub album_gain_db: Option<f64>,

    /// Track ReplayGain in dB
    pub track_gain_db: Option<f64>,

    /// Album integrated loudness in LUFS
    pub album_loudness_lufs: Option<f64>,

    /// Track integrated loudness in LUFS
    pub track_loudness_lufs: Option<f64>,

    /// Album peak as a linear sample value
    pub album_peak: Option<f64>,

    /// Track peak as a linear sample value
    pub track_peak: Option<f64>,
}

impl LoudnessInfo {
    /// Preferred adjustment in dB: album gain, track gain, then the
    /// loudness-standard fallbacks measured against [`REFERENCE_LUFS`].
    pub fn preferred_gain_db(&self) -> Option<f64> {
        self.album_gain_db
            .or(self.track_gain_db)
            .or(self.album_loudness_lufs.map(|lufs| REFERENCE_LUFS - lufs))
            .or(self.track_loudness_lufs.map(|lufs| REFERENCE_LUFS - lufs))
    }
}

/// Linear gain scalar for a lane: `clamp(10^(dB/20), 0.25, 4.0)`.
///
/// `None` metadata (fetch failed, normalization disabled, nothing
/// measured) yields the neutral scalar.
pub fn normalization_scalar(info: Option<&LoudnessInfo>) -> f64 {
    let Some(gain_db) = info.and_then(LoudnessInfo::preferred_gain_db) else {
        return NEUTRAL_SCALAR;
    };
    10.0_f64.powf(gain_db / 20.0).clamp(MIN_SCALAR, MAX_SCALAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_metadata_is_neutral() {
        assert_eq!(normalization_scalar(None), NEUTRAL_SCALAR);
        assert_eq!(
            normalization_scalar(Some(&LoudnessInfo::default())),
            NEUTRAL_SCALAR
        );
    }

    #[test]
    fn album_gain_wins_over_track_gain() {
        let info = LoudnessInfo {
            album_gain_db: Some(-6.0),
            track_gain_db: Some(6.0),
            ..LoudnessInfo::default()
        };
        let scalar = normalization_scalar(Some(&info));
        assert!((scalar - 10.0_f64.powf(-6.0 / 20.0)).abs() < 1e-9);
    }

    #[test]
    fn track_gain_used_when_album_missing() {
        let info = LoudnessInfo {
            track_gain_db: Some(-3.0),
            ..LoudnessInfo::default()
        };
        let scalar = normalization_scalar(Some(&info));
        assert!((scalar - 10.0_f64.powf(-3.0 / 20.0)).abs() < 1e-9);
    }

    #[test]
    fn lufs_fallback_converts_against_reference() {
        // A loud master at -8 LUFS needs -10 dB to hit the reference
        let info = LoudnessInfo {
            track_loudness_lufs: Some(-8.0),
            ..LoudnessInfo::default()
        };
        let scalar = normalization_scalar(Some(&info));
        assert!((scalar - 10.0_f64.powf(-10.0 / 20.0)).abs() < 1e-9);
    }

    #[test]
    fn scalar_is_clamped() {
        let hot = LoudnessInfo {
            track_gain_db: Some(-40.0),
            ..LoudnessInfo::default()
        };
        assert_eq!(normalization_scalar(Some(&hot)), MIN_SCALAR);

        let quiet = LoudnessInfo {
            track_gain_db: Some(40.0),
            ..LoudnessInfo::default()
        };
        assert_eq!(normalization_scalar(Some(&quiet)), MAX_SCALAR);
    }

    #[test]
    fn unity_at_zero_db() {
        let info = LoudnessInfo {
            album_gain_db: Some(0.0),
            ..LoudnessInfo::default()
        };
        assert_eq!(normalization_scalar(Some(&info)), 1.0);
    }
}
