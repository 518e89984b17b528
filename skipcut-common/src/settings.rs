//! User-facing playback settings
//!
//! Settings are delivered by the settings-update surface (or a TOML file) and
//! applied to a running session. A subset of them, [`DetectorParams`], shapes
//! the ranges produced by the detector; changing that subset requires the
//! detector to be rebuilt.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Highest playback rate accepted for either speed setting
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

/// Playback settings for one controlled stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master switch; when false nothing is skipped
    pub enabled: bool,

    /// Playback rate outside skippable ranges
    pub sounded_speed: f64,

    /// Playback rate used while speeding through a skippable range
    pub silence_speed: f64,

    /// Loudness below which audio counts as silence (0.0-1.0)
    pub volume_threshold: f32,

    /// Sound kept before the end of each silence (seconds)
    pub margin_before: f64,

    /// Sound kept after the start of each silence (seconds)
    pub margin_after: f64,

    /// Skip sound instead of silence
    pub opposite_day: bool,

    /// Desync-bug workaround: periodically force seeks to resync audio and video
    pub desync_correction: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            sounded_speed: 1.0,
            silence_speed: 2.5,
            volume_threshold: 0.010,
            margin_before: 0.1,
            margin_after: 0.1,
            opposite_day: false,
            desync_correction: false,
        }
    }
}

/// Settings that affect what the detector classifies as skippable
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    pub volume_threshold: f32,
    pub margin_before: f64,
    pub margin_after: f64,
    pub opposite_day: bool,
}

impl Settings {
    /// Validate ranges of all numeric settings
    pub fn validate(&self) -> Result<()> {
        for (name, speed) in [
            ("sounded_speed", self.sounded_speed),
            ("silence_speed", self.silence_speed),
        ] {
            if !speed.is_finite() || speed <= 0.0 {
                return Err(Error::InvalidSettings(format!(
                    "{} must be positive, got {}",
                    name, speed
                )));
            }
            if speed > MAX_PLAYBACK_RATE {
                return Err(Error::InvalidSettings(format!(
                    "{} must not exceed {}, got {}",
                    name, MAX_PLAYBACK_RATE, speed
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.volume_threshold) {
            return Err(Error::InvalidSettings(format!(
                "volume_threshold must be within 0.0-1.0, got {}",
                self.volume_threshold
            )));
        }

        for (name, margin) in [
            ("margin_before", self.margin_before),
            ("margin_after", self.margin_after),
        ] {
            if !margin.is_finite() || margin < 0.0 {
                return Err(Error::InvalidSettings(format!(
                    "{} must be non-negative, got {}",
                    name, margin
                )));
            }
        }

        Ok(())
    }

    /// Extract the detector-affecting subset
    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            volume_threshold: self.volume_threshold,
            margin_before: self.margin_before,
            margin_after: self.margin_after,
            opposite_day: self.opposite_day,
        }
    }

    /// Whether switching from `previous` to `self` requires a detector rebuild
    pub fn affects_detector(&self, previous: &Settings) -> bool {
        self.detector_params() != previous.detector_params()
    }
}
