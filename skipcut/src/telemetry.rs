//! Telemetry snapshot for UI and logging collaborators

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use skipcut_common::MediaTime;

/// Source of the current input loudness sample
///
/// `None` means the capability is unavailable right now; telemetry then
/// reads zero. Skip decisions never depend on it.
pub trait VolumeMeter: Send + Sync {
    fn sample(&self) -> Option<f32>;
}

/// Meter with a fixed reading
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantVolume(pub f32);

impl VolumeMeter for ConstantVolume {
    fn sample(&self) -> Option<f32> {
        Some(self.0)
    }
}

/// Last seek performed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeekRecord {
    pub from: MediaTime,
    pub to: MediaTime,
    pub forced: bool,
    pub timestamp: DateTime<Utc>,
}

/// Last speed-up performed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedSwitchRecord {
    pub at: MediaTime,
    pub rate: f64,
    /// Real-time seconds the raised rate was scheduled to last
    pub duration_secs: f64,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of one controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub session_id: Uuid,
    pub last_speed_switch: Option<SpeedSwitchRecord>,
    pub last_seek: Option<SeekRecord>,
    pub input_volume: f32,
    /// Detection failed at some point for this stream
    pub clone_detection_error: bool,
    pub seek_latency_estimate_ms: f64,
    pub desync_budget: u32,
    pub speedup_in_flight: bool,
}

/// Read a meter, degrading to zero when absent or unavailable
pub fn read_volume(meter: Option<&dyn VolumeMeter>) -> f32 {
    meter.and_then(|m| m.sample()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unavailable;

    impl VolumeMeter for Unavailable {
        fn sample(&self) -> Option<f32> {
            None
        }
    }

    #[test]
    fn test_missing_meter_reads_zero() {
        assert_eq!(read_volume(None), 0.0);
    }

    #[test]
    fn test_unavailable_meter_reads_zero() {
        assert_eq!(read_volume(Some(&Unavailable)), 0.0);
    }

    #[test]
    fn test_constant_meter() {
        assert_eq!(read_volume(Some(&ConstantVolume(0.25))), 0.25);
    }
}
