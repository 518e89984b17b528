//! Event types reported by the skip engine
//!
//! Events are broadcast to whoever renders telemetry or logs; the engine never
//! waits on a consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ranges::MediaTime;

/// Skip engine events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SkipEvent {
    /// Element position was moved past a skippable range
    Seek {
        session_id: Uuid,
        from: MediaTime,
        to: MediaTime,
        /// True when the seek was forced by desync correction
        forced: bool,
        timestamp: DateTime<Utc>,
    },

    /// Playback rate raised for the duration of a skippable range
    SpeedUp {
        session_id: Uuid,
        at: MediaTime,
        rate: f64,
        /// Real-time seconds until the rate is restored
        restore_after_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// Playback rate switched back after a speed-up
    RateRestored {
        session_id: Uuid,
        rate: f64,
        timestamp: DateTime<Utc>,
    },

    /// Detector torn down and recreated after a settings change
    DetectorRebuilt {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Detector could not produce predictions
    DetectionFailed {
        session_id: Uuid,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl SkipEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            SkipEvent::Seek { session_id, .. }
            | SkipEvent::SpeedUp { session_id, .. }
            | SkipEvent::RateRestored { session_id, .. }
            | SkipEvent::DetectorRebuilt { session_id, .. }
            | SkipEvent::DetectionFailed { session_id, .. } => *session_id,
        }
    }
}
