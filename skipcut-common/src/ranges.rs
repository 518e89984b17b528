//! Skippable range data model
//!
//! Ranges are expressed in media-intrinsic time (seconds of the media
//! resource, independent of playback rate) and are half-open: `[start, end)`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Media-intrinsic time in seconds
pub type MediaTime = f64;

/// A region of the media to be skipped
///
/// Produced by the range-detection collaborator and read-only to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkippableRange {
    /// Inclusive start (seconds)
    pub start: MediaTime,
    /// Exclusive end (seconds)
    pub end: MediaTime,
}

impl SkippableRange {
    /// Create a range, rejecting non-finite bounds and `end < start`
    pub fn new(start: MediaTime, end: MediaTime) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(Error::InvalidRange(format!(
                "non-finite bounds [{}, {})",
                start, end
            )));
        }
        if end < start {
            return Err(Error::InvalidRange(format!(
                "end {} precedes start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Length of the range in media seconds
    pub fn duration(&self) -> MediaTime {
        self.end - self.start
    }

    /// Whether `position` falls inside `[start, end)`
    pub fn contains(&self, position: MediaTime) -> bool {
        position >= self.start && position < self.end
    }

    /// Whether the range is still ahead of (or around) `position`
    pub fn is_upcoming(&self, position: MediaTime) -> bool {
        self.end > position
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// The next upcoming skippable range relative to a queried position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeQueryResult {
    pub range: SkippableRange,

    /// True while the detector has not finalized `range.end` yet
    pub pending: bool,
}

impl RangeQueryResult {
    pub fn finalized(range: SkippableRange) -> Self {
        Self {
            range,
            pending: false,
        }
    }

    pub fn pending(range: SkippableRange) -> Self {
        Self {
            range,
            pending: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_reversed_bounds() {
        let err = SkippableRange::new(5.0, 4.0).unwrap_err();
        assert!(matches!(err, Error::InvalidRange(_)));
    }

    #[test]
    fn test_new_rejects_nan() {
        assert!(SkippableRange::new(f64::NAN, 4.0).is_err());
        assert!(SkippableRange::new(1.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_half_open_containment() {
        let range = SkippableRange::new(10.0, 20.0).unwrap();
        assert!(range.contains(10.0));
        assert!(range.contains(19.999));
        assert!(!range.contains(20.0));
        assert!(!range.contains(9.999));
    }

    #[test]
    fn test_upcoming_excludes_end() {
        let range = SkippableRange::new(10.0, 20.0).unwrap();
        assert!(range.is_upcoming(0.0));
        assert!(range.is_upcoming(15.0));
        assert!(!range.is_upcoming(20.0));
    }

    #[test]
    fn test_zero_length_range_is_empty() {
        let range = SkippableRange::new(3.0, 3.0).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.duration(), 0.0);
    }

    #[test]
    fn test_query_result_constructors() {
        let range = SkippableRange::new(1.0, 2.0).unwrap();
        assert!(!RangeQueryResult::finalized(range).pending);
        assert!(RangeQueryResult::pending(range).pending);
    }
}
