//! Detector backed by a known list of silence ranges
//!
//! Applies the detector parameters the same way a live detector would:
//! margins keep a little sound around each silence, and opposite mode skips
//! the sounded parts instead. An optional lookahead horizon models a detector
//! that has only analyzed up to `position + horizon`: ranges reaching past the
//! horizon are reported as pending with their end clipped to it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use skipcut_common::{DetectorParams, MediaTime, RangeQueryResult, SkippableRange};

use super::{PredictorFactory, RangePredictor};
use crate::error::{Error, Result};

/// Range predictor over precomputed silences
#[derive(Debug)]
pub struct StaticRangePredictor {
    /// Skippable ranges, sorted and non-overlapping
    ranges: Vec<SkippableRange>,
    horizon: Option<MediaTime>,
    fail_on_init: bool,
    initialized: AtomicBool,
    failed: AtomicBool,
    disposed: AtomicBool,
}

impl StaticRangePredictor {
    pub fn new(silences: &[SkippableRange], params: &DetectorParams) -> Self {
        let ranges = skippable_ranges(silences, params);
        debug!(
            "Static predictor built: {} silences -> {} skippable ranges (opposite_day={})",
            silences.len(),
            ranges.len(),
            params.opposite_day
        );
        Self {
            ranges,
            horizon: None,
            fail_on_init: false,
            initialized: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Only report what lies within `horizon` seconds of the queried position
    pub fn with_horizon(mut self, horizon: MediaTime) -> Self {
        self.horizon = Some(horizon);
        self
    }

    /// Make `ensure_initialized` fail, as when cloning the resource fails
    pub fn failing_init(mut self) -> Self {
        self.fail_on_init = true;
        self
    }

    /// Stop producing predictions from now on
    pub fn fail(&self) {
        warn!("Static predictor marked as failed");
        self.failed.store(true, Ordering::Relaxed);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Relaxed)
    }

    pub fn ranges(&self) -> &[SkippableRange] {
        &self.ranges
    }
}

#[async_trait]
impl RangePredictor for StaticRangePredictor {
    async fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if self.fail_on_init {
            self.failed.store(true, Ordering::Relaxed);
            return Err(Error::Detection(
                "failed to open the resource for analysis".to_string(),
            ));
        }
        self.initialized.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn next_skippable_range(&self, position: MediaTime) -> Option<RangeQueryResult> {
        if self.has_failed() || self.is_disposed() {
            return None;
        }

        // Ends are sorted because ranges are sorted and disjoint
        let index = self.ranges.partition_point(|r| r.end <= position);
        let range = *self.ranges.get(index)?;

        match self.horizon {
            None => Some(RangeQueryResult::finalized(range)),
            Some(horizon) => {
                let frontier = position + horizon;
                if range.start >= frontier {
                    None
                } else if range.end > frontier {
                    Some(RangeQueryResult::pending(SkippableRange {
                        start: range.start,
                        end: frontier,
                    }))
                } else {
                    Some(RangeQueryResult::finalized(range))
                }
            }
        }
    }

    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::Relaxed) {
            debug!("Static predictor disposed");
        }
    }
}

/// Turn silences into skippable ranges under `params`
///
/// Margins always keep some of the sound next to a cut: they shrink the
/// silences normally and the sounded stretches in opposite mode.
fn skippable_ranges(silences: &[SkippableRange], params: &DetectorParams) -> Vec<SkippableRange> {
    let merged = merge_sorted(silences);
    let candidates = if params.opposite_day {
        sounded_gaps(&merged)
    } else {
        merged
    };

    candidates
        .iter()
        .map(|r| SkippableRange {
            start: r.start + params.margin_after,
            end: r.end - params.margin_before,
        })
        .filter(|r| !r.is_empty())
        .collect()
}

/// Sound between merged silences; the tail after the last silence has no
/// known end and is never included.
fn sounded_gaps(silences: &[SkippableRange]) -> Vec<SkippableRange> {
    let mut sounded = Vec::with_capacity(silences.len());
    let mut cursor = 0.0;
    for silence in silences {
        if silence.start > cursor {
            sounded.push(SkippableRange {
                start: cursor,
                end: silence.start,
            });
        }
        cursor = silence.end;
    }
    sounded
}

fn merge_sorted(ranges: &[SkippableRange]) -> Vec<SkippableRange> {
    let mut sorted: Vec<SkippableRange> = ranges.iter().copied().filter(|r| !r.is_empty()).collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<SkippableRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Factory producing [`StaticRangePredictor`]s over the same silences
#[derive(Debug)]
pub struct StaticPredictorFactory {
    silences: Vec<SkippableRange>,
    horizon: Option<MediaTime>,
    fail_on_init: bool,
    created: AtomicUsize,
}

impl StaticPredictorFactory {
    pub fn new(silences: Vec<SkippableRange>) -> Self {
        Self {
            silences,
            horizon: None,
            fail_on_init: false,
            created: AtomicUsize::new(0),
        }
    }

    pub fn with_horizon(mut self, horizon: MediaTime) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_on_init = true;
        self
    }

    /// Number of detectors created so far
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl PredictorFactory for StaticPredictorFactory {
    fn create(&self, params: &DetectorParams) -> Arc<dyn RangePredictor> {
        self.created.fetch_add(1, Ordering::Relaxed);
        let mut predictor = StaticRangePredictor::new(&self.silences, params);
        if let Some(horizon) = self.horizon {
            predictor = predictor.with_horizon(horizon);
        }
        if self.fail_on_init {
            predictor = predictor.failing_init();
        }
        Arc::new(predictor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(margin_before: f64, margin_after: f64, opposite_day: bool) -> DetectorParams {
        DetectorParams {
            volume_threshold: 0.01,
            margin_before,
            margin_after,
            opposite_day,
        }
    }

    fn range(start: f64, end: f64) -> SkippableRange {
        SkippableRange::new(start, end).unwrap()
    }

    #[test]
    fn test_margins_shrink_silences() {
        let predictor =
            StaticRangePredictor::new(&[range(10.0, 20.0)], &params(0.5, 0.25, false));
        assert_eq!(predictor.ranges(), &[range(10.25, 19.5)]);
    }

    #[test]
    fn test_silence_shorter_than_margins_dropped() {
        let predictor = StaticRangePredictor::new(&[range(10.0, 10.3)], &params(0.2, 0.2, false));
        assert!(predictor.ranges().is_empty());
    }

    #[test]
    fn test_overlapping_silences_merged() {
        let predictor = StaticRangePredictor::new(
            &[range(15.0, 25.0), range(10.0, 20.0)],
            &params(0.0, 0.0, false),
        );
        assert_eq!(predictor.ranges(), &[range(10.0, 25.0)]);
    }

    #[test]
    fn test_opposite_day_skips_sound() {
        let predictor = StaticRangePredictor::new(
            &[range(10.0, 20.0), range(30.0, 40.0)],
            &params(0.0, 0.0, true),
        );
        assert_eq!(predictor.ranges(), &[range(0.0, 10.0), range(20.0, 30.0)]);
    }

    #[test]
    fn test_opposite_day_margins_shrink_sound() {
        let predictor = StaticRangePredictor::new(
            &[range(10.0, 20.0), range(30.0, 40.0)],
            &params(0.5, 0.25, true),
        );
        assert_eq!(predictor.ranges(), &[range(0.25, 9.5), range(20.25, 29.5)]);
    }

    #[test]
    fn test_next_range_is_half_open() {
        let predictor = StaticRangePredictor::new(
            &[range(10.0, 20.0), range(30.0, 40.0)],
            &params(0.0, 0.0, false),
        );

        let next = predictor.next_skippable_range(15.0).unwrap();
        assert_eq!(next.range, range(10.0, 20.0));

        let next = predictor.next_skippable_range(20.0).unwrap();
        assert_eq!(next.range, range(30.0, 40.0));
        assert!(!next.pending);

        assert!(predictor.next_skippable_range(40.0).is_none());
    }

    #[test]
    fn test_horizon_marks_pending_and_hides_far_ranges() {
        let predictor = StaticRangePredictor::new(&[range(10.0, 20.0)], &params(0.0, 0.0, false))
            .with_horizon(5.0);

        // Frontier 8: range not analyzed yet
        assert!(predictor.next_skippable_range(3.0).is_none());

        // Frontier 14: range known, end provisional
        let next = predictor.next_skippable_range(9.0).unwrap();
        assert!(next.pending);
        assert_eq!(next.range, range(10.0, 14.0));

        // Frontier 21: range finalized
        let next = predictor.next_skippable_range(16.0).unwrap();
        assert!(!next.pending);
        assert_eq!(next.range, range(10.0, 20.0));
    }

    #[test]
    fn test_failed_predictor_reports_nothing() {
        let predictor = StaticRangePredictor::new(&[range(10.0, 20.0)], &params(0.0, 0.0, false));
        predictor.fail();
        assert!(predictor.has_failed());
        assert!(predictor.next_skippable_range(0.0).is_none());
    }

    #[tokio::test]
    async fn test_failing_init_marks_failure() {
        let predictor = StaticRangePredictor::new(&[range(10.0, 20.0)], &params(0.0, 0.0, false))
            .failing_init();

        let err = predictor.ensure_initialized().await.unwrap_err();
        assert!(matches!(err, Error::Detection(_)));
        assert!(predictor.has_failed());
    }

    #[tokio::test]
    async fn test_init_and_dispose_idempotent() {
        let predictor = StaticRangePredictor::new(&[], &params(0.0, 0.0, false));
        predictor.ensure_initialized().await.unwrap();
        predictor.ensure_initialized().await.unwrap();
        assert!(predictor.is_initialized());

        predictor.dispose();
        predictor.dispose();
        assert!(predictor.is_disposed());
    }

    #[test]
    fn test_factory_counts_creations() {
        let factory = StaticPredictorFactory::new(vec![range(1.0, 2.0)]);
        let _a = factory.create(&params(0.0, 0.0, false));
        let _b = factory.create(&params(0.1, 0.1, true));
        assert_eq!(factory.created_count(), 2);
    }
}
