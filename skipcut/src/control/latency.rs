//! Seek latency estimation
//!
//! Seek cost is specific to the media resource (container, codec, network),
//! so it is learned online from the element's own `Seeking`/`Seeked` signals
//! and thrown away with the controller.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::element::{self, ElementEvent, MediaElement, Subscription};

/// Observed seeks averaged over
pub const SEEK_HISTORY_LEN: usize = 5;

/// Estimate reported before any seek has been observed (milliseconds)
pub const INITIAL_ASSUMED_SEEK_MS: f64 = 150.0;

/// Moving average of the most recent seek durations
///
/// **Invariants:**
/// - history never exceeds its capacity; the oldest sample is evicted first
/// - the estimate is never negative
#[derive(Debug, Clone)]
pub struct SeekLatencyEstimator {
    history: VecDeque<f64>,
    capacity: usize,
    /// Most recent `Seeking` without a matching `Seeked` yet
    seek_started_at: Option<Instant>,
}

impl SeekLatencyEstimator {
    pub fn new() -> Self {
        Self::with_capacity(SEEK_HISTORY_LEN)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            seek_started_at: None,
        }
    }

    /// Current estimate in milliseconds
    pub fn current_estimate_ms(&self) -> f64 {
        if self.history.is_empty() {
            return INITIAL_ASSUMED_SEEK_MS;
        }
        self.history.iter().sum::<f64>() / self.history.len() as f64
    }

    /// Number of samples currently averaged
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// A seek began
    ///
    /// Overlapping seeks (several `Seeking` before one `Seeked`) are measured
    /// from the latest one.
    pub fn on_seeking(&mut self, at: Instant) {
        self.seek_started_at = Some(at);
    }

    /// A seek completed; records a sample if a start was observed
    pub fn on_seeked(&mut self, at: Instant) -> Option<Duration> {
        let started = self.seek_started_at.take()?;
        let elapsed = at.saturating_duration_since(started);
        self.record(elapsed);
        Some(elapsed)
    }

    /// Record one seek duration
    pub fn record(&mut self, duration: Duration) {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(duration.as_secs_f64() * 1000.0);
        trace!(
            "Seek took {:.1}ms, estimate now {:.1}ms over {} samples",
            duration.as_secs_f64() * 1000.0,
            self.current_estimate_ms(),
            self.history.len()
        );
    }

    /// Forget all observations
    pub fn reset(&mut self) {
        self.history.clear();
        self.seek_started_at = None;
    }
}

impl Default for SeekLatencyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

/// Feeds an element's seek signals into a shared estimator
///
/// `dispose` stops observing; calling it again does nothing.
#[derive(Debug)]
pub struct SeekLatencyTracker {
    estimator: Arc<Mutex<SeekLatencyEstimator>>,
    subscription: Option<Subscription>,
}

impl SeekLatencyTracker {
    /// Start observing `element`
    pub fn start(element: &dyn MediaElement) -> Self {
        let estimator = Arc::new(Mutex::new(SeekLatencyEstimator::new()));
        let weak: Weak<Mutex<SeekLatencyEstimator>> = Arc::downgrade(&estimator);

        let subscription = element::listen(element.subscribe(), move |event| {
            let Some(estimator) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            let mut estimator = match estimator.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            match event {
                ElementEvent::Seeking => estimator.on_seeking(Instant::now()),
                ElementEvent::Seeked => {
                    estimator.on_seeked(Instant::now());
                }
                _ => {}
            }
            ControlFlow::Continue(())
        });

        Self {
            estimator,
            subscription: Some(subscription),
        }
    }

    pub fn current_estimate_ms(&self) -> f64 {
        match self.estimator.lock() {
            Ok(guard) => guard.current_estimate_ms(),
            Err(poisoned) => poisoned.into_inner().current_estimate_ms(),
        }
    }

    /// Record a seek duration measured elsewhere
    pub fn record(&self, duration: Duration) {
        match self.estimator.lock() {
            Ok(mut guard) => guard.record(duration),
            Err(poisoned) => poisoned.into_inner().record(duration),
        }
    }

    pub fn is_observing(&self) -> bool {
        self.subscription.is_some()
    }

    /// Stop observing and release the listener
    pub fn dispose(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
            debug!("Seek latency tracker disposed");
        }
    }
}

impl Drop for SeekLatencyTracker {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::SimulatedElement;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_initial_estimate_before_samples() {
        let estimator = SeekLatencyEstimator::new();
        assert_eq!(estimator.current_estimate_ms(), INITIAL_ASSUMED_SEEK_MS);
        assert_eq!(estimator.sample_count(), 0);
    }

    #[test]
    fn test_estimate_is_mean_of_samples() {
        let mut estimator = SeekLatencyEstimator::new();
        estimator.record(ms(100));
        estimator.record(ms(300));
        assert_eq!(estimator.current_estimate_ms(), 200.0);
    }

    #[test]
    fn test_oldest_sample_evicted_first() {
        let mut estimator = SeekLatencyEstimator::new();
        for value in [1000, 10, 20, 30, 40, 50] {
            estimator.record(ms(value));
        }
        // 1000 evicted, mean of the last five
        assert_eq!(estimator.sample_count(), SEEK_HISTORY_LEN);
        assert_eq!(estimator.current_estimate_ms(), 30.0);
    }

    #[test]
    fn test_latest_seeking_is_reference() {
        let mut estimator = SeekLatencyEstimator::new();
        let t0 = Instant::now();

        estimator.on_seeking(t0);
        estimator.on_seeking(t0 + ms(400));
        let elapsed = estimator.on_seeked(t0 + ms(500)).unwrap();

        assert_eq!(elapsed, ms(100));
        assert_eq!(estimator.current_estimate_ms(), 100.0);
    }

    #[test]
    fn test_seeked_without_seeking_ignored() {
        let mut estimator = SeekLatencyEstimator::new();
        assert!(estimator.on_seeked(Instant::now()).is_none());
        assert_eq!(estimator.sample_count(), 0);
    }

    #[test]
    fn test_reset_restores_initial_estimate() {
        let mut estimator = SeekLatencyEstimator::new();
        estimator.record(ms(900));
        estimator.reset();
        assert_eq!(estimator.current_estimate_ms(), INITIAL_ASSUMED_SEEK_MS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracker_learns_from_element() {
        let element = SimulatedElement::new(ms(80));
        let tracker = SeekLatencyTracker::start(&element);

        element.set_current_time(10.0);
        tokio::time::sleep(ms(200)).await;

        let estimate = tracker.current_estimate_ms();
        assert!((80.0..90.0).contains(&estimate), "estimate {}", estimate);
    }

    #[tokio::test]
    async fn test_tracker_dispose_is_idempotent() {
        let element = SimulatedElement::new(ms(0));
        let mut tracker = SeekLatencyTracker::start(&element);

        tracker.dispose();
        assert!(!tracker.is_observing());
        tracker.dispose();
        assert!(!tracker.is_observing());
    }
}
