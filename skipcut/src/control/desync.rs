//! Desync correction policy
//!
//! On platforms with the desync bug every playback-rate switch nudges audio
//! and video further apart, and only a seek brings them back together. The
//! policy counts speed-ups since the last seek (the budget) and decides when
//! a decision must be upgraded to a forced seek.

/// Speed-ups over which one corrective seek is amortized
pub const DESYNC_AMORTIZATION: f64 = 20.0;

/// Floor for the expected seek duration when computing ratios (seconds)
const MIN_EXPECTED_SEEK_SECS: f64 = 1e-3;

/// Speed-up counter and forced-seek heuristic
///
/// **Invariant:** the budget only goes back to zero through a seek.
#[derive(Debug, Clone, Default)]
pub struct DesyncPolicy {
    enabled: bool,
    budget: u32,
}

impl DesyncPolicy {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, budget: 0 }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning the workaround on or off keeps the budget
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Speed-ups since the last seek
    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Share of a corrective seek charged to one speed-up (seconds)
    pub fn amortized_cost(&self, expected_seek_secs: f64) -> f64 {
        if self.enabled {
            expected_seek_secs / DESYNC_AMORTIZATION
        } else {
            0.0
        }
    }

    /// How much correction is wanted: 0 with no pending speed-ups, reaching
    /// 1 after `DESYNC_AMORTIZATION` of them and growing without bound
    pub fn want(&self) -> f64 {
        self.budget as f64 / DESYNC_AMORTIZATION
    }

    /// Whether the current decision must become a seek
    ///
    /// `time_at_normal_speed` is how long the range would take to play at the
    /// sounded speed. The cheaper the seek relative to that, the sooner a
    /// correction is forced; once `want()` reaches 1 a seek is forced
    /// regardless.
    pub fn must_force_seek(&self, time_at_normal_speed: f64, expected_seek_secs: f64) -> bool {
        if !self.enabled || self.budget == 0 {
            return false;
        }
        let need_seek_ratio =
            time_at_normal_speed / expected_seek_secs.max(MIN_EXPECTED_SEEK_SECS);
        self.want() >= 1.0 - need_seek_ratio
    }

    /// One speed-up performed (both rate switches count as one)
    pub fn record_speedup(&mut self) {
        self.budget = self.budget.saturating_add(1);
    }

    /// Any seek resynchronizes audio and video
    pub fn record_seek(&mut self) {
        self.budget = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_policy_never_forces() {
        let mut policy = DesyncPolicy::new(false);
        for _ in 0..100 {
            policy.record_speedup();
        }
        assert!(!policy.must_force_seek(0.0, 1.0));
        assert_eq!(policy.amortized_cost(1.0), 0.0);
    }

    #[test]
    fn test_zero_budget_never_forces() {
        let policy = DesyncPolicy::new(true);
        assert!(!policy.must_force_seek(100.0, 0.1));
    }

    #[test]
    fn test_full_budget_always_forces() {
        let mut policy = DesyncPolicy::new(true);
        for _ in 0..DESYNC_AMORTIZATION as u32 {
            policy.record_speedup();
        }
        // Even when the range is tiny compared to the seek cost
        assert!(policy.must_force_seek(0.0, 5.0));
    }

    #[test]
    fn test_cheap_seek_forces_early() {
        let mut policy = DesyncPolicy::new(true);
        policy.record_speedup();
        // want = 0.05; range takes 2s, seek 0.15s: ratio >> 1
        assert!(policy.must_force_seek(2.0, 0.15));
        // Range shorter than the seek: ratio 0.5, need want >= 0.5
        assert!(!policy.must_force_seek(0.15, 0.3));
    }

    #[test]
    fn test_want_grows_with_budget() {
        let mut policy = DesyncPolicy::new(true);
        let mut last = policy.want();
        for _ in 0..30 {
            policy.record_speedup();
            assert!(policy.want() > last);
            last = policy.want();
        }
    }

    #[test]
    fn test_forcing_monotonic_in_seek_cost() {
        let mut policy = DesyncPolicy::new(true);
        for _ in 0..10 {
            policy.record_speedup();
        }
        // want = 0.5: forced while the seek costs at most twice the range
        assert!(policy.must_force_seek(1.0, 1.5));
        assert!(policy.must_force_seek(1.0, 2.0));
        assert!(!policy.must_force_seek(1.0, 2.5));
    }

    #[test]
    fn test_seek_resets_budget_speedup_increments_by_one() {
        let mut policy = DesyncPolicy::new(true);
        policy.record_speedup();
        policy.record_speedup();
        assert_eq!(policy.budget(), 2);

        policy.record_seek();
        assert_eq!(policy.budget(), 0);

        policy.record_speedup();
        assert_eq!(policy.budget(), 1);
    }

    #[test]
    fn test_amortized_cost_when_enabled() {
        let policy = DesyncPolicy::new(true);
        assert_eq!(policy.amortized_cost(2.0), 0.1);
    }
}
