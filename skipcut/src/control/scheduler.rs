//! Skip scheduling
//!
//! Turns the next predicted range into a plan: when (in real time) the
//! decision should be evaluated and where a seek would land.

use std::time::Duration;

use skipcut_common::{MediaTime, RangeQueryResult};

/// Distance kept from the provisional end of a pending range (seconds)
pub const PENDING_SAFETY_MARGIN: MediaTime = 3.0;

/// Pending ranges closer than this are not acted on yet (seconds)
pub const MIN_PENDING_SKIP: MediaTime = 3.0;

/// Armed-but-not-yet-executed decision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingDecision {
    pub seek_to: MediaTime,
    /// Position the element is expected to be at when the timer fires
    pub scheduled_at_position: MediaTime,
}

/// What the scheduler wants done for one position update
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulePlan {
    /// Leave any armed decision alone
    Idle,
    /// Evaluate right away
    EvaluateNow(PendingDecision),
    /// Arm the decision timer
    Arm {
        delay: Duration,
        decision: PendingDecision,
    },
}

/// Plan the next decision for the element at `position` playing at `playback_rate`
pub fn plan(
    position: MediaTime,
    playback_rate: f64,
    next: Option<RangeQueryResult>,
    opposite_day: bool,
) -> SchedulePlan {
    let Some(RangeQueryResult { range, pending }) = next else {
        return SchedulePlan::Idle;
    };

    // Early partial skipping of sound is never safe
    if pending && opposite_day {
        return SchedulePlan::Idle;
    }

    let seek_at = range.start.max(position);
    let seek_to = if pending {
        seek_at.max(range.end - PENDING_SAFETY_MARGIN)
    } else {
        range.end
    };

    if pending && seek_to - position < MIN_PENDING_SKIP {
        return SchedulePlan::Idle;
    }

    let decision = PendingDecision {
        seek_to,
        scheduled_at_position: seek_at,
    };

    if !(playback_rate.is_finite() && playback_rate > 0.0) {
        return SchedulePlan::Idle;
    }

    let real_time_delay = (seek_at - position) / playback_rate;
    if real_time_delay <= 0.0 {
        return SchedulePlan::EvaluateNow(decision);
    }
    match Duration::try_from_secs_f64(real_time_delay) {
        Ok(delay) => SchedulePlan::Arm { delay, decision },
        // Too far ahead to represent; a later update will get closer
        Err(_) => SchedulePlan::Idle,
    }
}
