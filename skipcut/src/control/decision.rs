//! Skip decision
//!
//! Pure comparison of the time a seek would save against the time a
//! temporary speed-up would save, with the desync policy able to upgrade the
//! verdict to a forced seek. Staleness checks and execution live in the
//! controller.

use serde::Serialize;

use skipcut_common::MediaTime;

use super::desync::DesyncPolicy;

/// Real-time floor below which a speed-up cannot be timed reliably (seconds)
pub const MIN_SCHEDULABLE_DELAY: f64 = 1.0 / 240.0;

/// Verdict of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    Nothing,
    SpeedUp,
    Seek,
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionOutcome::Nothing => write!(f, "nothing"),
            ActionOutcome::SpeedUp => write!(f, "speedup"),
            ActionOutcome::Seek => write!(f, "seek"),
        }
    }
}

/// Inputs of one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionInput {
    /// Element position now
    pub position: MediaTime,
    /// Where a seek would land
    pub seek_to: MediaTime,
    pub sounded_speed: f64,
    pub silence_speed: f64,
    /// Current seek latency estimate (milliseconds)
    pub seek_latency_ms: f64,
}

/// Verdict plus the numbers it was based on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub outcome: ActionOutcome,
    /// Seek chosen by the desync policy rather than by the comparison
    pub forced: bool,
    pub seek_amount: MediaTime,
    pub expected_seek_secs: f64,
    pub time_at_normal_speed: f64,
    pub time_at_silence_speed: f64,
    pub can_save_by_seeking: f64,
    pub can_save_by_speeding_up: f64,
}

/// Decide between seeking, speeding up and doing nothing
///
/// Rules, in order (the desync policy may turn any non-seek verdict into a
/// forced seek):
/// 1. seeking saves more than speeding up: seek if it saves anything
/// 2. speeding up saves nothing: nothing
/// 3. the speed-up would be too short to time: seek if that saves anything
/// 4. otherwise speed up
pub fn decide(input: &DecisionInput, policy: &DesyncPolicy) -> Decision {
    let seek_amount = input.seek_to - input.position;
    let expected_seek_secs = input.seek_latency_ms.max(0.0) / 1000.0;

    let time_at_normal_speed = seek_amount / input.sounded_speed;
    let can_save_by_seeking = time_at_normal_speed - expected_seek_secs;

    let time_at_silence_speed = seek_amount / input.silence_speed;
    let can_save_by_speeding_up = time_at_normal_speed
        - time_at_silence_speed
        - policy.amortized_cost(expected_seek_secs);

    let mut decision = Decision {
        outcome: ActionOutcome::Nothing,
        forced: false,
        seek_amount,
        expected_seek_secs,
        time_at_normal_speed,
        time_at_silence_speed,
        can_save_by_seeking,
        can_save_by_speeding_up,
    };

    // Nothing ahead to skip
    if seek_amount.is_nan() || seek_amount <= 0.0 {
        return decision;
    }

    let seek_if_worth_it = if can_save_by_seeking > 0.0 {
        ActionOutcome::Seek
    } else {
        ActionOutcome::Nothing
    };

    let natural = if can_save_by_seeking > can_save_by_speeding_up {
        seek_if_worth_it
    } else if can_save_by_speeding_up <= 0.0 {
        ActionOutcome::Nothing
    } else if time_at_silence_speed <= MIN_SCHEDULABLE_DELAY {
        seek_if_worth_it
    } else {
        ActionOutcome::SpeedUp
    };

    if natural != ActionOutcome::Seek
        && policy.must_force_seek(time_at_normal_speed, expected_seek_secs)
    {
        decision.outcome = ActionOutcome::Seek;
        decision.forced = true;
    } else {
        decision.outcome = natural;
    }
    decision
}
