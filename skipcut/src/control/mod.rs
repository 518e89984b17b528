//! Skip control
//!
//! Pure decision logic (latency estimate, scheduling, decision, desync
//! policy) plus the controller that drives it from element signals.

pub mod controller;
pub mod decision;
pub mod desync;
pub mod latency;
pub mod scheduler;
pub mod timer;

pub use controller::{SkipController, DRIFT_TOLERANCE};
pub use decision::{decide, ActionOutcome, Decision, DecisionInput};
pub use desync::DesyncPolicy;
pub use latency::{SeekLatencyEstimator, SeekLatencyTracker};
pub use scheduler::{plan, PendingDecision, SchedulePlan};
