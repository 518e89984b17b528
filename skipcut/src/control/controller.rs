//! Per-stream skip controller
//!
//! Owns everything that is specific to one controlled stream: the seek
//! latency estimate, the desync budget, the pending decision and both timer
//! slots. Reacts to position updates by planning, evaluates armed decisions
//! when their timer fires, and executes the chosen action on the element.
//!
//! **Concurrency:** All state sits behind one mutex that is never held across
//! an `.await`. Listener and timer tasks hold only a `Weak` reference, so
//! dropping or disposing the controller stops them.

use chrono::Utc;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use skipcut_common::{MediaTime, Settings, SkipEvent};

use super::decision::{decide, ActionOutcome, DecisionInput};
use super::desync::DesyncPolicy;
use super::latency::SeekLatencyTracker;
use super::scheduler::{plan, PendingDecision, SchedulePlan};
use super::timer::{TimerSlot, TimerToken};
use crate::element::{self, ElementEvent, MediaElement, Subscription};
use crate::lookahead::RangePredictor;
use crate::telemetry::{read_volume, SeekRecord, SpeedSwitchRecord, TelemetrySnapshot, VolumeMeter};

/// Position divergence after which an armed decision is stale (seconds)
pub const DRIFT_TOLERANCE: MediaTime = 0.5;

/// Capacity of the executed-action channel
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

struct ControllerState {
    settings: Settings,
    predictor: Option<Arc<dyn RangePredictor>>,
    latency: SeekLatencyTracker,
    desync: DesyncPolicy,
    pending: Option<PendingDecision>,
    decision_timer: TimerSlot,
    restore_timer: TimerSlot,
    /// Where the speed-up in flight ends (media time)
    speedup_until: Option<MediaTime>,
    subscription: Option<Subscription>,
    last_seek: Option<SeekRecord>,
    last_speed_switch: Option<SpeedSwitchRecord>,
    detection_failed: bool,
    disposed: bool,
}

struct Shared {
    session_id: Uuid,
    element: Arc<dyn MediaElement>,
    volume: Option<Arc<dyn VolumeMeter>>,
    events: broadcast::Sender<SkipEvent>,
    state: Mutex<ControllerState>,
}

/// Skip controller for one stream
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct SkipController {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SkipController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipController")
            .field("session_id", &self.shared.session_id)
            .finish_non_exhaustive()
    }
}

impl SkipController {
    /// Create a controller for `element` and start observing it
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        session_id: Uuid,
        element: Arc<dyn MediaElement>,
        predictor: Option<Arc<dyn RangePredictor>>,
        settings: Settings,
        volume: Option<Arc<dyn VolumeMeter>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::start_with_events(session_id, element, predictor, settings, volume, events)
    }

    /// Like [`SkipController::start`], publishing on an existing channel
    pub fn start_with_events(
        session_id: Uuid,
        element: Arc<dyn MediaElement>,
        predictor: Option<Arc<dyn RangePredictor>>,
        settings: Settings,
        volume: Option<Arc<dyn VolumeMeter>>,
        events: broadcast::Sender<SkipEvent>,
    ) -> Self {
        let latency = SeekLatencyTracker::start(element.as_ref());

        let shared = Arc::new(Shared {
            session_id,
            element,
            volume,
            events,
            state: Mutex::new(ControllerState {
                desync: DesyncPolicy::new(settings.desync_correction),
                settings,
                predictor,
                latency,
                pending: None,
                decision_timer: TimerSlot::new("skip decision"),
                restore_timer: TimerSlot::new("rate restoration"),
                speedup_until: None,
                subscription: None,
                last_seek: None,
                last_speed_switch: None,
                detection_failed: false,
                disposed: false,
            }),
        });

        let weak = Arc::downgrade(&shared);
        let subscription = element::listen(shared.element.subscribe(), move |event| {
            let Some(shared) = weak.upgrade() else {
                return ControlFlow::Break(());
            };
            if let ElementEvent::TimeUpdate { .. } = event {
                shared.on_position_advanced();
            }
            ControlFlow::Continue(())
        });
        shared.lock().subscription = Some(subscription);

        info!("Skip controller started for session {}", session_id);
        Self { shared }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    /// React to the element's position having advanced
    pub fn on_position_advanced(&self) {
        self.shared.on_position_advanced();
    }

    /// Evaluate a decision right now, as if its timer had fired
    pub fn evaluate(&self, seek_to: MediaTime, scheduled_at_position: MediaTime) -> ActionOutcome {
        let mut state = self.shared.lock();
        if state.disposed {
            return ActionOutcome::Nothing;
        }
        self.shared.evaluate_locked(
            &mut state,
            PendingDecision {
                seek_to,
                scheduled_at_position,
            },
        )
    }

    /// Apply new settings and re-plan from the current position
    pub fn update_settings(&self, settings: Settings) {
        self.shared.update_settings(settings);
    }

    /// Swap in a new detector; the old one is disposed
    pub fn replace_predictor(&self, predictor: Arc<dyn RangePredictor>) {
        self.shared.replace_predictor(predictor);
    }

    /// Record that the detector could not be brought up
    pub fn mark_detection_failed(&self, reason: &str) {
        let mut state = self.shared.lock();
        self.shared.flag_detection_failure(&mut state, reason);
    }

    /// Feed a seek duration measured outside the element's signals
    pub fn record_seek_sample(&self, duration: Duration) {
        self.shared.lock().latency.record(duration);
    }

    pub fn pending_decision(&self) -> Option<PendingDecision> {
        self.shared.lock().pending
    }

    pub fn desync_budget(&self) -> u32 {
        self.shared.lock().desync.budget()
    }

    pub fn seek_latency_estimate_ms(&self) -> f64 {
        self.shared.lock().latency.current_estimate_ms()
    }

    pub fn is_speedup_in_flight(&self) -> bool {
        self.shared.lock().restore_timer.is_armed()
    }

    pub fn settings(&self) -> Settings {
        self.shared.lock().settings.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Subscribe to executed actions
    pub fn subscribe_events(&self) -> broadcast::Receiver<SkipEvent> {
        self.shared.events.subscribe()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        let state = self.shared.lock();
        let predictor_failed = state
            .predictor
            .as_ref()
            .map(|p| p.has_failed())
            .unwrap_or(false);
        TelemetrySnapshot {
            session_id: self.shared.session_id,
            last_speed_switch: state.last_speed_switch,
            last_seek: state.last_seek,
            input_volume: read_volume(self.shared.volume.as_deref()),
            clone_detection_error: state.detection_failed || predictor_failed,
            seek_latency_estimate_ms: state.latency.current_estimate_ms(),
            desync_budget: state.desync.budget(),
            speedup_in_flight: state.restore_timer.is_armed(),
        }
    }

    /// Stop observing, cancel timers, restore the sounded speed and release
    /// the detector
    ///
    /// Returns false if the controller was already disposed.
    pub fn dispose(&self) -> bool {
        self.shared.dispose()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SkipEvent) {
        // No receivers is OK
        let _ = self.events.send(event);
    }

    fn on_position_advanced(self: &Arc<Self>) {
        let mut state = self.lock();
        self.replan_locked(&mut state);
    }

    fn replan_locked(self: &Arc<Self>, state: &mut ControllerState) {
        if state.disposed || !state.settings.enabled {
            return;
        }
        // The restoration timer ends the speed-up; planning resumes after it
        if state.restore_timer.is_armed() {
            return;
        }
        let Some(predictor) = state.predictor.clone() else {
            return;
        };
        if predictor.has_failed() {
            self.flag_detection_failure(state, "detector stopped producing predictions");
            return;
        }

        let position = self.element.current_time();
        let rate = self.element.playback_rate();
        let next = predictor.next_skippable_range(position);

        match plan(position, rate, next, state.settings.opposite_day) {
            SchedulePlan::Idle => {}
            SchedulePlan::EvaluateNow(decision) => {
                state.decision_timer.cancel();
                state.pending = None;
                self.evaluate_locked(state, decision);
            }
            SchedulePlan::Arm { delay, decision } => {
                let weak = Arc::downgrade(self);
                state.pending = Some(decision);
                state.decision_timer.arm(delay, move |token| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_decision_timer(token);
                    }
                });
            }
        }
    }

    fn on_decision_timer(self: &Arc<Self>, token: TimerToken) {
        let mut state = self.lock();
        if state.disposed || !state.decision_timer.claim(token) {
            return;
        }
        if let Some(decision) = state.pending.take() {
            self.evaluate_locked(&mut state, decision);
        }
    }

    fn evaluate_locked(
        self: &Arc<Self>,
        state: &mut ControllerState,
        decision: PendingDecision,
    ) -> ActionOutcome {
        let position = self.element.current_time();

        if self.element.paused() {
            debug!("Decision for {:.3}s dropped: element paused", decision.seek_to);
            return ActionOutcome::Nothing;
        }
        let drift = (position - decision.scheduled_at_position).abs();
        if drift > DRIFT_TOLERANCE {
            debug!(
                "Decision for {:.3}s dropped: position {:.3}s drifted {:.3}s from schedule",
                decision.seek_to, position, drift
            );
            return ActionOutcome::Nothing;
        }

        let input = DecisionInput {
            position,
            seek_to: decision.seek_to,
            sounded_speed: state.settings.sounded_speed,
            silence_speed: state.settings.silence_speed,
            seek_latency_ms: state.latency.current_estimate_ms(),
        };
        let verdict = decide(&input, &state.desync);
        debug!(
            "Decision at {:.3}s -> {:.3}s: {} (forced={}, seek saves {:.3}s, speedup saves {:.3}s, budget {})",
            position,
            decision.seek_to,
            verdict.outcome,
            verdict.forced,
            verdict.can_save_by_seeking,
            verdict.can_save_by_speeding_up,
            state.desync.budget()
        );

        match verdict.outcome {
            ActionOutcome::Seek => {
                self.execute_seek(state, position, decision.seek_to, verdict.forced);
            }
            ActionOutcome::SpeedUp => {
                self.execute_speedup(
                    state,
                    position,
                    decision.seek_to,
                    verdict.time_at_silence_speed,
                );
            }
            ActionOutcome::Nothing => {}
        }
        verdict.outcome
    }

    fn execute_seek(
        &self,
        state: &mut ControllerState,
        from: MediaTime,
        to: MediaTime,
        forced: bool,
    ) {
        // A seek ends any speed-up in flight
        if state.restore_timer.cancel() {
            self.element.set_playback_rate(state.settings.sounded_speed);
        }
        state.speedup_until = None;

        self.element.set_current_time(to);
        state.desync.record_seek();

        let timestamp = Utc::now();
        state.last_seek = Some(SeekRecord {
            from,
            to,
            forced,
            timestamp,
        });
        self.emit(SkipEvent::Seek {
            session_id: self.session_id,
            from,
            to,
            forced,
            timestamp,
        });
    }

    fn execute_speedup(
        self: &Arc<Self>,
        state: &mut ControllerState,
        at: MediaTime,
        until: MediaTime,
        duration_secs: f64,
    ) {
        let rate = state.settings.silence_speed;
        self.element.set_playback_rate(rate);
        state.desync.record_speedup();
        state.speedup_until = Some(until);
        self.arm_restore(state, duration_secs);

        let timestamp = Utc::now();
        state.last_speed_switch = Some(SpeedSwitchRecord {
            at,
            rate,
            duration_secs,
            timestamp,
        });
        self.emit(SkipEvent::SpeedUp {
            session_id: self.session_id,
            at,
            rate,
            restore_after_secs: duration_secs,
            timestamp,
        });
    }

    fn arm_restore(self: &Arc<Self>, state: &mut ControllerState, after_secs: f64) {
        let restore_after = Duration::try_from_secs_f64(after_secs).unwrap_or(Duration::ZERO);
        let weak = Arc::downgrade(self);
        state.restore_timer.arm(restore_after, move |token| {
            if let Some(shared) = weak.upgrade() {
                shared.on_restore_timer(token);
            }
        });
    }

    fn on_restore_timer(self: &Arc<Self>, token: TimerToken) {
        let mut state = self.lock();
        if state.disposed || !state.restore_timer.claim(token) {
            return;
        }
        state.speedup_until = None;

        let rate = state.settings.sounded_speed;
        self.element.set_playback_rate(rate);
        self.emit(SkipEvent::RateRestored {
            session_id: self.session_id,
            rate,
            timestamp: Utc::now(),
        });

        self.replan_locked(&mut state);
    }

    fn update_settings(self: &Arc<Self>, settings: Settings) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }

        state.desync.set_enabled(settings.desync_correction);
        state.decision_timer.cancel();
        state.pending = None;

        if !settings.enabled {
            if state.restore_timer.cancel() {
                debug!("Speed-up cancelled: skipping disabled");
            }
            state.speedup_until = None;
            self.element.set_playback_rate(settings.sounded_speed);
        } else if let (true, Some(until)) = (state.restore_timer.is_armed(), state.speedup_until) {
            // Keep the speed-up ending where the range ends
            let remaining = until - self.element.current_time();
            if remaining > 0.0 {
                self.element.set_playback_rate(settings.silence_speed);
                self.arm_restore(&mut state, remaining / settings.silence_speed);
                debug!(
                    "Speed-up retimed: {:.3}s left at {}x",
                    remaining, settings.silence_speed
                );
            } else {
                state.restore_timer.cancel();
                state.speedup_until = None;
                self.element.set_playback_rate(settings.sounded_speed);
            }
        } else if self.element.playback_rate() != settings.sounded_speed {
            self.element.set_playback_rate(settings.sounded_speed);
        }

        state.settings = settings;
        self.replan_locked(&mut state);
    }

    fn replace_predictor(self: &Arc<Self>, predictor: Arc<dyn RangePredictor>) {
        let mut state = self.lock();
        if state.disposed {
            predictor.dispose();
            return;
        }
        if let Some(previous) = state.predictor.replace(predictor) {
            previous.dispose();
        }
        state.decision_timer.cancel();
        state.pending = None;
        self.replan_locked(&mut state);
    }

    fn flag_detection_failure(&self, state: &mut ControllerState, reason: &str) {
        if state.detection_failed {
            return;
        }
        state.detection_failed = true;
        warn!(
            "Range detection failed for session {}: {}; continuing without predictions",
            self.session_id, reason
        );
        self.emit(SkipEvent::DetectionFailed {
            session_id: self.session_id,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }

    fn dispose(&self) -> bool {
        let mut state = self.lock();
        if state.disposed {
            return false;
        }
        state.disposed = true;

        if let Some(mut subscription) = state.subscription.take() {
            subscription.cancel();
        }
        state.latency.dispose();
        state.decision_timer.cancel();
        state.pending = None;
        if state.restore_timer.cancel() {
            self.element.set_playback_rate(state.settings.sounded_speed);
        }
        state.speedup_until = None;
        if let Some(predictor) = state.predictor.take() {
            predictor.dispose();
        }

        info!("Skip controller disposed for session {}", self.session_id);
        true
    }
}
