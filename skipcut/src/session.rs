//! Playback session
//!
//! Wraps one [`SkipController`] with the lifecycle around it: a single
//! awaitable initialization (Uninitialized → Initializing → Ready), settings
//! updates that may arrive before initialization, and the debounced
//! re-creation of the range detector when detection settings change.

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};
use uuid::Uuid;

use skipcut_common::{Settings, SkipEvent};

use crate::control::controller::EVENT_CHANNEL_CAPACITY;
use crate::control::latency::INITIAL_ASSUMED_SEEK_MS;
use crate::control::timer::{TimerSlot, TimerToken};
use crate::control::SkipController;
use crate::element::MediaElement;
use crate::error::{Error, Result};
use crate::lookahead::{PredictorFactory, RangePredictor};
use crate::telemetry::{read_volume, TelemetrySnapshot, VolumeMeter};

/// Minimum spacing between detector re-creations
pub const DETECTOR_REBUILD_INTERVAL: Duration = Duration::from_secs(1);

/// Initialization progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
}

struct SessionInner {
    /// Settings in effect (or to take effect at initialization)
    settings: Settings,
    /// Latest update received while not ready; replaces `settings` once ready
    queued: Option<Settings>,
    controller: Option<SkipController>,
    rebuild_timer: TimerSlot,
    /// Bumped by every rebuild that starts; only the latest may install
    rebuild_generation: u64,
    disposed: bool,
}

struct SessionShared {
    session_id: Uuid,
    element: Arc<dyn MediaElement>,
    factory: Arc<dyn PredictorFactory>,
    volume: Option<Arc<dyn VolumeMeter>>,
    events: broadcast::Sender<SkipEvent>,
    init_state: watch::Sender<InitState>,
    inner: Mutex<SessionInner>,
}

/// Skip engine attached to one media element
#[derive(Clone)]
pub struct PlaybackSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("session_id", &self.shared.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Puts the state back to Uninitialized if initialization is abandoned
struct InitGuard<'a> {
    init_state: &'a watch::Sender<InitState>,
    completed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.init_state.send_if_modified(|state| {
                if *state == InitState::Initializing {
                    *state = InitState::Uninitialized;
                    true
                } else {
                    false
                }
            });
        }
    }
}

impl PlaybackSession {
    pub fn new(
        element: Arc<dyn MediaElement>,
        factory: Arc<dyn PredictorFactory>,
        settings: Settings,
    ) -> Self {
        Self::build(element, factory, settings, None)
    }

    /// Create a session whose telemetry samples `meter` for input volume
    pub fn with_volume_meter(
        element: Arc<dyn MediaElement>,
        factory: Arc<dyn PredictorFactory>,
        settings: Settings,
        meter: Arc<dyn VolumeMeter>,
    ) -> Self {
        Self::build(element, factory, settings, Some(meter))
    }

    fn build(
        element: Arc<dyn MediaElement>,
        factory: Arc<dyn PredictorFactory>,
        settings: Settings,
        volume: Option<Arc<dyn VolumeMeter>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (init_state, _) = watch::channel(InitState::Uninitialized);
        let session_id = Uuid::new_v4();
        debug!("Playback session {} created", session_id);

        Self {
            shared: Arc::new(SessionShared {
                session_id,
                element,
                factory,
                volume,
                events,
                init_state,
                inner: Mutex::new(SessionInner {
                    settings,
                    queued: None,
                    controller: None,
                    rebuild_timer: TimerSlot::new("detector rebuild"),
                    rebuild_generation: 0,
                    disposed: false,
                }),
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn state(&self) -> InitState {
        *self.shared.init_state.borrow()
    }

    /// Initialize the session; resolves once it is ready
    ///
    /// Only the first caller does the work. Concurrent callers wait for it,
    /// later callers return immediately. A detector that fails to come up
    /// does not fail initialization: the session runs without predictions and
    /// reports the failure in telemetry.
    pub async fn init(&self) -> Result<()> {
        let mut rx = self.shared.init_state.subscribe();
        loop {
            let claimed = self.shared.init_state.send_if_modified(|state| {
                if *state == InitState::Uninitialized {
                    *state = InitState::Initializing;
                    true
                } else {
                    false
                }
            });
            if claimed {
                break;
            }

            let observed = *rx
                .wait_for(|state| *state != InitState::Initializing)
                .await
                .map_err(|_| Error::InvalidState("init state channel closed".to_string()))?;
            match observed {
                InitState::Ready => return Ok(()),
                InitState::Disposed => {
                    return Err(Error::Disposed(format!("session {}", self.shared.session_id)))
                }
                // Previous initializer was abandoned; try to claim it
                InitState::Uninitialized | InitState::Initializing => continue,
            }
        }

        let mut guard = InitGuard {
            init_state: &self.shared.init_state,
            completed: false,
        };
        let result = self.shared.initialize().await;
        guard.completed = true;
        result
    }

    /// Apply a settings update
    ///
    /// Before initialization the update is queued (the latest one wins).
    /// Afterwards it takes effect immediately; detection settings changes
    /// re-create the detector at most once per [`DETECTOR_REBUILD_INTERVAL`].
    pub fn apply_settings(&self, settings: Settings, previous: &Settings) -> Result<()> {
        settings.validate()?;
        self.shared.apply_settings(settings, previous)
    }

    /// Settings currently in effect, including a queued update
    pub fn settings(&self) -> Settings {
        let inner = self.shared.lock();
        inner.queued.clone().unwrap_or_else(|| inner.settings.clone())
    }

    /// The controller, once the session is ready
    pub fn controller(&self) -> Option<SkipController> {
        self.shared.lock().controller.clone()
    }

    pub fn is_rebuild_scheduled(&self) -> bool {
        self.shared.lock().rebuild_timer.is_armed()
    }

    /// Subscribe to executed actions and lifecycle events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SkipEvent> {
        self.shared.events.subscribe()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        if let Some(controller) = self.controller() {
            return controller.telemetry();
        }
        TelemetrySnapshot {
            session_id: self.shared.session_id,
            last_speed_switch: None,
            last_seek: None,
            input_volume: read_volume(self.shared.volume.as_deref()),
            clone_detection_error: false,
            seek_latency_estimate_ms: INITIAL_ASSUMED_SEEK_MS,
            desync_budget: 0,
            speedup_in_flight: false,
        }
    }

    /// Tear the session down; returns false if it was already disposed
    pub fn dispose(&self) -> bool {
        self.shared.dispose()
    }
}

impl SessionShared {
    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SkipEvent) {
        // No receivers is OK
        let _ = self.events.send(event);
    }

    async fn initialize(self: &Arc<Self>) -> Result<()> {
        let initial = {
            let mut inner = self.lock();
            if let Some(queued) = inner.queued.take() {
                inner.settings = queued;
            }
            inner.settings.clone()
        };

        info!("Initializing playback session {}", self.session_id);
        let predictor = self.factory.create(&initial.detector_params());
        let detection_error = predictor.ensure_initialized().await.err();

        let mut inner = self.lock();
        if inner.disposed {
            predictor.dispose();
            return Err(Error::Disposed(format!("session {}", self.session_id)));
        }

        // Updates that arrived while the detector was coming up
        let settings = inner.queued.take().unwrap_or_else(|| initial.clone());
        inner.settings = settings.clone();

        let controller = SkipController::start_with_events(
            self.session_id,
            Arc::clone(&self.element),
            Some(predictor),
            settings.clone(),
            self.volume.clone(),
            self.events.clone(),
        );
        if let Some(err) = detection_error {
            controller.mark_detection_failed(&err.to_string());
        }
        inner.controller = Some(controller);

        if settings.affects_detector(&initial) {
            self.schedule_rebuild(&mut inner);
        }
        drop(inner);

        self.init_state.send_replace(InitState::Ready);
        info!("Playback session {} ready", self.session_id);
        Ok(())
    }

    fn apply_settings(self: &Arc<Self>, settings: Settings, previous: &Settings) -> Result<()> {
        let mut inner = self.lock();
        if inner.disposed {
            return Err(Error::Disposed(format!("session {}", self.session_id)));
        }

        let Some(controller) = inner.controller.clone() else {
            debug!("Session {} not ready; settings update queued", self.session_id);
            inner.queued = Some(settings);
            return Ok(());
        };

        inner.settings = settings.clone();
        let rebuild = settings.affects_detector(previous);
        controller.update_settings(settings);
        if rebuild {
            self.schedule_rebuild(&mut inner);
        }
        Ok(())
    }

    fn schedule_rebuild(self: &Arc<Self>, inner: &mut SessionInner) {
        let weak = Arc::downgrade(self);
        inner.rebuild_timer.arm(DETECTOR_REBUILD_INTERVAL, move |token| {
            if let Some(shared) = weak.upgrade() {
                tokio::spawn(async move { shared.rebuild_detector(token).await });
            }
        });
        debug!("Detector rebuild scheduled for session {}", self.session_id);
    }

    async fn rebuild_detector(self: Arc<Self>, token: TimerToken) {
        let (params, generation, controller) = {
            let mut inner = self.lock();
            if inner.disposed || !inner.rebuild_timer.claim(token) {
                return;
            }
            let Some(controller) = inner.controller.clone() else {
                return;
            };
            inner.rebuild_generation = inner.rebuild_generation.wrapping_add(1);
            (
                inner.settings.detector_params(),
                inner.rebuild_generation,
                controller,
            )
        };

        info!("Rebuilding detector for session {}", self.session_id);
        let predictor: Arc<dyn RangePredictor> = self.factory.create(&params);
        let init_result = predictor.ensure_initialized().await;

        {
            // Installed under the session lock so a newer rebuild cannot interleave
            let inner = self.lock();
            let superseded = inner.rebuild_generation != generation
                || inner.settings.detector_params() != params;
            if inner.disposed || superseded {
                debug!(
                    "Discarding detector built from outdated settings for session {}",
                    self.session_id
                );
                predictor.dispose();
                return;
            }
            if let Err(err) = init_result {
                controller.mark_detection_failed(&err.to_string());
            }
            controller.replace_predictor(predictor);
        }
        self.emit(SkipEvent::DetectorRebuilt {
            session_id: self.session_id,
            timestamp: Utc::now(),
        });
    }

    fn dispose(&self) -> bool {
        let controller = {
            let mut inner = self.lock();
            if inner.disposed {
                return false;
            }
            inner.disposed = true;
            inner.queued = None;
            inner.rebuild_timer.cancel();
            inner.controller.take()
        };

        if let Some(controller) = controller {
            controller.dispose();
        }
        self.init_state.send_replace(InitState::Disposed);
        info!("Playback session {} disposed", self.session_id);
        true
    }
}
