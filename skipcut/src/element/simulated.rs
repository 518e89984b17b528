//! In-process media element driven by a manual or tokio-driven clock
//!
//! Used by the `simulate` command and by tests. Seeks take a configurable
//! amount of real time: `Seeking` fires immediately, `Seeked` after the
//! latency. A seek issued while another is in flight aborts the earlier
//! `Seeked`, like a browser element does.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use skipcut_common::MediaTime;

use super::{ElementEvent, MediaElement};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug)]
struct SimState {
    position: MediaTime,
    rate: f64,
    paused: bool,
    duration: Option<MediaTime>,
    seek_in_flight: Option<JoinHandle<()>>,
    seek_log: Vec<MediaTime>,
    rate_log: Vec<f64>,
}

/// Simulated playback element
#[derive(Debug)]
pub struct SimulatedElement {
    state: Mutex<SimState>,
    events: broadcast::Sender<ElementEvent>,
    seek_latency: Duration,
}

impl SimulatedElement {
    /// Create a playing element at position 0, rate 1.0
    pub fn new(seek_latency: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(SimState {
                position: 0.0,
                rate: 1.0,
                paused: false,
                duration: None,
                seek_in_flight: None,
                seek_log: Vec::new(),
                rate_log: Vec::new(),
            }),
            events,
            seek_latency,
        }
    }

    /// Set the media duration; playback pauses when it is reached
    pub fn with_duration(self, duration: MediaTime) -> Self {
        self.lock().duration = Some(duration);
        self
    }

    /// Start at `position` without emitting signals
    pub fn with_position(self, position: MediaTime) -> Self {
        self.lock().position = position;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panic while holding this lock leaves plain numbers behind; keep going
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ElementEvent) {
        // No receivers is OK
        let _ = self.events.send(event);
    }

    /// Advance the clock by `real_time` at the current rate
    ///
    /// Emits `TimeUpdate` unless paused. Returns the new position.
    pub fn advance(&self, real_time: Duration) -> MediaTime {
        let (position, ended) = {
            let mut state = self.lock();
            if state.paused {
                return state.position;
            }
            let mut position = state.position + real_time.as_secs_f64() * state.rate;
            let mut ended = false;
            if let Some(duration) = state.duration {
                if position >= duration {
                    position = duration;
                    state.paused = true;
                    ended = true;
                }
            }
            state.position = position;
            (position, ended)
        };

        self.emit(ElementEvent::TimeUpdate { position });
        if ended {
            debug!("Simulated element reached end at {:.3}s", position);
            self.emit(ElementEvent::Pause);
        }
        position
    }

    /// Move the position without emitting any signal
    ///
    /// Models drift or an external position change the engine has not been
    /// told about yet.
    pub fn place_at(&self, position: MediaTime) {
        self.lock().position = position;
    }

    pub fn play(&self) {
        self.lock().paused = false;
        self.emit(ElementEvent::Play);
    }

    pub fn pause(&self) {
        self.lock().paused = true;
        self.emit(ElementEvent::Pause);
    }

    pub fn is_ended(&self) -> bool {
        let state = self.lock();
        matches!(state.duration, Some(d) if state.position >= d)
    }

    /// Targets of every seek performed so far
    pub fn seek_history(&self) -> Vec<MediaTime> {
        self.lock().seek_log.clone()
    }

    /// Every playback rate written so far
    pub fn rate_history(&self) -> Vec<f64> {
        self.lock().rate_log.clone()
    }

    /// Drive the clock from a tokio interval until the element ends
    pub fn run_clock(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let element = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                element.advance(tick);
                if element.is_ended() {
                    break;
                }
            }
        })
    }
}

impl MediaElement for SimulatedElement {
    fn current_time(&self) -> MediaTime {
        self.lock().position
    }

    fn set_current_time(&self, position: MediaTime) {
        let position = position.max(0.0);
        {
            let mut state = self.lock();
            let position = match state.duration {
                Some(duration) => position.min(duration),
                None => position,
            };
            state.position = position;
            state.seek_log.push(position);
            if let Some(previous) = state.seek_in_flight.take() {
                previous.abort();
            }

            let events = self.events.clone();
            let latency = self.seek_latency;
            state.seek_in_flight = match tokio::runtime::Handle::try_current() {
                Ok(handle) => Some(handle.spawn(async move {
                    tokio::time::sleep(latency).await;
                    let _ = events.send(ElementEvent::Seeked);
                })),
                Err(_) => None,
            };
        }

        self.emit(ElementEvent::Seeking);
        if tokio::runtime::Handle::try_current().is_err() {
            // Outside a runtime seeks complete instantly
            self.emit(ElementEvent::Seeked);
        }
    }

    fn paused(&self) -> bool {
        self.lock().paused
    }

    fn playback_rate(&self) -> f64 {
        self.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        {
            let mut state = self.lock();
            state.rate = rate;
            state.rate_log.push(rate);
        }
        self.emit(ElementEvent::RateChange { rate });
    }

    fn subscribe(&self) -> broadcast::Receiver<ElementEvent> {
        self.events.subscribe()
    }
}
