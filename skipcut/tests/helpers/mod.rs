//! Shared fixtures for skipcut integration tests
//!
//! All async tests run with tokio's clock paused, so timers fire exactly when
//! the test sleeps past them.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use skipcut::control::SkipController;
use skipcut::element::{MediaElement, SimulatedElement};
use skipcut::lookahead::{RangePredictor, StaticRangePredictor};
use skipcut::telemetry::VolumeMeter;
use skipcut_common::{Settings, SkipEvent, SkippableRange};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Seek duration of the simulated element
pub const ELEMENT_SEEK_LATENCY: Duration = Duration::from_millis(100);

/// Settings without margins so ranges match the silences exactly
pub fn settings(sounded_speed: f64, silence_speed: f64) -> Settings {
    Settings {
        sounded_speed,
        silence_speed,
        margin_before: 0.0,
        margin_after: 0.0,
        ..Settings::default()
    }
}

pub fn ranges(silences: &[(f64, f64)]) -> Vec<SkippableRange> {
    silences
        .iter()
        .map(|&(start, end)| SkippableRange::new(start, end).expect("valid test range"))
        .collect()
}

pub fn element_at(position: f64) -> Arc<SimulatedElement> {
    Arc::new(SimulatedElement::new(ELEMENT_SEEK_LATENCY).with_position(position))
}

pub fn predictor(silences: &[(f64, f64)], settings: &Settings) -> Arc<StaticRangePredictor> {
    Arc::new(StaticRangePredictor::new(
        &ranges(silences),
        &settings.detector_params(),
    ))
}

/// Controller with full observation of `element`
pub fn start_controller(
    element: &Arc<SimulatedElement>,
    predictor: &Arc<StaticRangePredictor>,
    settings: Settings,
) -> SkipController {
    start_controller_with_volume(element, predictor, settings, None)
}

pub fn start_controller_with_volume(
    element: &Arc<SimulatedElement>,
    predictor: &Arc<StaticRangePredictor>,
    settings: Settings,
    volume: Option<Arc<dyn VolumeMeter>>,
) -> SkipController {
    SkipController::start(
        Uuid::new_v4(),
        Arc::clone(element) as Arc<dyn MediaElement>,
        Some(Arc::clone(predictor) as Arc<dyn RangePredictor>),
        settings,
        volume,
    )
}

/// Let spawned listener tasks drain their channels
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Everything published so far
pub fn drain(rx: &mut broadcast::Receiver<SkipEvent>) -> Vec<SkipEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
