//! Scenario runner behind `skipcut simulate`
//!
//! Plays a [`SimulatedElement`] through a list of known silences with a full
//! [`PlaybackSession`] attached, and reports what the engine did.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use skipcut_common::{MediaTime, SkipEvent};

use crate::config::Config;
use crate::element::{MediaElement, SimulatedElement};
use crate::error::Result;
use crate::lookahead::StaticPredictorFactory;
use crate::session::PlaybackSession;
use crate::telemetry::TelemetrySnapshot;

/// Outcome of one simulated playback
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub media_duration: MediaTime,
    pub final_position: MediaTime,
    /// Real time the playback took (seconds)
    pub elapsed_secs: f64,
    pub seeks: usize,
    pub forced_seeks: usize,
    pub speedups: usize,
    /// Events dropped because the report reader fell behind
    pub missed_events: u64,
    pub completed: bool,
    pub telemetry: TelemetrySnapshot,
}

/// Run the configured scenario until the media ends or `shutdown` resolves
pub async fn run<F>(config: &Config, shutdown: F) -> Result<SimulationReport>
where
    F: Future<Output = ()>,
{
    let scenario = &config.scenario;

    let mut factory = StaticPredictorFactory::new(scenario.silence_ranges()?);
    if let Some(horizon) = scenario.lookahead_horizon {
        factory = factory.with_horizon(horizon);
    }
    let element = Arc::new(
        SimulatedElement::new(scenario.seek_latency()).with_duration(scenario.duration),
    );
    let session = PlaybackSession::new(
        Arc::clone(&element) as Arc<dyn MediaElement>,
        Arc::new(factory),
        config.settings.clone(),
    );

    let mut report_rx = session.subscribe_events();
    let logger = tokio::spawn(log_events(session.subscribe_events()));

    info!(
        "Simulating {:.1}s of media with {} silences",
        scenario.duration,
        scenario.silences.len()
    );
    let started = Instant::now();
    session.init().await?;

    let mut clock = element.run_clock(scenario.tick());
    let completed = tokio::select! {
        result = &mut clock => {
            if let Err(e) = result {
                warn!("Simulation clock stopped unexpectedly: {}", e);
            }
            element.is_ended()
        }
        _ = shutdown => {
            info!("Simulation interrupted");
            clock.abort();
            false
        }
    };
    let elapsed = started.elapsed();

    let telemetry = session.telemetry();
    session.dispose();
    logger.abort();

    let mut report = SimulationReport {
        media_duration: scenario.duration,
        final_position: element.current_time(),
        elapsed_secs: elapsed.as_secs_f64(),
        seeks: 0,
        forced_seeks: 0,
        speedups: 0,
        missed_events: 0,
        completed,
        telemetry,
    };
    loop {
        match report_rx.try_recv() {
            Ok(SkipEvent::Seek { forced, .. }) => {
                report.seeks += 1;
                if forced {
                    report.forced_seeks += 1;
                }
            }
            Ok(SkipEvent::SpeedUp { .. }) => report.speedups += 1,
            Ok(_) => {}
            Err(TryRecvError::Lagged(n)) => report.missed_events += n,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    info!(
        "Simulation finished: {:.1}s of media in {:.1}s ({} seeks, {} speed-ups)",
        report.final_position, report.elapsed_secs, report.seeks, report.speedups
    );
    Ok(report)
}

async fn log_events(mut rx: broadcast::Receiver<SkipEvent>) {
    loop {
        match rx.recv().await {
            Ok(SkipEvent::Seek { from, to, forced, .. }) => {
                info!("Seek {:.2}s -> {:.2}s{}", from, to, if forced { " (forced)" } else { "" });
            }
            Ok(SkipEvent::SpeedUp { at, rate, restore_after_secs, .. }) => {
                info!("Speed-up at {:.2}s to {}x for {:.2}s", at, rate, restore_after_secs);
            }
            Ok(SkipEvent::DetectionFailed { reason, .. }) => {
                warn!("Detection failed: {}", reason);
            }
            Ok(event) => debug!("Event: {:?}", event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event logger lagged, {} events skipped", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
