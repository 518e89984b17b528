//! skipcut - Main entry point
//!
//! Command-line front end for the skip-decision engine. `simulate` plays a
//! configured scenario against an in-process media element and prints the
//! resulting telemetry.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use skipcut::config::Config;
use skipcut::simulate::{self, SimulationReport};

/// Command-line arguments for skipcut
#[derive(Parser, Debug)]
#[command(name = "skipcut")]
#[command(about = "Adaptive silence skipping for media playback")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a scenario against a simulated element
    Simulate {
        /// Config file (overrides SKIPCUT_CONFIG and the per-user file)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Media duration in seconds (overrides [scenario] duration)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Simulate {
            config,
            duration,
            json,
        } => {
            let (mut config, source) =
                Config::load_with_source(config.as_deref()).context("Failed to load configuration")?;
            init_tracing(&config.logging.level);
            match source {
                Some(path) => info!("Loaded configuration from {}", path.display()),
                None => warn!("No config file found, using built-in defaults"),
            }

            if let Some(duration) = duration {
                config.scenario.duration = duration;
            }

            let report = simulate::run(&config, shutdown_signal())
                .await
                .context("Simulation failed")?;

            if json {
                let out = serde_json::to_string_pretty(&report)
                    .context("Failed to serialize report")?;
                println!("{}", out);
            } else {
                print_report(&report);
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("skipcut={}", level)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn print_report(report: &SimulationReport) {
    let t = &report.telemetry;
    println!("Session:            {}", t.session_id);
    println!(
        "Media played:       {:.2}s of {:.2}s{}",
        report.final_position,
        report.media_duration,
        if report.completed { "" } else { " (interrupted)" }
    );
    println!("Real time:          {:.2}s", report.elapsed_secs);
    println!(
        "Seeks:              {} ({} forced)",
        report.seeks, report.forced_seeks
    );
    println!("Speed-ups:          {}", report.speedups);
    println!("Seek estimate:      {:.1}ms", t.seek_latency_estimate_ms);
    println!("Desync budget:      {}", t.desync_budget);
    println!("Detection error:    {}", t.clone_detection_error);
    if let Some(seek) = &t.last_seek {
        println!("Last seek:          {:.2}s -> {:.2}s", seek.from, seek.to);
    }
    if let Some(switch) = &t.last_speed_switch {
        println!(
            "Last speed switch:  {}x at {:.2}s for {:.2}s",
            switch.rate, switch.at, switch.duration_secs
        );
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping simulation");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping simulation");
        },
    }
}
