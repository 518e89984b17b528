//! End-to-end scenario runs and binary config loading

use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

use skipcut::config::{Config, ScenarioConfig};
use skipcut::simulate;
use skipcut_common::config::CONFIG_ENV_VAR;
use skipcut_common::Settings;

fn scenario(silences: Vec<[f64; 2]>, duration: f64) -> Config {
    Config {
        scenario: ScenarioConfig {
            silences,
            duration,
            seek_latency_ms: 150,
            lookahead_horizon: None,
            tick_ms: 250,
        },
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_long_silence_is_seeked_over() {
    let config = scenario(vec![[5.0, 12.0]], 20.0);

    let report = simulate::run(&config, std::future::pending()).await.unwrap();

    assert!(report.completed);
    assert_eq!(report.final_position, 20.0);
    assert_eq!(report.seeks, 1);
    assert_eq!(report.speedups, 0);
    // Most of the 6.8s silence (after margins) was skipped
    assert!(
        report.elapsed_secs < 15.0,
        "took {}s of real time",
        report.elapsed_secs
    );
    let seek = report.telemetry.last_seek.expect("seek recorded");
    assert!((seek.to - 11.9).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_engine_plays_everything() {
    let mut config = scenario(vec![[5.0, 12.0]], 20.0);
    config.settings = Settings {
        enabled: false,
        ..Settings::default()
    };

    let report = simulate::run(&config, std::future::pending()).await.unwrap();

    assert!(report.completed);
    assert_eq!(report.seeks + report.speedups, 0);
    assert!(report.elapsed_secs >= 20.0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_run() {
    let config = scenario(vec![], 600.0);

    let report = simulate::run(&config, tokio::time::sleep(std::time::Duration::from_secs(3)))
        .await
        .unwrap();

    assert!(!report.completed);
    assert!(report.final_position < 600.0);
}

#[test]
#[serial]
fn test_config_file_sections() {
    std::env::remove_var(CONFIG_ENV_VAR);
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[logging]
level = "debug"

[settings]
silence_speed = 4.0
desync_correction = true

[scenario]
duration = 42.0
silences = [[1.0, 2.0], [10.0, 15.5]]
"#
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.settings.silence_speed, 4.0);
    assert!(config.settings.desync_correction);
    assert_eq!(config.settings.sounded_speed, 1.0);
    assert_eq!(config.scenario.duration, 42.0);
    assert_eq!(config.scenario.silences.len(), 2);
    assert_eq!(config.scenario.tick_ms, 250);
}

#[test]
#[serial]
fn test_config_rejects_invalid_values() {
    std::env::remove_var(CONFIG_ENV_VAR);
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[scenario]\nsilences = [[5.0, 2.0]]").unwrap();
    assert!(Config::load(Some(file.path())).is_err());

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[settings]\nsilence_speed = -1.0").unwrap();
    assert!(Config::load(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_config_reports_its_source_file() {
    std::env::remove_var(CONFIG_ENV_VAR);
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[settings]\nsilence_speed = 3.0").unwrap();

    let (config, source) = Config::load_with_source(Some(file.path())).unwrap();
    assert_eq!(config.settings.silence_speed, 3.0);
    assert_eq!(source.as_deref(), Some(file.path()));

    std::env::set_var(CONFIG_ENV_VAR, file.path());
    let (_, source) = Config::load_with_source(None).unwrap();
    std::env::remove_var(CONFIG_ENV_VAR);
    assert_eq!(source.as_deref(), Some(file.path()));
}
