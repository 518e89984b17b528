//! skipcut specific configuration
//!
//! One TOML file with three sections:
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [settings]
//! silence_speed = 4.0
//! desync_correction = true
//!
//! [scenario]
//! duration = 120.0
//! seek_latency_ms = 180
//! silences = [[10.0, 20.0], [42.5, 44.0]]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use skipcut_common::config::{load_toml, resolve_config_path, LoggingConfig, CONFIG_ENV_VAR};
use skipcut_common::{MediaTime, Settings, SkippableRange};

use crate::error::Result;

/// Top-level configuration of the `skipcut` binary
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub settings: Settings,
    pub scenario: ScenarioConfig,
}

/// Simulated playback run by `skipcut simulate`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Known silences as `[start, end]` pairs (seconds)
    pub silences: Vec<[MediaTime; 2]>,
    /// Media duration (seconds)
    pub duration: MediaTime,
    /// How long each simulated seek takes (milliseconds)
    pub seek_latency_ms: u64,
    /// How far ahead the simulated detector has analyzed (seconds); unlimited if unset
    pub lookahead_horizon: Option<MediaTime>,
    /// Position update interval (milliseconds)
    pub tick_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            silences: vec![[5.0, 12.0], [20.0, 21.5], [30.0, 30.2], [45.0, 60.0]],
            duration: 75.0,
            seek_latency_ms: 150,
            lookahead_horizon: None,
            tick_ms: 250,
        }
    }
}

impl ScenarioConfig {
    /// Silences as validated ranges
    pub fn silence_ranges(&self) -> Result<Vec<SkippableRange>> {
        self.silences
            .iter()
            .map(|[start, end]| SkippableRange::new(*start, *end).map_err(Into::into))
            .collect()
    }

    pub fn seek_latency(&self) -> Duration {
        Duration::from_millis(self.seek_latency_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl Config {
    /// Load following the usual priority: CLI argument, `SKIPCUT_CONFIG`,
    /// per-user config file, built-in defaults
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        Self::load_with_source(cli_arg).map(|(config, _)| config)
    }

    /// Like [`Config::load`], also returning the file the config came from
    ///
    /// Nothing is logged here so callers can report the source once logging
    /// is set up.
    pub fn load_with_source(cli_arg: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let source = resolve_config_path(cli_arg, CONFIG_ENV_VAR);
        let config: Config = match &source {
            Some(path) => load_toml(path)?,
            None => Config::default(),
        };
        config.settings.validate()?;
        config.scenario.silence_ranges()?;
        Ok((config, source))
    }
}
