//! # Skipcut Engine Library
//!
//! Adaptive skip-decision engine for a media stream being played back.
//!
//! **Purpose:** Given predictions of upcoming skippable ranges (silence, or
//! sound in opposite mode), decide for each range whether to seek past it,
//! temporarily raise the playback rate, or leave it alone, and act at the
//! right real-world instant.
//!
//! **Architecture:** One [`control::SkipController`] per controlled stream,
//! wrapped by a [`session::PlaybackSession`] that owns initialization and
//! settings updates. The media element and the range detector are external
//! collaborators behind the [`element::MediaElement`] and
//! [`lookahead::RangePredictor`] traits.

pub mod config;
pub mod control;
pub mod element;
pub mod error;
pub mod lookahead;
pub mod session;
pub mod simulate;
pub mod telemetry;

pub use control::SkipController;
pub use error::{Error, Result};
pub use session::PlaybackSession;
pub use telemetry::TelemetrySnapshot;
