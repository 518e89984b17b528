//! # Skipcut Common Library
//!
//! Shared code for the skipcut engine and its tooling:
//! - Error type
//! - User-facing playback settings and detector parameters
//! - Skippable range data model
//! - Event types for downstream reporting
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod ranges;
pub mod settings;

pub use error::{Error, Result};
pub use events::SkipEvent;
pub use ranges::{MediaTime, RangeQueryResult, SkippableRange};
pub use settings::{DetectorParams, Settings};
