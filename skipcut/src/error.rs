//! Error types for skipcut
//!
//! None of these are fatal to the process: stale decisions are not errors at
//! all, detection failures degrade to "no upcoming range", and missing
//! capabilities degrade telemetry only.

use thiserror::Error;

/// Main error type for the skip engine
#[derive(Error, Debug)]
pub enum Error {
    /// Errors from the shared library (settings validation, config loading)
    #[error(transparent)]
    Common(#[from] skipcut_common::Error),

    /// Range detector could not initialize or produce predictions
    #[error("Detection error: {0}")]
    Detection(String),

    /// Operation on a session or controller that was already disposed
    #[error("Disposed: {0}")]
    Disposed(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Convenience Result type using skipcut Error
pub type Result<T> = std::result::Result<T, Error>;
