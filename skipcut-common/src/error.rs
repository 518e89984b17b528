//! Common error types for skipcut

use thiserror::Error;

/// Common result type for skipcut operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the engine and its tooling
#[derive(Error, Debug)]
pub enum Error {
    /// TOML parse error (wraps toml::de::Error)
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings rejected by validation
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Malformed skippable range
    #[error("Invalid range: {0}")]
    InvalidRange(String),
}
