//! Error types for the attempt throttler.

use std::time::Duration;
use thiserror::Error;

/// Main error type for throttler operations.
#[derive(Error, Debug)]
pub enum ThrottleError {
    /// Configuration could not be parsed or merged
    #[error("Configuration error: {0}")]
    Config(String),

    /// A policy field would make the window/lockout logic degenerate
    #[error("Invalid policy: {field} {reason}")]
    InvalidPolicy {
        field: &'static str,
        reason: &'static str,
    },

    /// A named policy was requested that the configuration does not define
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// A check was made with a timestamp earlier than one already recorded
    #[error("Clock regression: now {now:?} is earlier than last seen {last_seen:?}")]
    ClockRegression { now: Duration, last_seen: Duration },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ThrottleError {
    fn from(err: config::ConfigError) -> Self {
        ThrottleError::Config(err.to_string())
    }
}

/// Result type alias for throttler operations.
pub type Result<T> = std::result::Result<T, ThrottleError>;
