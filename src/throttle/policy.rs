//! Throttle policy: how many attempts, over what window, locked out for how long.

use std::time::Duration;

use crate::error::{Result, ThrottleError};

/// Immutable limits applied to one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    max_attempts: u32,
    time_window: Duration,
    cooldown_period: Duration,
}

impl ThrottlePolicy {
    /// Create a new policy.
    ///
    /// Every field must be non-zero: a zero threshold, window or cooldown
    /// makes the window/lockout logic degenerate.
    pub fn new(max_attempts: u32, time_window: Duration, cooldown_period: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(ThrottleError::InvalidPolicy {
                field: "max_attempts",
                reason: "must be greater than zero",
            });
        }
        if time_window.is_zero() {
            return Err(ThrottleError::InvalidPolicy {
                field: "time_window",
                reason: "must be a non-zero duration",
            });
        }
        if cooldown_period.is_zero() {
            return Err(ThrottleError::InvalidPolicy {
                field: "cooldown_period",
                reason: "must be a non-zero duration",
            });
        }

        Ok(Self {
            max_attempts,
            time_window,
            cooldown_period,
        })
    }

    /// Attempts allowed inside one window before lockout.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Window used to decide whether two attempts count together.
    pub fn time_window(&self) -> Duration {
        self.time_window
    }

    /// Lockout duration once `max_attempts` is reached.
    pub fn cooldown_period(&self) -> Duration {
        self.cooldown_period
    }
}
