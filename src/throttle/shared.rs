//! Throttler shared between concurrent callers.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::policy::ThrottlePolicy;
use super::throttler::{AttemptThrottler, Decision, ThrottleState};
use crate::error::Result;

/// An [`AttemptThrottler`] that can be checked from several threads.
///
/// Each check runs its whole read-modify-write under one lock, so two
/// concurrent callers can never both be admitted past the cap. Clones share
/// the same state.
#[derive(Debug, Clone)]
pub struct SharedThrottler {
    inner: Arc<Mutex<AttemptThrottler>>,
}

impl SharedThrottler {
    /// Create a new shared throttler with zeroed state.
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            inner: Arc::new(Mutex::new(AttemptThrottler::new(policy))),
        }
    }

    /// Record an attempt at `now` and report whether it is permitted.
    pub fn check_attempt(&self, now: Duration) -> bool {
        self.inner.lock().check_attempt(now)
    }

    /// Record an attempt at `now`, rejecting a regressing clock.
    pub fn try_check_attempt(&self, now: Duration) -> Result<bool> {
        self.inner.lock().try_check_attempt(now)
    }

    /// Record an attempt at `now` and return the full decision.
    pub fn evaluate(&self, now: Duration) -> Decision {
        self.inner.lock().evaluate(now)
    }

    /// Return to the zeroed state.
    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// Time left on the current lockout at `now`.
    pub fn remaining_lockout(&self, now: Duration) -> Duration {
        self.inner.lock().remaining_lockout(now)
    }

    /// Attempts left before lockout, as of the last check.
    pub fn remaining_attempts(&self) -> u32 {
        self.inner.lock().remaining_attempts()
    }

    /// Whether the subject was locked out as of the last check.
    pub fn is_blocked(&self) -> bool {
        self.inner.lock().is_blocked()
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ThrottleState {
        self.inner.lock().state()
    }
}
