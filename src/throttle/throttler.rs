//! Core attempt throttler state machine.

use std::time::Duration;
use tracing::{debug, trace, warn};

use super::policy::ThrottlePolicy;
use crate::error::{Result, ThrottleError};

/// Mutable throttle state for one subject.
///
/// Timestamps are offsets from whatever origin the caller's clock uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleState {
    /// Attempts counted in the current window
    pub attempts: u32,
    /// Time of the most recent counted attempt, `None` if there was none
    pub last_attempt: Option<Duration>,
    /// Whether the subject was locked out as of the last check
    pub is_blocked: bool,
    /// When the lockout expires, `None` if not locked out
    pub block_until: Option<Duration>,
}

/// Outcome of a single attempt check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The attempt is permitted; `remaining` more fit in the current window.
    Allowed { remaining: u32 },
    /// The attempt is refused until `retry_after` has elapsed.
    Denied { retry_after: Duration },
}

impl Decision {
    /// Whether the attempt was permitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Time the caller has to wait before retrying, zero when allowed.
    pub fn retry_after(&self) -> Duration {
        match self {
            Decision::Allowed { .. } => Duration::ZERO,
            Decision::Denied { retry_after } => *retry_after,
        }
    }
}

/// Guards one subject against bursts of attempts.
///
/// Attempts closer together than the policy's window are counted; once the
/// count reaches `max_attempts` the subject is locked out for the cooldown
/// period. The lockout is lifted lazily by the next check after it expires,
/// so `is_blocked` may be stale in between. Use [`Self::is_locked_at`] for a
/// live answer.
#[derive(Debug, Clone)]
pub struct AttemptThrottler {
    policy: ThrottlePolicy,
    state: ThrottleState,
}

impl AttemptThrottler {
    /// Create a throttler with zeroed state.
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self {
            policy,
            state: ThrottleState::default(),
        }
    }

    /// Record an attempt at `now` and report whether it is permitted.
    ///
    /// A `now` earlier than the last counted attempt is clamped to it.
    pub fn check_attempt(&mut self, now: Duration) -> bool {
        self.evaluate(now).is_allowed()
    }

    /// Like [`Self::check_attempt`], but rejects a regressing `now` instead of
    /// clamping it. State is untouched on error.
    pub fn try_check_attempt(&mut self, now: Duration) -> Result<bool> {
        if let Some(last_seen) = self.state.last_attempt {
            if now < last_seen {
                return Err(ThrottleError::ClockRegression { now, last_seen });
            }
        }
        Ok(self.evaluate_at(now).is_allowed())
    }

    /// Record an attempt at `now` and return the full decision.
    pub fn evaluate(&mut self, now: Duration) -> Decision {
        let now = self.clamp(now);
        self.evaluate_at(now)
    }

    /// Return to the zeroed state.
    pub fn reset(&mut self) {
        self.state = ThrottleState::default();
    }

    /// Time left on the current lockout, zero if none is in force at `now`.
    pub fn remaining_lockout(&self, now: Duration) -> Duration {
        self.state
            .block_until
            .map(|until| until.saturating_sub(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Attempts left before lockout, as of the last check.
    pub fn remaining_attempts(&self) -> u32 {
        self.policy.max_attempts().saturating_sub(self.state.attempts)
    }

    /// Whether a lockout is actually in force at `now`.
    pub fn is_locked_at(&self, now: Duration) -> bool {
        !self.remaining_lockout(now).is_zero()
    }

    /// Whether no lockout or open window would influence a check at `now`.
    ///
    /// An idle throttler behaves exactly like a freshly created one.
    pub fn is_idle_at(&self, now: Duration) -> bool {
        if self.is_locked_at(now) {
            return false;
        }
        match self.state.last_attempt {
            Some(last) => now.saturating_sub(last) >= self.policy.time_window(),
            None => true,
        }
    }

    /// Whether the subject was locked out as of the last check.
    pub fn is_blocked(&self) -> bool {
        self.state.is_blocked
    }

    /// Attempts counted in the current window as of the last check.
    pub fn attempts(&self) -> u32 {
        self.state.attempts
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ThrottleState {
        self.state
    }

    /// The policy this throttler enforces.
    pub fn policy(&self) -> &ThrottlePolicy {
        &self.policy
    }

    fn clamp(&self, now: Duration) -> Duration {
        match self.state.last_attempt {
            Some(last_seen) if now < last_seen => {
                warn!(
                    now = ?now,
                    last_seen = ?last_seen,
                    "Clock regressed, clamping to last attempt"
                );
                last_seen
            }
            _ => now,
        }
    }

    /// Apply the policy at `now`, which must not precede `last_attempt`.
    fn evaluate_at(&mut self, now: Duration) -> Decision {
        if self.state.is_blocked {
            match self.state.block_until {
                Some(until) if now < until => {
                    trace!(retry_after = ?(until - now), "Attempt denied during lockout");
                    return Decision::Denied {
                        retry_after: until - now,
                    };
                }
                _ => {
                    debug!(now = ?now, "Lockout expired, reopening");
                    self.state = ThrottleState::default();
                }
            }
        }

        let max_attempts = self.policy.max_attempts();
        let within_window = match self.state.last_attempt {
            Some(last) => now.saturating_sub(last) < self.policy.time_window(),
            None => false,
        };

        if !within_window {
            self.state.attempts = 1;
            self.state.last_attempt = Some(now);
            trace!(attempts = 1, "Attempt opens a new window");
            return Decision::Allowed {
                remaining: max_attempts.saturating_sub(1),
            };
        }

        let new_attempts = self.state.attempts.saturating_add(1);
        self.state.last_attempt = Some(now);

        if new_attempts >= max_attempts {
            let until = now.saturating_add(self.policy.cooldown_period());
            // A single-attempt policy would otherwise count past the cap.
            self.state.attempts = new_attempts.min(max_attempts);
            self.state.is_blocked = true;
            self.state.block_until = Some(until);
            debug!(
                attempts = new_attempts,
                max_attempts = max_attempts,
                block_until = ?until,
                "Attempt limit reached, locking out"
            );
            return Decision::Denied {
                retry_after: until - now,
            };
        }

        self.state.attempts = new_attempts;
        trace!(attempts = new_attempts, "Attempt counted");
        Decision::Allowed {
            remaining: max_attempts - new_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn login_policy() -> ThrottlePolicy {
        ThrottlePolicy::new(3, secs(60), secs(300)).unwrap()
    }

    #[test]
    fn test_new_throttler_is_zeroed() {
        let throttler = AttemptThrottler::new(login_policy());

        assert_eq!(throttler.state(), ThrottleState::default());
        assert_eq!(throttler.remaining_attempts(), 3);
        assert_eq!(throttler.remaining_lockout(secs(0)), Duration::ZERO);
        assert!(!throttler.is_blocked());
    }

    #[test]
    fn test_login_scenario() {
        let mut throttler = AttemptThrottler::new(login_policy());

        assert!(throttler.check_attempt(secs(0)));
        assert!(throttler.check_attempt(secs(10)));
        assert!(!throttler.check_attempt(secs(20)));

        let state = throttler.state();
        assert!(state.is_blocked);
        assert_eq!(state.block_until, Some(secs(320)));
        assert_eq!(state.attempts, 3);

        assert!(!throttler.check_attempt(secs(100)));

        assert!(throttler.check_attempt(secs(321)));
        assert_eq!(throttler.attempts(), 1);
        assert!(!throttler.is_blocked());
        assert_eq!(throttler.state().block_until, None);
    }

    #[test]
    fn test_gap_longer_than_window_restarts_count() {
        let mut throttler = AttemptThrottler::new(login_policy());

        assert!(throttler.check_attempt(secs(0)));
        assert!(throttler.check_attempt(secs(1000)));
        assert_eq!(throttler.attempts(), 1);
    }

    #[test]
    fn test_cap_reached_on_max_attempts_th_call() {
        for max_attempts in 2..=8 {
            let policy = ThrottlePolicy::new(max_attempts, secs(60), secs(300)).unwrap();
            let mut throttler = AttemptThrottler::new(policy);

            for i in 0..max_attempts - 1 {
                assert!(
                    throttler.check_attempt(secs(u64::from(i))),
                    "attempt {} of {} should be allowed",
                    i + 1,
                    max_attempts
                );
            }
            assert!(!throttler.check_attempt(secs(u64::from(max_attempts))));
            assert_eq!(throttler.attempts(), max_attempts);
        }
    }

    #[test]
    fn test_denial_during_lockout_is_idempotent() {
        let mut throttler = AttemptThrottler::new(login_policy());
        throttler.check_attempt(secs(0));
        throttler.check_attempt(secs(10));
        throttler.check_attempt(secs(20));
        let locked = throttler.state();

        for t in [21, 100, 200, 319] {
            assert!(!throttler.check_attempt(secs(t)));
            assert_eq!(throttler.state(), locked);
        }
    }

    #[test]
    fn test_unlock_exactly_at_block_until() {
        let mut throttler = AttemptThrottler::new(login_policy());
        throttler.check_attempt(secs(0));
        throttler.check_attempt(secs(10));
        throttler.check_attempt(secs(20));

        assert!(throttler.check_attempt(secs(320)));
        assert_eq!(throttler.attempts(), 1);
        assert_eq!(throttler.state().last_attempt, Some(secs(320)));
    }

    #[test]
    fn test_repeated_lockouts_use_same_cooldown() {
        let mut throttler = AttemptThrottler::new(login_policy());
        for t in [0, 10, 20] {
            throttler.check_attempt(secs(t));
        }
        assert_eq!(throttler.state().block_until, Some(secs(320)));

        for t in [320, 330, 340] {
            throttler.check_attempt(secs(t));
        }
        assert_eq!(throttler.state().block_until, Some(secs(640)));
        assert_eq!(throttler.remaining_lockout(secs(340)), secs(300));
    }

    #[test]
    fn test_evaluate_reports_remaining_and_retry_after() {
        let mut throttler = AttemptThrottler::new(login_policy());

        assert_eq!(throttler.evaluate(secs(0)), Decision::Allowed { remaining: 2 });
        assert_eq!(throttler.evaluate(secs(10)), Decision::Allowed { remaining: 1 });
        assert_eq!(
            throttler.evaluate(secs(20)),
            Decision::Denied { retry_after: secs(300) }
        );

        let decision = throttler.evaluate(secs(100));
        assert!(!decision.is_allowed());
        assert_eq!(decision.retry_after(), secs(220));
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut throttler = AttemptThrottler::new(login_policy());
        for t in [0, 10, 20] {
            throttler.check_attempt(secs(t));
        }

        throttler.reset();
        throttler.reset();

        assert_eq!(throttler.state(), ThrottleState::default());
        assert_eq!(throttler.remaining_attempts(), 3);
        assert_eq!(throttler.remaining_lockout(secs(25)), Duration::ZERO);
        assert!(throttler.check_attempt(secs(30)));
    }

    #[test]
    fn test_remaining_attempts_non_increasing_within_window() {
        let policy = ThrottlePolicy::new(5, secs(60), secs(300)).unwrap();
        let mut throttler = AttemptThrottler::new(policy);
        let mut previous = throttler.remaining_attempts();

        for t in 0..10 {
            throttler.check_attempt(secs(t));
            let remaining = throttler.remaining_attempts();
            assert!(remaining <= previous);
            previous = remaining;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn test_remaining_lockout_lapses_before_lazy_transition() {
        let mut throttler = AttemptThrottler::new(login_policy());
        for t in [0, 10, 20] {
            throttler.check_attempt(secs(t));
        }

        assert_eq!(throttler.remaining_lockout(secs(20)), secs(300));
        assert_eq!(throttler.remaining_lockout(secs(319)), secs(1));
        assert_eq!(throttler.remaining_lockout(secs(400)), Duration::ZERO);

        // The flag stays stale until the next check.
        assert!(throttler.is_blocked());
        assert!(!throttler.is_locked_at(secs(400)));
        assert!(throttler.is_locked_at(secs(319)));
    }

    #[test]
    fn test_idle_after_window_and_lockout_lapse() {
        let mut throttler = AttemptThrottler::new(login_policy());
        assert!(throttler.is_idle_at(secs(0)));

        throttler.check_attempt(secs(0));
        assert!(!throttler.is_idle_at(secs(59)));
        assert!(throttler.is_idle_at(secs(60)));

        for t in [100, 110, 120] {
            throttler.check_attempt(secs(t));
        }
        assert!(!throttler.is_idle_at(secs(300)));
        assert!(!throttler.is_idle_at(secs(419)));
        assert!(throttler.is_idle_at(secs(420)));
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = ThrottlePolicy::new(1, secs(60), secs(30)).unwrap();
        let mut throttler = AttemptThrottler::new(policy);

        assert!(throttler.check_attempt(secs(0)));
        assert!(!throttler.check_attempt(secs(5)));
        assert_eq!(throttler.attempts(), 1);
        assert_eq!(throttler.remaining_attempts(), 0);
        assert_eq!(throttler.state().block_until, Some(secs(35)));
    }

    #[test]
    fn test_regressing_clock_is_clamped() {
        let mut throttler = AttemptThrottler::new(login_policy());

        assert!(throttler.check_attempt(secs(50)));
        assert!(throttler.check_attempt(secs(40)));
        assert_eq!(throttler.attempts(), 2);
        assert_eq!(throttler.state().last_attempt, Some(secs(50)));
    }

    #[test]
    fn test_regressing_clock_during_lockout_stays_denied() {
        let mut throttler = AttemptThrottler::new(login_policy());
        for t in [100, 110, 120] {
            throttler.check_attempt(secs(t));
        }

        assert!(!throttler.check_attempt(secs(5)));
        assert_eq!(throttler.state().block_until, Some(secs(420)));
    }

    #[test]
    fn test_lockout_near_clock_limit_saturates() {
        let policy = ThrottlePolicy::new(2, secs(60), secs(300)).unwrap();
        let mut throttler = AttemptThrottler::new(policy);
        let late = Duration::MAX - secs(10);

        assert!(throttler.check_attempt(late));
        assert_eq!(
            throttler.evaluate(late),
            Decision::Denied { retry_after: secs(10) }
        );
        assert_eq!(throttler.state().block_until, Some(Duration::MAX));
        assert_eq!(throttler.remaining_lockout(late), secs(10));
        assert!(!throttler.check_attempt(Duration::MAX - secs(1)));
    }

    #[test]
    fn test_strict_check_rejects_regression() {
        let mut throttler = AttemptThrottler::new(login_policy());
        throttler.check_attempt(secs(50));
        let before = throttler.state();

        let err = throttler.try_check_attempt(secs(49)).unwrap_err();
        assert!(matches!(
            err,
            ThrottleError::ClockRegression { now, last_seen }
                if now == secs(49) && last_seen == secs(50)
        ));
        assert_eq!(throttler.state(), before);

        assert!(throttler.try_check_attempt(secs(50)).unwrap());
    }
}
