//! In-process registry of per-subject throttlers.

use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock};
use super::policy::ThrottlePolicy;
use super::subject::SubjectKey;
use super::throttler::{AttemptThrottler, Decision};
use crate::config::ThrottlerConfig;
use crate::error::Result;

/// Tracks one throttler per subject, created on first attempt.
///
/// The policy for a subject is chosen by its action name, falling back to
/// the default policy. Checks for one subject are serialized by the map's
/// entry lock; different subjects do not contend.
pub struct ThrottleRegistry<C: Clock = MonotonicClock> {
    /// Throttlers indexed by subject key
    throttlers: DashMap<SubjectKey, AttemptThrottler>,
    /// Policies indexed by action name
    policies: HashMap<String, ThrottlePolicy>,
    /// Policy for actions without their own entry
    default_policy: ThrottlePolicy,
    clock: C,
}

impl ThrottleRegistry<MonotonicClock> {
    /// Create a registry driven by the process's monotonic clock.
    pub fn new(default_policy: ThrottlePolicy) -> Self {
        Self::with_clock(default_policy, MonotonicClock::new())
    }
}

impl<C: Clock> ThrottleRegistry<C> {
    /// Create a registry driven by `clock`.
    pub fn with_clock(default_policy: ThrottlePolicy, clock: C) -> Self {
        Self {
            throttlers: DashMap::new(),
            policies: HashMap::new(),
            default_policy,
            clock,
        }
    }

    /// Build a registry from validated configuration.
    pub fn from_config(config: &ThrottlerConfig, clock: C) -> Result<Self> {
        let mut registry = Self::with_clock(config.default_policy.to_policy()?, clock);
        for (action, policy) in &config.policies {
            registry
                .policies
                .insert(action.to_lowercase(), policy.to_policy()?);
        }
        Ok(registry)
    }

    /// Register the policy used for `action`.
    pub fn with_policy(mut self, action: impl Into<String>, policy: ThrottlePolicy) -> Self {
        self.policies.insert(action.into().to_lowercase(), policy);
        self
    }

    /// The policy that applies to `action`, matched case-insensitively.
    pub fn policy_for(&self, action: &str) -> ThrottlePolicy {
        self.policies
            .get(&action.to_lowercase())
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Record an attempt by `key` now.
    pub fn check(&self, key: &SubjectKey) -> Decision {
        self.check_at(key, self.clock.now())
    }

    /// Record an attempt by `key` at `now`.
    ///
    /// `now` must be a reading in this registry's clock timebase: the
    /// `remaining_lockout` and `purge_idle` queries read that clock and
    /// compare against the timestamps recorded here.
    pub fn check_at(&self, key: &SubjectKey, now: Duration) -> Decision {
        trace!(subject = %key, "Checking attempt");

        let mut throttler = self
            .throttlers
            .entry(key.clone())
            .or_insert_with(|| {
                let policy = self.policy_for(&key.action);
                debug!(
                    subject = %key,
                    max_attempts = policy.max_attempts(),
                    time_window = ?policy.time_window(),
                    cooldown_period = ?policy.cooldown_period(),
                    "Creating throttler"
                );
                AttemptThrottler::new(policy)
            });

        let decision = throttler.evaluate(now);
        if let Decision::Denied { retry_after } = decision {
            debug!(subject = %key, retry_after = ?retry_after, "Attempt denied");
        }
        decision
    }

    /// Forget everything recorded for `key`, e.g. after a successful login.
    pub fn reset(&self, key: &SubjectKey) {
        if self.throttlers.remove(key).is_some() {
            debug!(subject = %key, "Throttler reset");
        }
    }

    /// Time left on `key`'s lockout.
    pub fn remaining_lockout(&self, key: &SubjectKey) -> Duration {
        let now = self.clock.now();
        self.throttlers
            .get(key)
            .map(|throttler| throttler.remaining_lockout(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Attempts left for `key` as of its last check.
    pub fn remaining_attempts(&self, key: &SubjectKey) -> u32 {
        match self.throttlers.get(key) {
            Some(throttler) => throttler.remaining_attempts(),
            None => self.policy_for(&key.action).max_attempts(),
        }
    }

    /// Drop throttlers that would behave like fresh ones. Returns how many
    /// were removed.
    pub fn purge_idle(&self) -> usize {
        let now = self.clock.now();
        let before = self.throttlers.len();
        self.throttlers
            .retain(|_, throttler| !throttler.is_idle_at(now));
        let purged = before.saturating_sub(self.throttlers.len());
        if purged > 0 {
            debug!(purged = purged, "Purged idle throttlers");
        }
        purged
    }

    /// Number of tracked subjects.
    pub fn len(&self) -> usize {
        self.throttlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.throttlers.is_empty()
    }

    /// Clear all throttlers.
    pub fn clear(&self) {
        self.throttlers.clear();
    }
}
