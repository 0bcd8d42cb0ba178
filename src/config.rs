//! Configuration management for the attempt throttler.
//!
//! Policies are configured per guarded action (e.g. `login`,
//! `reset_password`), with a default policy for actions that have none.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ThrottleError};
use crate::throttle::ThrottlePolicy;

/// Prefix for environment overrides, e.g. `THROTTLE__DEFAULT_POLICY__MAX_ATTEMPTS`.
const ENV_PREFIX: &str = "THROTTLE";

/// Main configuration for the throttler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThrottlerConfig {
    /// Policy applied to actions without their own entry
    #[serde(default)]
    pub default_policy: PolicyConfig,

    /// Named policies keyed by action
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,
}

/// Policy limits as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Attempts allowed inside one window before lockout
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sliding window length in seconds
    #[serde(default = "default_time_window")]
    pub time_window_secs: u64,

    /// Lockout duration in seconds
    #[serde(default = "default_cooldown_period")]
    pub cooldown_period_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            time_window_secs: default_time_window(),
            cooldown_period_secs: default_cooldown_period(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_time_window() -> u64 {
    60
}

fn default_cooldown_period() -> u64 {
    300
}

impl PolicyConfig {
    /// Convert into a validated policy.
    pub fn to_policy(&self) -> Result<ThrottlePolicy> {
        ThrottlePolicy::new(
            self.max_attempts,
            Duration::from_secs(self.time_window_secs),
            Duration::from_secs(self.cooldown_period_secs),
        )
    }
}

impl ThrottlerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttler configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    ///
    /// Policy names are matched case-insensitively and stored lowercased.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ThrottlerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ThrottleError::Config(format!("Failed to parse throttler config: {}", e)))?;
        Ok(config.normalized())
    }

    /// Load configuration from defaults, an optional file and environment
    /// overrides, in increasing order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&base)?)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let config: ThrottlerConfig = settings.try_deserialize()?;
        Ok(config.normalized())
    }

    /// Look up a named policy.
    pub fn policy(&self, name: &str) -> Result<ThrottlePolicy> {
        self.policies
            .get(&name.to_lowercase())
            .ok_or_else(|| ThrottleError::UnknownPolicy(name.to_string()))?
            .to_policy()
    }

    /// The named policy if configured, otherwise the default policy.
    pub fn policy_or_default(&self, name: &str) -> Result<ThrottlePolicy> {
        self.policies
            .get(&name.to_lowercase())
            .unwrap_or(&self.default_policy)
            .to_policy()
    }

    /// Check that every configured policy is usable.
    pub fn validate(&self) -> Result<()> {
        self.default_policy.to_policy()?;
        for config in self.policies.values() {
            config.to_policy()?;
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        self.policies = self
            .policies
            .into_iter()
            .map(|(name, policy)| (name.to_lowercase(), policy))
            .collect();
        self
    }

    /// Configured policy names in sorted order.
    pub fn policy_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
