//! Engine tuning knobs, loadable from TOML files and environment variables.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::error::ConfigError;

// ============================================================================
// Default value functions
// ============================================================================

fn default_max_attempts() -> usize {
    3
}

fn default_max_batch_errors() -> usize {
    10
}

fn default_lock_ttl_seconds() -> u64 {
    300
}

fn default_idle_poll_interval_ms() -> u64 {
    10_000
}

fn default_busy_poll_interval_ms() -> u64 {
    500
}

fn default_drain_poll_interval_ms() -> u64 {
    250
}

/// Engine-wide settings. Every field has a default; an empty configuration
/// is a valid one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Attempt budget per task. A task retires once it reaches this many
    /// attempts, successful or not.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// How many recent task failures a batch keeps.
    #[serde(default = "default_max_batch_errors")]
    pub max_batch_errors: usize,

    /// Lease duration for task and source locks. Longer than any expected
    /// task, short enough to reclaim after a crash.
    #[serde(default = "default_lock_ttl_seconds")]
    pub lock_ttl_seconds: u64,

    /// Wait between polling ticks that found no work.
    #[serde(default = "default_idle_poll_interval_ms")]
    pub idle_poll_interval_ms: u64,

    /// Wait between polling ticks while work remains.
    #[serde(default = "default_busy_poll_interval_ms")]
    pub busy_poll_interval_ms: u64,

    /// Poll interval while draining in-flight interval jobs on shutdown.
    #[serde(default = "default_drain_poll_interval_ms")]
    pub drain_poll_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_batch_errors: default_max_batch_errors(),
            lock_ttl_seconds: default_lock_ttl_seconds(),
            idle_poll_interval_ms: default_idle_poll_interval_ms(),
            busy_poll_interval_ms: default_busy_poll_interval_ms(),
            drain_poll_interval_ms: default_drain_poll_interval_ms(),
        }
    }
}

impl EngineSettings {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn busy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.busy_poll_interval_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::validation(
                "max_attempts",
                "must be at least 1",
            ));
        }
        if self.max_batch_errors == 0 {
            return Err(ConfigError::validation(
                "max_batch_errors",
                "must be at least 1",
            ));
        }
        if self.lock_ttl_seconds == 0 {
            return Err(ConfigError::validation(
                "lock_ttl_seconds",
                "a zero lease would expire immediately",
            ));
        }
        if self.drain_poll_interval_ms == 0 {
            return Err(ConfigError::validation(
                "drain_poll_interval_ms",
                "must be at least 1",
            ));
        }
        if self.busy_poll_interval_ms > self.idle_poll_interval_ms {
            return Err(ConfigError::validation(
                "busy_poll_interval_ms",
                "must not exceed idle_poll_interval_ms",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = EngineSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.lock_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let settings: EngineSettings = toml::from_str("").unwrap();
        assert_eq!(settings, EngineSettings::default());
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let settings: EngineSettings = toml::from_str(
            r#"
            max_attempts = 5
            busy_poll_interval_ms = 100
            "#,
        )
        .unwrap();
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.busy_poll_interval_ms, 100);
        assert_eq!(settings.lock_ttl_seconds, 300);
    }

    #[test]
    fn zero_attempt_budget_is_rejected() {
        let settings = EngineSettings {
            max_attempts: 0,
            ..EngineSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "max_attempts"
        ));
    }

    #[test]
    fn busy_interval_longer_than_idle_is_rejected() {
        let settings = EngineSettings {
            busy_poll_interval_ms: 60_000,
            idle_poll_interval_ms: 1_000,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
