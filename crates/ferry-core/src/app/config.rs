use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::RetrialPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("retrial_policy.max_send_attempts must be at least 1 when the policy is enabled")]
    NoSendAttempts,
}

/// Dispatcher configuration, deserializable from TOML.
///
/// Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// How often the processor claims and delivers pending records.
    pub process_interval_ms: u64,

    /// How often the unlocker looks for stale locks.
    pub lock_checker_interval_ms: u64,

    /// Locks older than this are considered abandoned.
    pub max_lock_time_duration_ms: u64,

    /// How often the cleaner deletes expired records.
    pub cleanup_worker_interval_ms: u64,

    pub retrial_policy: RetrialPolicy,

    /// Records older than this are deleted.
    pub messages_retention_duration_ms: u64,

    /// Only delete `Delivered` / `MaxAttemptsReached` records when cleaning up.
    pub cleanup_terminal_only: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            process_interval_ms: 5_000,
            lock_checker_interval_ms: 60_000,
            max_lock_time_duration_ms: 300_000,
            cleanup_worker_interval_ms: 3_600_000,
            retrial_policy: RetrialPolicy::default(),
            messages_retention_duration_ms: 7 * 24 * 3_600_000,
            cleanup_terminal_only: false,
        }
    }
}

impl DispatcherConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Fail-fast check run by `Dispatcher::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("process_interval_ms", self.process_interval_ms),
            ("lock_checker_interval_ms", self.lock_checker_interval_ms),
            ("max_lock_time_duration_ms", self.max_lock_time_duration_ms),
            ("cleanup_worker_interval_ms", self.cleanup_worker_interval_ms),
            (
                "messages_retention_duration_ms",
                self.messages_retention_duration_ms,
            ),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::Zero(*name));
        }
        if self.retrial_policy.max_send_attempts_enabled && self.retrial_policy.max_send_attempts == 0
        {
            return Err(ConfigError::NoSendAttempts);
        }
        Ok(())
    }

    pub fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms)
    }

    pub fn lock_checker_interval(&self) -> Duration {
        Duration::from_millis(self.lock_checker_interval_ms)
    }

    pub fn max_lock_time_duration(&self) -> Duration {
        Duration::from_millis(self.max_lock_time_duration_ms)
    }

    pub fn cleanup_worker_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_worker_interval_ms)
    }

    pub fn messages_retention_duration(&self) -> Duration {
        Duration::from_millis(self.messages_retention_duration_ms)
    }
}
