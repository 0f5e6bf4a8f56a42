//! Retrial policy: decides when a failing record is given up on.

use serde::{Deserialize, Serialize};

/// Retry-limit policy for failed deliveries.
///
/// There is no backoff: a failed record is retried on the next claim cycle.
/// When disabled, a record stays `PendingDelivery` no matter how many times
/// delivery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrialPolicy {
    pub max_send_attempts_enabled: bool,
    pub max_send_attempts: u32,
}

impl RetrialPolicy {
    pub fn unlimited() -> Self {
        Self {
            max_send_attempts_enabled: false,
            ..Self::default()
        }
    }

    pub fn limited(max_send_attempts: u32) -> Self {
        Self {
            max_send_attempts_enabled: true,
            max_send_attempts,
        }
    }

    /// Should a record that has made `attempts` attempts be marked as
    /// `MaxAttemptsReached`?
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_send_attempts_enabled && attempts >= self.max_send_attempts
    }
}

impl Default for RetrialPolicy {
    fn default() -> Self {
        Self {
            max_send_attempts_enabled: false,
            max_send_attempts: 5,
        }
    }
}
