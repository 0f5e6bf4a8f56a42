//! Record state machine.

use serde::{Deserialize, Serialize};

/// Delivery state of an outbox record.
///
/// State transitions:
/// - PendingDelivery -> Delivered
/// - PendingDelivery -> MaxAttemptsReached (only when the retrial policy is enabled)
///
/// Terminal states never revert. The discriminants are the values stored in
/// the `state` column.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordState {
    /// Waiting to be claimed and delivered.
    PendingDelivery = 1,

    /// Accepted by the broker.
    Delivered = 2,

    /// Gave up after the configured number of attempts.
    MaxAttemptsReached = 3,
}

impl RecordState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordState::Delivered | RecordState::MaxAttemptsReached)
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl TryFrom<i16> for RecordState {
    type Error = i16;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(RecordState::PendingDelivery),
            2 => Ok(RecordState::Delivered),
            3 => Ok(RecordState::MaxAttemptsReached),
            other => Err(other),
        }
    }
}
