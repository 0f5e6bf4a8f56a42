//! Outbox record: message + delivery bookkeeping.

use chrono::{DateTime, Utc};

use super::errors::OutboxError;
use super::ids::RecordId;
use super::message::Message;
use super::policy::RetrialPolicy;
use super::state::RecordState;

/// Processing lock held by one dispatcher.
///
/// Owner and timestamp live in one value so a record can never carry one
/// without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLock {
    pub lock_id: String,
    pub locked_on: DateTime<Utc>,
}

/// One queued, in-flight, or completed outbox entry.
///
/// Design:
/// - Created once by the publisher inside the caller's transaction.
/// - The processor drives every state transition through the methods below.
/// - The unlocker only ever touches `lock`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub message: Message,
    pub state: RecordState,
    pub created_on: DateTime<Utc>,
    pub lock: Option<RecordLock>,
    pub processed_on: Option<DateTime<Utc>>,

    /// Number of delivery attempts made so far. Never decreases.
    pub number_of_attempts: u32,
    pub last_attempt_on: Option<DateTime<Utc>>,

    /// Error text of the most recent failed attempt.
    pub error: Option<String>,
}

impl Record {
    /// A fresh `PendingDelivery` record with no lock, attempts or error.
    pub fn new(id: RecordId, message: Message, created_on: DateTime<Utc>) -> Self {
        Self {
            id,
            message,
            state: RecordState::PendingDelivery,
            created_on,
            lock: None,
            processed_on: None,
            number_of_attempts: 0,
            last_attempt_on: None,
            error: None,
        }
    }

    pub fn lock_id(&self) -> Option<&str> {
        self.lock.as_ref().map(|l| l.lock_id.as_str())
    }

    pub fn locked_on(&self) -> Option<DateTime<Utc>> {
        self.lock.as_ref().map(|l| l.locked_on)
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    pub fn lock(&mut self, lock_id: impl Into<String>, locked_on: DateTime<Utc>) {
        self.lock = Some(RecordLock {
            lock_id: lock_id.into(),
            locked_on,
        });
    }

    pub fn release_lock(&mut self) {
        self.lock = None;
    }

    /// Stamp the attempt time and bump the counter.
    pub fn start_attempt(&mut self, now: DateTime<Utc>) {
        self.last_attempt_on = Some(now);
        self.number_of_attempts += 1;
    }

    /// PendingDelivery -> Delivered.
    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<(), OutboxError> {
        self.ensure_pending(RecordState::Delivered)?;
        self.state = RecordState::Delivered;
        self.processed_on = Some(now);
        self.release_lock();
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Stays `PendingDelivery` unless `policy` says the attempts are used up,
    /// in which case the record becomes `MaxAttemptsReached`.
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        policy: &RetrialPolicy,
    ) -> Result<(), OutboxError> {
        let next = if policy.is_exhausted(self.number_of_attempts) {
            RecordState::MaxAttemptsReached
        } else {
            RecordState::PendingDelivery
        };
        self.ensure_pending(next)?;

        self.release_lock();
        self.error = Some(error.into());
        self.state = next;
        Ok(())
    }

    fn ensure_pending(&self, to: RecordState) -> Result<(), OutboxError> {
        if self.state.is_terminal() {
            return Err(OutboxError::InvalidTransition {
                record_id: self.id,
                from: self.state,
                to,
            });
        }
        Ok(())
    }
}
