//! RecordUnlocker - 期限切れロックの回収
//!
//! claim したまま落ちた dispatcher のロックを外し、
//! Record を再び claim 可能にする。状態や試行回数には触らない。

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::cutoff_before;
use crate::domain::OutboxError;
use crate::ports::{Clock, OutboxStore, SystemClock};

pub struct RecordUnlocker<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    max_lock_time_duration: Duration,
}

impl<S: OutboxStore> RecordUnlocker<S> {
    pub fn new(store: Arc<S>, max_lock_time_duration: Duration) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            max_lock_time_duration,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Release every lock taken before `now - max_lock_time_duration`.
    ///
    /// Returns how many records were unlocked.
    pub async fn unlock_expired_messages(&self) -> Result<u64, OutboxError> {
        let expiry = cutoff_before(self.clock.now(), self.max_lock_time_duration);
        let unlocked = self
            .store
            .clear_locks_with_duration_before_date(expiry)
            .await?;

        // 正常運転なら 0 件のはず。非 0 は dispatcher の異常終了を示す
        if unlocked > 0 {
            warn!(unlocked, %expiry, "released expired record locks");
        }
        Ok(unlocked)
    }
}
