//! RecordCleaner - 保持期間を過ぎた Record の削除

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::cutoff_before;
use crate::domain::OutboxError;
use crate::ports::{Clock, OutboxStore, SystemClock};

/// Deletes records created before `now - retention`.
///
/// By default the state is ignored, so a record still waiting for delivery
/// is dropped once it is old enough. `terminal_only` narrows the sweep to
/// `Delivered` and `MaxAttemptsReached` records.
pub struct RecordCleaner<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    terminal_only: bool,
}

impl<S: OutboxStore> RecordCleaner<S> {
    pub fn new(store: Arc<S>, retention: Duration) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            retention,
            terminal_only: false,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn terminal_only(mut self, terminal_only: bool) -> Self {
        self.terminal_only = terminal_only;
        self
    }

    /// Returns how many records were deleted.
    pub async fn remove_expired_messages(&self) -> Result<u64, OutboxError> {
        let expiry = cutoff_before(self.clock.now(), self.retention);
        let removed = if self.terminal_only {
            self.store
                .remove_finished_records_before_datetime(expiry)
                .await?
        } else {
            self.store.remove_records_before_datetime(expiry).await?
        };

        if removed > 0 {
            info!(removed, %expiry, terminal_only = self.terminal_only, "removed expired records");
        }
        Ok(removed)
    }
}
