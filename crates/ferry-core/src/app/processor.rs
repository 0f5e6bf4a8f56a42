//! RecordProcessor - claim → 配送 → 状態更新
//!
//! # フロー
//! 1. `update_record_lock_by_state` で PendingDelivery かつ未ロックの Record を一括 claim
//! 2. `get_records_by_lock_id` で自分のロック分を古い順に取得
//! 3. 1 件ずつ broker に送信し、結果を `update_record_by_id` で保存
//! 4. 最初の失敗でバッチを打ち切る
//! 5. どの経路で抜けても `clear_locks_by_lock_id` で残りのロックを解放

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::domain::{MachineId, OutboxError, Record, RecordState, RetrialPolicy};
use crate::ports::{Clock, MessageBroker, OutboxStore, SystemClock};

/// Result of one successful `process_records` pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessReport {
    /// Records this machine locked in the claim step.
    pub claimed: u64,
    /// Records handed to the broker successfully.
    pub delivered: usize,
}

pub struct RecordProcessor<S, B> {
    store: Arc<S>,
    broker: Arc<B>,
    clock: Arc<dyn Clock>,
    machine_id: MachineId,
    retrial_policy: RetrialPolicy,
}

impl<S: OutboxStore, B: MessageBroker> RecordProcessor<S, B> {
    pub fn new(
        retrial_policy: RetrialPolicy,
        store: Arc<S>,
        broker: Arc<B>,
        machine_id: MachineId,
    ) -> Self {
        Self {
            store,
            broker,
            clock: Arc::new(SystemClock),
            machine_id,
            retrial_policy,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    /// Claim every deliverable record and push them to the broker in order.
    ///
    /// Returns the first error hit. A broker failure is saved on the record
    /// before the pass stops, and the remaining claimed records are unlocked
    /// for the next pass.
    pub async fn process_records(&self) -> Result<ProcessReport, OutboxError> {
        let lock_id = self.machine_id.as_str();
        let result = self.claim_and_deliver(lock_id).await;

        // Lock release runs on every exit path. Its own failure is only
        // logged; stale locks are picked up by the unlocker later.
        match self.store.clear_locks_by_lock_id(lock_id).await {
            Ok(0) => {}
            Ok(released) => debug!(machine_id = %self.machine_id, released, "released unprocessed locks"),
            Err(e) => error!(machine_id = %self.machine_id, error = %e, "failed to release locks"),
        }

        result
    }

    async fn claim_and_deliver(&self, lock_id: &str) -> Result<ProcessReport, OutboxError> {
        let claimed = self
            .store
            .update_record_lock_by_state(lock_id, self.clock.now(), RecordState::PendingDelivery)
            .await?;
        let mut report = ProcessReport {
            claimed,
            delivered: 0,
        };

        // 前回の異常終了で残った自分のロックも同じパスで配送する
        let records = self.store.get_records_by_lock_id(lock_id).await?;
        debug!(machine_id = %self.machine_id, claimed, fetched = records.len(), "claimed records");

        for record in records {
            self.deliver(record).await?;
            report.delivered += 1;
        }
        Ok(report)
    }

    async fn deliver(&self, mut record: Record) -> Result<(), OutboxError> {
        record.start_attempt(self.clock.now());

        match self.broker.send(&record.message).await {
            Ok(()) => {
                record.mark_delivered(self.clock.now())?;
                self.store.update_record_by_id(&record).await?;
                debug!(record_id = %record.id, attempts = record.number_of_attempts, "record delivered");
                Ok(())
            }
            Err(source) => {
                record.mark_failed(source.to_string(), &self.retrial_policy)?;
                self.store.update_record_by_id(&record).await?;
                if record.state == RecordState::MaxAttemptsReached {
                    warn!(
                        record_id = %record.id,
                        attempts = record.number_of_attempts,
                        "giving up on record, max send attempts reached"
                    );
                }
                Err(OutboxError::Delivery {
                    record_id: record.id,
                    attempts: record.number_of_attempts,
                    source,
                })
            }
        }
    }
}
