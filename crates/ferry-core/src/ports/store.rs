//! OutboxStore port - outbox テーブルの正本（source of truth）
//!
//! # 設計原則
//! - Record の追加は呼び出し側のトランザクション内で行う（dual write の解消）
//! - claim は 1 文の UPDATE で行い、排他はストアの原子性に任せる
//! - すべての時刻は呼び出し側（Clock）から渡す

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{OutboxError, Record, RecordState};

/// Persistence contract for outbox records.
///
/// Any ACID store can implement it. The `u64` results are affected-row
/// counts.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Handle of the caller's open transaction.
    type Tx: Send;

    /// Insert `record` as part of `tx`. Nothing is visible until the caller
    /// commits.
    async fn add_record_tx(&self, record: &Record, tx: &mut Self::Tx) -> Result<(), OutboxError>;

    /// Every record currently locked by `lock_id`, oldest first.
    async fn get_records_by_lock_id(&self, lock_id: &str) -> Result<Vec<Record>, OutboxError>;

    /// The claim: lock every unlocked record in `state` for `lock_id`, as a
    /// single atomic statement.
    async fn update_record_lock_by_state(
        &self,
        lock_id: &str,
        locked_on: DateTime<Utc>,
        state: RecordState,
    ) -> Result<u64, OutboxError>;

    /// Overwrite every mutable field of the record with the same id.
    ///
    /// Fails with a `Store` error wrapping [`RecordNotFound`] when no such
    /// row exists.
    ///
    /// [`RecordNotFound`]: crate::domain::RecordNotFound
    async fn update_record_by_id(&self, record: &Record) -> Result<(), OutboxError>;

    /// Release locks taken before `cutoff`, whoever owns them.
    async fn clear_locks_with_duration_before_date(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError>;

    async fn clear_locks_by_lock_id(&self, lock_id: &str) -> Result<u64, OutboxError>;

    /// Delete records created before `cutoff`, whatever their state.
    async fn remove_records_before_datetime(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError>;

    /// Delete `Delivered` and `MaxAttemptsReached` records created before
    /// `cutoff`. Pending records are kept.
    async fn remove_finished_records_before_datetime(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError>;
}
