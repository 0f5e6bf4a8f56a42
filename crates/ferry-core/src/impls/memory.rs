//! InMemoryStore - 開発用・テスト用の OutboxStore
//!
//! # 実装詳細
//! - BTreeMap<RecordId, Record> を tokio の Mutex で保護
//! - 1 回のロック取得 = 1 文の SQL に相当（claim などは原子的）
//! - InMemoryTransaction は commit されるまで Record を保持するだけ

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{OutboxError, Record, RecordId, RecordNotFound, RecordState};
use crate::ports::OutboxStore;

/// Records staged by [`InMemoryStore::add_record_tx`].
///
/// Dropping it without [`InMemoryStore::commit`] discards the records, the
/// same way an uncommitted SQL transaction would.
#[derive(Debug, Default)]
pub struct InMemoryTransaction {
    staged: Vec<Record>,
}

impl InMemoryTransaction {
    pub fn staged(&self) -> &[Record] {
        &self.staged
    }
}

#[derive(Debug, thiserror::Error)]
#[error("record {0} already exists")]
pub struct DuplicateRecord(pub RecordId);

/// In-memory outbox store. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    records: Arc<Mutex<BTreeMap<RecordId, Record>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> InMemoryTransaction {
        InMemoryTransaction::default()
    }

    /// Apply every staged insert atomically.
    pub async fn commit(&self, tx: InMemoryTransaction) -> Result<(), OutboxError> {
        let mut records = self.records.lock().await;
        if let Some(dup) = tx.staged.iter().find(|r| records.contains_key(&r.id)) {
            return Err(OutboxError::store(
                "outbox.memory.commit",
                DuplicateRecord(dup.id),
            ));
        }
        for record in tx.staged {
            records.insert(record.id, record);
        }
        Ok(())
    }

    /// Put a record in place directly, bypassing the publisher.
    pub async fn insert(&self, record: Record) {
        self.records.lock().await.insert(record.id, record);
    }

    pub async fn get(&self, id: RecordId) -> Option<Record> {
        self.records.lock().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<Record> {
        self.records.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn add_record_tx(&self, record: &Record, tx: &mut Self::Tx) -> Result<(), OutboxError> {
        tx.staged.push(record.clone());
        Ok(())
    }

    async fn get_records_by_lock_id(&self, lock_id: &str) -> Result<Vec<Record>, OutboxError> {
        let records = self.records.lock().await;
        let mut locked: Vec<Record> = records
            .values()
            .filter(|r| r.lock_id() == Some(lock_id))
            .cloned()
            .collect();
        locked.sort_by(|a, b| a.created_on.cmp(&b.created_on).then(a.id.cmp(&b.id)));
        Ok(locked)
    }

    async fn update_record_lock_by_state(
        &self,
        lock_id: &str,
        locked_on: DateTime<Utc>,
        state: RecordState,
    ) -> Result<u64, OutboxError> {
        let mut records = self.records.lock().await;
        let mut claimed = 0;
        for record in records
            .values_mut()
            .filter(|r| r.state == state && !r.is_locked())
        {
            record.lock(lock_id, locked_on);
            claimed += 1;
        }
        Ok(claimed)
    }

    async fn update_record_by_id(&self, record: &Record) -> Result<(), OutboxError> {
        let mut records = self.records.lock().await;
        let Some(existing) = records.get_mut(&record.id) else {
            return Err(OutboxError::store(
                "outbox.memory.update_record_by_id",
                RecordNotFound(record.id),
            ));
        };
        *existing = record.clone();
        Ok(())
    }

    async fn clear_locks_with_duration_before_date(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError> {
        let mut records = self.records.lock().await;
        let mut cleared = 0;
        for record in records
            .values_mut()
            .filter(|r| r.locked_on().is_some_and(|t| t < cutoff))
        {
            record.release_lock();
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn clear_locks_by_lock_id(&self, lock_id: &str) -> Result<u64, OutboxError> {
        let mut records = self.records.lock().await;
        let mut cleared = 0;
        for record in records
            .values_mut()
            .filter(|r| r.lock_id() == Some(lock_id))
        {
            record.release_lock();
            cleared += 1;
        }
        Ok(cleared)
    }

    async fn remove_records_before_datetime(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.created_on >= cutoff);
        Ok((before - records.len()) as u64)
    }

    async fn remove_finished_records_before_datetime(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, r| r.created_on >= cutoff || !r.state.is_terminal());
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Message;
    use crate::ports::SequentialIdGenerator;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn pending(n: u64, created_on: DateTime<Utc>) -> Record {
        Record::new(
            SequentialIdGenerator::nth(n),
            Message::new("orders", format!("k{n}"), b"{}".to_vec()),
            created_on,
        )
    }

    #[tokio::test]
    async fn staged_records_are_invisible_until_commit() {
        let store = InMemoryStore::new();
        let mut tx = store.begin();
        store.add_record_tx(&pending(1, t0()), &mut tx).await.unwrap();
        assert_eq!(tx.staged().len(), 1);
        assert!(store.is_empty().await);

        store.commit(tx).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_nothing_behind() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin();
            store.add_record_tx(&pending(1, t0()), &mut tx).await.unwrap();
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn commit_rejects_duplicate_ids() {
        let store = InMemoryStore::new();
        store.insert(pending(1, t0())).await;

        let mut tx = store.begin();
        store.add_record_tx(&pending(1, t0()), &mut tx).await.unwrap();
        store.add_record_tx(&pending(2, t0()), &mut tx).await.unwrap();
        let err = store.commit(tx).await.unwrap_err();

        assert!(matches!(err, OutboxError::Store { .. }));
        // all or nothing
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn claim_only_takes_unlocked_pending_records() {
        let store = InMemoryStore::new();
        store.insert(pending(1, t0())).await;

        let mut delivered = pending(2, t0());
        delivered.mark_delivered(t0()).unwrap();
        store.insert(delivered).await;

        let mut foreign = pending(3, t0());
        foreign.lock("machine-b", t0());
        store.insert(foreign).await;

        let claimed = store
            .update_record_lock_by_state("machine-a", t0(), RecordState::PendingDelivery)
            .await
            .unwrap();
        assert_eq!(claimed, 1);

        let mine = store.get_records_by_lock_id("machine-a").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, SequentialIdGenerator::nth(1));

        // nothing new to claim
        let again = store
            .update_record_lock_by_state("machine-a", t0(), RecordState::PendingDelivery)
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn locked_records_come_back_oldest_first() {
        let store = InMemoryStore::new();
        store.insert(pending(1, t0() + Duration::seconds(10))).await;
        store.insert(pending(2, t0())).await;
        store.insert(pending(3, t0() + Duration::seconds(5))).await;
        store
            .update_record_lock_by_state("m", t0(), RecordState::PendingDelivery)
            .await
            .unwrap();

        let ids: Vec<RecordId> = store
            .get_records_by_lock_id("m")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(
            ids,
            vec![
                SequentialIdGenerator::nth(2),
                SequentialIdGenerator::nth(3),
                SequentialIdGenerator::nth(1)
            ]
        );
    }

    #[tokio::test]
    async fn update_of_unknown_record_fails() {
        let store = InMemoryStore::new();
        let err = store.update_record_by_id(&pending(9, t0())).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn clear_locks_by_lock_id_leaves_other_owners() {
        let store = InMemoryStore::new();
        let mut a = pending(1, t0());
        a.lock("machine-a", t0());
        let mut b = pending(2, t0());
        b.lock("machine-b", t0());
        store.insert(a).await;
        store.insert(b).await;

        assert_eq!(store.clear_locks_by_lock_id("machine-a").await.unwrap(), 1);
        assert!(!store.get(SequentialIdGenerator::nth(1)).await.unwrap().is_locked());
        assert!(store.get(SequentialIdGenerator::nth(2)).await.unwrap().is_locked());
    }

    #[tokio::test]
    async fn finished_only_cleanup_keeps_pending_records() {
        let store = InMemoryStore::new();
        let old = t0() - Duration::days(30);
        store.insert(pending(1, old)).await;
        let mut done = pending(2, old);
        done.mark_delivered(old).unwrap();
        store.insert(done).await;

        let removed = store
            .remove_finished_records_before_datetime(t0())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(SequentialIdGenerator::nth(1)).await.is_some());
        assert!(store.get(SequentialIdGenerator::nth(2)).await.is_none());
    }
}
