//! PgOutboxStore integration tests.
//!
//! Each test creates its own throwaway database next to the one in
//! `DATABASE_URL`. Without `DATABASE_URL` the tests return early.

use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use ferry_core::app::{RecordCleaner, RecordProcessor, RecordUnlocker};
use ferry_core::domain::{Message, OutboxError, Record, RecordState, RetrialPolicy};
use ferry_core::impls::{LogBroker, PgOutboxStore};
use ferry_core::ports::{FixedClock, OutboxStore, SequentialIdGenerator};
use ferry_core::{MachineId, Publisher};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

async fn setup_test_db() -> Option<PgPool> {
    let Ok(connection_string) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };

    let db_name = format!("ferry_test_{}", ulid::Ulid::new().to_string().to_lowercase());
    let (base_url, _) = connection_string
        .rsplit_once('/')
        .expect("DATABASE_URL has no database part");
    let admin = PgPool::connect(&format!("{base_url}/postgres"))
        .await
        .expect("Failed to connect to postgres");
    sqlx::query(&format!("CREATE DATABASE {db_name}"))
        .execute(&admin)
        .await
        .expect("Failed to create test database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&format!("{base_url}/{db_name}"))
        .await
        .expect("Failed to connect to test database");
    Some(pool)
}

async fn setup_store() -> Option<Arc<PgOutboxStore>> {
    let pool = setup_test_db().await?;
    let store = PgOutboxStore::new(pool);
    store.migrate().await.expect("migrate");
    // idempotent
    store.migrate().await.expect("second migrate");
    Some(Arc::new(store))
}

/// Postgres keeps microseconds.
fn t0() -> DateTime<Utc> {
    Utc::now()
        .duration_trunc(Duration::seconds(1))
        .expect("truncate")
}

async fn insert(store: &PgOutboxStore, record: &Record) {
    let mut tx = store.pool().begin().await.unwrap();
    store.add_record_tx(record, &mut *tx).await.unwrap();
    tx.commit().await.unwrap();
}

fn record(n: u64, created_on: DateTime<Utc>) -> Record {
    Record::new(
        SequentialIdGenerator::nth(n),
        Message::new("orders", format!("k{n}"), b"{\"n\":1}".to_vec()).with_header("h", "v"),
        created_on,
    )
}

#[tokio::test]
async fn record_is_visible_only_after_commit() {
    let Some(store) = setup_store().await else {
        return;
    };
    let publisher = Publisher::new(Arc::clone(&store));

    let mut tx = store.pool().begin().await.unwrap();
    let id = publisher
        .send(Message::new("orders", "order-1", b"{}".to_vec()), &mut *tx)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let claimed = store
        .update_record_lock_by_state("m", t0(), RecordState::PendingDelivery)
        .await
        .unwrap();
    assert_eq!(claimed, 0);

    let mut tx = store.pool().begin().await.unwrap();
    let id2 = publisher
        .send(Message::new("orders", "order-1", b"{}".to_vec()), &mut *tx)
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_ne!(id, id2);

    let claimed = store
        .update_record_lock_by_state("m", t0(), RecordState::PendingDelivery)
        .await
        .unwrap();
    assert_eq!(claimed, 1);
    let records = store.get_records_by_lock_id("m").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id2);
    assert_eq!(records[0].message.key, "order-1");
}

#[tokio::test]
async fn claim_is_exclusive_and_idempotent() {
    let Some(store) = setup_store().await else {
        return;
    };
    let now = t0();
    insert(&store, &record(1, now)).await;
    insert(&store, &record(2, now + Duration::seconds(1))).await;
    let mut done = record(3, now);
    done.mark_delivered(now).unwrap();
    insert(&store, &done).await;

    let a = store
        .update_record_lock_by_state("machine-a", now, RecordState::PendingDelivery)
        .await
        .unwrap();
    assert_eq!(a, 2);
    let again = store
        .update_record_lock_by_state("machine-a", now, RecordState::PendingDelivery)
        .await
        .unwrap();
    assert_eq!(again, 0);
    let b = store
        .update_record_lock_by_state("machine-b", now, RecordState::PendingDelivery)
        .await
        .unwrap();
    assert_eq!(b, 0);

    let mine = store.get_records_by_lock_id("machine-a").await.unwrap();
    let ids: Vec<_> = mine.iter().map(|r| r.id).collect();
    assert_eq!(
        ids,
        vec![SequentialIdGenerator::nth(1), SequentialIdGenerator::nth(2)]
    );
    assert_eq!(mine[0].locked_on(), Some(now));
    assert_eq!(mine[0].message.header("h"), Some("v"));

    assert_eq!(store.clear_locks_by_lock_id("machine-a").await.unwrap(), 2);
    assert!(store.get_records_by_lock_id("machine-a").await.unwrap().is_empty());
}

#[tokio::test]
async fn update_by_id_persists_every_field() {
    let Some(store) = setup_store().await else {
        return;
    };
    let now = t0();
    insert(&store, &record(1, now)).await;
    store
        .update_record_lock_by_state("m", now, RecordState::PendingDelivery)
        .await
        .unwrap();

    let mut rec = store.get_records_by_lock_id("m").await.unwrap().remove(0);
    rec.start_attempt(now + Duration::seconds(1));
    rec.mark_failed("nack", &RetrialPolicy::limited(1)).unwrap();
    store.update_record_by_id(&rec).await.unwrap();

    // unlocked now, so fetch it by locking terminal records
    store
        .update_record_lock_by_state("inspect", now, RecordState::MaxAttemptsReached)
        .await
        .unwrap();
    let saved = store.get_records_by_lock_id("inspect").await.unwrap().remove(0);
    assert_eq!(saved.state, RecordState::MaxAttemptsReached);
    assert_eq!(saved.number_of_attempts, 1);
    assert_eq!(saved.last_attempt_on, Some(now + Duration::seconds(1)));
    assert_eq!(saved.error.as_deref(), Some("nack"));
}

#[tokio::test]
async fn update_of_deleted_record_is_reported() {
    let Some(store) = setup_store().await else {
        return;
    };
    let now = t0();
    insert(&store, &record(1, now)).await;
    store
        .update_record_lock_by_state("m", now, RecordState::PendingDelivery)
        .await
        .unwrap();
    let mut rec = store.get_records_by_lock_id("m").await.unwrap().remove(0);

    // cleaner removes the row while it is still claimed
    let removed = store
        .remove_records_before_datetime(now + Duration::days(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    rec.start_attempt(now);
    rec.mark_delivered(now).unwrap();
    let err = store.update_record_by_id(&rec).await.unwrap_err();
    assert!(matches!(err, OutboxError::Store { .. }));
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn processor_delivers_through_postgres() {
    let Some(store) = setup_store().await else {
        return;
    };
    let now = t0();
    insert(&store, &record(1, now)).await;
    insert(&store, &record(2, now + Duration::seconds(1))).await;

    let broker = Arc::new(LogBroker::new());
    let processor = RecordProcessor::new(
        RetrialPolicy::unlimited(),
        Arc::clone(&store),
        Arc::clone(&broker),
        MachineId::new("machine-a"),
    )
    .with_clock(Arc::new(FixedClock::new(now)));

    let report = processor.process_records().await.unwrap();
    assert_eq!(report.claimed, 2);
    assert_eq!(report.delivered, 2);
    assert_eq!(broker.sent(), 2);

    let claimed = store
        .update_record_lock_by_state("inspect", now, RecordState::Delivered)
        .await
        .unwrap();
    assert_eq!(claimed, 2);
    for rec in store.get_records_by_lock_id("inspect").await.unwrap() {
        assert_eq!(rec.processed_on, Some(now));
        assert_eq!(rec.number_of_attempts, 1);
    }
}

#[tokio::test]
async fn unlocker_and_cleaner_use_strict_cutoffs() {
    let Some(store) = setup_store().await else {
        return;
    };
    let now = t0();
    let clock = Arc::new(FixedClock::new(now));

    let mut stale = record(1, now - Duration::days(8));
    stale.lock("dead", now - Duration::minutes(6));
    insert(&store, &stale).await;
    let mut fresh = record(2, now - Duration::days(6));
    fresh.lock("live", now - Duration::minutes(4));
    insert(&store, &fresh).await;

    let unlocker = RecordUnlocker::new(Arc::clone(&store), std::time::Duration::from_secs(300))
        .with_clock(clock.clone());
    assert_eq!(unlocker.unlock_expired_messages().await.unwrap(), 1);
    assert!(store.get_records_by_lock_id("dead").await.unwrap().is_empty());
    assert_eq!(store.get_records_by_lock_id("live").await.unwrap().len(), 1);

    let cleaner = RecordCleaner::new(
        Arc::clone(&store),
        std::time::Duration::from_secs(7 * 24 * 3600),
    )
    .with_clock(clock);
    assert_eq!(cleaner.remove_expired_messages().await.unwrap(), 1);
    assert_eq!(cleaner.remove_expired_messages().await.unwrap(), 0);
    assert_eq!(store.get_records_by_lock_id("live").await.unwrap().len(), 1);
}

#[tokio::test]
async fn finished_only_cleanup_spares_pending_records() {
    let Some(store) = setup_store().await else {
        return;
    };
    let old = t0() - Duration::days(30);
    insert(&store, &record(1, old)).await;
    let mut done = record(2, old);
    done.mark_delivered(old).unwrap();
    insert(&store, &done).await;

    let removed = store
        .remove_finished_records_before_datetime(t0())
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(
        store
            .update_record_lock_by_state("m", t0(), RecordState::PendingDelivery)
            .await
            .unwrap(),
        1
    );
}
