//! PostgreSQL Outbox Store
//!
//! SQLx-based implementation of [`OutboxStore`] for PostgreSQL.
//!
//! The message (key, headers, body, topic) is stored as one opaque `BYTEA`
//! blob in `data`; every other record field gets its own typed column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::postgres::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{
    Message, OutboxError, Record, RecordId, RecordLock, RecordNotFound, RecordState,
};
use crate::ports::OutboxStore;

#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("unknown record state {0}")]
    UnknownState(i16),

    #[error("negative attempt count {0}")]
    NegativeAttempts(i32),

    #[error("attempt count {0} does not fit the number_of_attempts column")]
    AttemptsOverflow(u32),
}

/// Row struct for outbox queries
#[derive(FromRow)]
struct OutboxRow {
    id: Uuid,
    data: Vec<u8>,
    state: i16,
    created_on: DateTime<Utc>,
    locked_by: Option<String>,
    locked_on: Option<DateTime<Utc>>,
    processed_on: Option<DateTime<Utc>>,
    number_of_attempts: i32,
    last_attempted_on: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl OutboxRow {
    fn into_record(self) -> Result<Record, OutboxError> {
        const OP: &str = "outbox.postgres.decode_row";

        let state = RecordState::try_from(self.state)
            .map_err(|s| OutboxError::store(OP, RowError::UnknownState(s)))?;
        let number_of_attempts = u32::try_from(self.number_of_attempts)
            .map_err(|_| OutboxError::store(OP, RowError::NegativeAttempts(self.number_of_attempts)))?;
        let lock = match (self.locked_by, self.locked_on) {
            (Some(lock_id), Some(locked_on)) => Some(RecordLock { lock_id, locked_on }),
            _ => None,
        };

        Ok(Record {
            id: RecordId::from_uuid(self.id),
            message: Message::decode(&self.data)?,
            state,
            created_on: self.created_on,
            lock,
            processed_on: self.processed_on,
            number_of_attempts,
            last_attempt_on: self.last_attempted_on,
            error: self.error,
        })
    }
}

fn attempts_column(op: &'static str, record: &Record) -> Result<i32, OutboxError> {
    i32::try_from(record.number_of_attempts)
        .map_err(|_| OutboxError::store(op, RowError::AttemptsOverflow(record.number_of_attempts)))
}

/// PostgreSQL implementation of OutboxStore
#[derive(Debug, Clone)]
pub struct PgOutboxStore {
    pool: PgPool,
}

impl PgOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the outbox table and its indexes if they do not exist.
    pub async fn migrate(&self) -> Result<(), OutboxError> {
        const OP: &str = "outbox.postgres.migrate";

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS outbox (
                id UUID PRIMARY KEY,
                data BYTEA NOT NULL,
                state SMALLINT NOT NULL,
                created_on TIMESTAMPTZ NOT NULL,
                locked_by TEXT,
                locked_on TIMESTAMPTZ,
                processed_on TIMESTAMPTZ,
                number_of_attempts INTEGER NOT NULL DEFAULT 0,
                last_attempted_on TIMESTAMPTZ,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxError::store(OP, e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_outbox_state ON outbox(state) WHERE locked_by IS NULL")
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxError::store(OP, e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_outbox_locked_by ON outbox(locked_by)")
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxError::store(OP, e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_outbox_created_on ON outbox(created_on)")
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxError::store(OP, e))?;

        Ok(())
    }
}

#[async_trait]
impl OutboxStore for PgOutboxStore {
    /// Pass `&mut *tx` from the caller's own `sqlx::Transaction`.
    type Tx = PgConnection;

    async fn add_record_tx(&self, record: &Record, tx: &mut Self::Tx) -> Result<(), OutboxError> {
        const OP: &str = "outbox.postgres.add_record_tx";

        let data = record.message.encode()?;
        let attempts = attempts_column(OP, record)?;
        sqlx::query(
            r#"
            INSERT INTO outbox
                (id, data, state, created_on, locked_by, locked_on, processed_on,
                 number_of_attempts, last_attempted_on, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(data)
        .bind(record.state.as_i16())
        .bind(record.created_on)
        .bind(record.lock_id())
        .bind(record.locked_on())
        .bind(record.processed_on)
        .bind(attempts)
        .bind(record.last_attempt_on)
        .bind(record.error.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| OutboxError::store(OP, e))?;

        Ok(())
    }

    async fn get_records_by_lock_id(&self, lock_id: &str) -> Result<Vec<Record>, OutboxError> {
        const OP: &str = "outbox.postgres.get_records_by_lock_id";

        let rows: Vec<OutboxRow> = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, data, state, created_on, locked_by, locked_on, processed_on,
                   number_of_attempts, last_attempted_on, error
            FROM outbox
            WHERE locked_by = $1
            ORDER BY created_on ASC, id ASC
            "#,
        )
        .bind(lock_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| OutboxError::store(OP, e))?;

        rows.into_iter().map(OutboxRow::into_record).collect()
    }

    async fn update_record_lock_by_state(
        &self,
        lock_id: &str,
        locked_on: DateTime<Utc>,
        state: RecordState,
    ) -> Result<u64, OutboxError> {
        const OP: &str = "outbox.postgres.update_record_lock_by_state";

        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET locked_by = $1, locked_on = $2
            WHERE state = $3 AND locked_by IS NULL
            "#,
        )
        .bind(lock_id)
        .bind(locked_on)
        .bind(state.as_i16())
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxError::store(OP, e))?;

        Ok(result.rows_affected())
    }

    async fn update_record_by_id(&self, record: &Record) -> Result<(), OutboxError> {
        const OP: &str = "outbox.postgres.update_record_by_id";

        let data = record.message.encode()?;
        let attempts = attempts_column(OP, record)?;
        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET data = $1,
                state = $2,
                created_on = $3,
                locked_by = $4,
                locked_on = $5,
                processed_on = $6,
                number_of_attempts = $7,
                last_attempted_on = $8,
                error = $9
            WHERE id = $10
            "#,
        )
        .bind(data)
        .bind(record.state.as_i16())
        .bind(record.created_on)
        .bind(record.lock_id())
        .bind(record.locked_on())
        .bind(record.processed_on)
        .bind(attempts)
        .bind(record.last_attempt_on)
        .bind(record.error.as_deref())
        .bind(record.id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxError::store(OP, e))?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::store(OP, RecordNotFound(record.id)));
        }
        Ok(())
    }

    async fn clear_locks_with_duration_before_date(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError> {
        const OP: &str = "outbox.postgres.clear_locks_with_duration_before_date";

        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET locked_by = NULL, locked_on = NULL
            WHERE locked_on < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxError::store(OP, e))?;

        Ok(result.rows_affected())
    }

    async fn clear_locks_by_lock_id(&self, lock_id: &str) -> Result<u64, OutboxError> {
        const OP: &str = "outbox.postgres.clear_locks_by_lock_id";

        let result = sqlx::query(
            r#"
            UPDATE outbox
            SET locked_by = NULL, locked_on = NULL
            WHERE locked_by = $1
            "#,
        )
        .bind(lock_id)
        .execute(&self.pool)
        .await
        .map_err(|e| OutboxError::store(OP, e))?;

        Ok(result.rows_affected())
    }

    async fn remove_records_before_datetime(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError> {
        const OP: &str = "outbox.postgres.remove_records_before_datetime";

        let result = sqlx::query("DELETE FROM outbox WHERE created_on < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxError::store(OP, e))?;

        Ok(result.rows_affected())
    }

    async fn remove_finished_records_before_datetime(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, OutboxError> {
        const OP: &str = "outbox.postgres.remove_finished_records_before_datetime";

        let result = sqlx::query("DELETE FROM outbox WHERE created_on < $1 AND state <> $2")
            .bind(cutoff)
            .bind(RecordState::PendingDelivery.as_i16())
            .execute(&self.pool)
            .await
            .map_err(|e| OutboxError::store(OP, e))?;

        Ok(result.rows_affected())
    }
}
