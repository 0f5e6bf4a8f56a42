//! Publisher - Record を呼び出し側のトランザクションに書き込む
//!
//! Broker には一切触れません。配送は Dispatcher の仕事です。

use std::sync::Arc;

use tracing::debug;

use crate::domain::{Message, OutboxError, Record, RecordId};
use crate::ports::{Clock, IdGenerator, OutboxStore, SystemClock, UlidGenerator};

/// Write side of the outbox.
///
/// # 使用例
/// ```ignore
/// let mut tx = pool.begin().await?;
/// orders.insert(&mut *tx, &order).await?;
/// publisher.send(Message::new("orders", order.id, body), &mut *tx).await?;
/// tx.commit().await?;
/// ```
pub struct Publisher<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<S> Clone for Publisher<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            ids: Arc::clone(&self.ids),
        }
    }
}

impl<S: OutboxStore> Publisher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Enqueue `message` as a new `PendingDelivery` record inside `tx`.
    ///
    /// Must run in the same transaction as the business change the message
    /// describes; the record only exists once the caller commits.
    pub async fn send(&self, message: Message, tx: &mut S::Tx) -> Result<RecordId, OutboxError> {
        let record = Record::new(self.ids.generate_record_id(), message, self.clock.now());
        self.store.add_record_tx(&record, tx).await?;

        debug!(record_id = %record.id, topic = %record.message.topic, "record enqueued");
        Ok(record.id)
    }
}
