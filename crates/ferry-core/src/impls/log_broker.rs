//! LogBroker - 開発用の MessageBroker
//!
//! Message を tracing に書き出すだけで、常に成功します。

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::domain::Message;
use crate::ports::{BrokerError, MessageBroker};

#[derive(Debug, Default)]
pub struct LogBroker {
    sent: AtomicU64,
}

impl LogBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages sent so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageBroker for LogBroker {
    async fn send(&self, message: &Message) -> Result<(), BrokerError> {
        info!(
            topic = %message.topic,
            key = %message.key,
            headers = message.headers.len(),
            body_len = message.body.len(),
            body = %String::from_utf8_lossy(&message.body),
            "message sent"
        );
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
