//! MessageBroker port - 配送先（Kafka, NATS, ...）の抽象化

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{BoxError, Message};

/// Any failure reported by a broker. The processor does not interpret it
/// beyond "delivery failed".
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BrokerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl BrokerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// MessageBroker は Message を実際に配送する
#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), BrokerError>;
}
