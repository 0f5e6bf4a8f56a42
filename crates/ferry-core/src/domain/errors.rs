//! Errors - エラー型と分類
//!
//! - Store: 永続化エラー（次の tick で再試行）
//! - Delivery: broker への配送失敗（Record にも記録される）
//! - Codec: payload の (de)serialize 失敗

use thiserror::Error;

use super::ids::RecordId;
use super::state::RecordState;
use crate::ports::broker::BrokerError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// `update_record_by_id` found no row with this id, e.g. because the cleaner
/// deleted it mid-batch.
#[derive(Debug, Error)]
#[error("record {0} not found")]
pub struct RecordNotFound(pub RecordId);

/// OutboxError はドメインエラー
///
/// `op` names the operation that failed, e.g. `outbox.postgres.claim`.
#[derive(Debug, Error)]
pub enum OutboxError {
    #[error("{op}: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{op}: {source}")]
    Codec {
        op: &'static str,
        #[source]
        source: bitcode::Error,
    },

    #[error("delivery of record {record_id} failed on attempt {attempts}: {source}")]
    Delivery {
        record_id: RecordId,
        attempts: u32,
        #[source]
        source: BrokerError,
    },

    #[error("record {record_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        record_id: RecordId,
        from: RecordState,
        to: RecordState,
    },
}

impl OutboxError {
    pub fn store(op: &'static str, source: impl Into<BoxError>) -> Self {
        OutboxError::Store {
            op,
            source: source.into(),
        }
    }

    /// Broker failures are expected and already recorded on the record.
    pub fn is_delivery(&self) -> bool {
        matches!(self, OutboxError::Delivery { .. })
    }
}
