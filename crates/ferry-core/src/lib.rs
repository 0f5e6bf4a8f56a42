//! ferry-core
//!
//! Transactional outbox: messages are written to an `outbox` table in the
//! same transaction as the business data, and a background dispatcher
//! delivers them to a message broker at least once.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, message, record, state, policy, errors）
//! - **ports**: 抽象化レイヤー（OutboxStore, MessageBroker, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（publisher, processor, unlocker, cleaner, dispatcher, config）
//! - **impls**: 実装（PgOutboxStore, InMemoryStore, LogBroker）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{Dispatcher, DispatcherConfig, DispatcherHandle, Publisher};
pub use domain::{MachineId, Message, OutboxError, RecordId, RetrialPolicy};
