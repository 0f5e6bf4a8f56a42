//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **PgOutboxStore**: PostgreSQL（本番用）
//! - **InMemoryStore**: 開発用・テスト用の正本
//! - **LogBroker**: tracing に書き出すだけの broker

pub mod log_broker;
pub mod memory;
pub mod postgres;

// 主要な型を再エクスポート
pub use self::log_broker::LogBroker;
pub use self::memory::{InMemoryStore, InMemoryTransaction};
pub use self::postgres::PgOutboxStore;
