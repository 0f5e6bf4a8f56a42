//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（PostgreSQL, broker など）への
//! インターフェースを提供し、実装の詳細を隠蔽します。

pub mod broker;
pub mod clock;
pub mod id_generator;
pub mod store;

// 主要な trait を再エクスポート
pub use self::broker::{BrokerError, MessageBroker};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, SequentialIdGenerator, UlidGenerator};
pub use self::store::OutboxStore;
