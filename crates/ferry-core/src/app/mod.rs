//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせて outbox の読み書きを実装します。
//!
//! # 主要コンポーネント
//! - **Publisher**: 呼び出し側のトランザクション内で Record を追加
//! - **RecordProcessor**: claim → 配送 → 状態更新
//! - **RecordUnlocker**: 期限切れロックの回収
//! - **RecordCleaner**: 保持期間を過ぎた Record の削除
//! - **Dispatcher**: 上の 3 つを周期実行し、停止シグナルを待つ

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

pub mod cleaner;
pub mod config;
pub mod dispatcher;
pub mod processor;
pub mod publisher;
pub mod unlocker;

// 主要な型を再エクスポート
pub use self::cleaner::RecordCleaner;
pub use self::config::{ConfigError, DispatcherConfig};
pub use self::dispatcher::{Dispatcher, DispatcherHandle};
pub use self::processor::{ProcessReport, RecordProcessor};
pub use self::publisher::Publisher;
pub use self::unlocker::RecordUnlocker;

/// `now - age`, clamped to the earliest representable instant.
pub(crate) fn cutoff_before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
