//! IdGenerator port - ID 生成の抽象化
//!
//! IdGenerator は分散システムで使える ID を生成するためのインターフェースです。
//! テスト容易性のために、trait として抽象化しています。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）
//! - **SequentialIdGenerator**: 連番（テスト用、決定的）

use std::sync::atomic::{AtomicU64, Ordering};

use ulid::Ulid;

use crate::domain::RecordId;
use crate::ports::Clock;

/// IdGenerator は Record の ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_record_id(&self) -> RecordId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を使うと timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_record_id(&self) -> RecordId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        RecordId::from_ulid(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

/// Hands out `1, 2, 3, ...` (as ULIDs with a zero timestamp).
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the `n`-th call (1-based) returns.
    pub fn nth(n: u64) -> RecordId {
        RecordId::from_ulid(Ulid::from_parts(0, n as u128))
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate_record_id(&self) -> RecordId {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Self::nth(n)
    }
}
