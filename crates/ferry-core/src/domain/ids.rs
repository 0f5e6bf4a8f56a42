//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID
//! Record の ID は ULID (Universally Unique Lexicographically Sortable Identifier) です。
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **分散生成可能**: 複数の producer が調整なしで生成できる
//! - **UUID互換**: 128-bit なので PostgreSQL の UUID カラムにそのまま格納できる

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;
use uuid::Uuid;

/// Identifier of an outbox record. Assigned once by the publisher.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(Ulid);

impl RecordId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(Ulid::from(uuid))
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Column representation used by the relational store.
    pub fn as_uuid(&self) -> Uuid {
        Uuid::from(self.0)
    }
}

impl From<Ulid> for RecordId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of one dispatcher process.
///
/// Used only as the lock-owner token written into claimed records, so that
/// several dispatchers can share one store without processing the same
/// record twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// `<hostname>-<ulid>`; falls back to `ferry` when `HOSTNAME` is unset.
    pub fn generate() -> Self {
        let host = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "ferry".to_string());
        Self(format!("{}-{}", host, Ulid::new().to_string().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
