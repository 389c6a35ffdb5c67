//! Storage Module
//!
//! The keyspace collaborator the control plane runs against.
//!
//! ## Responsibilities
//! - Namespace-partitioned, ordered key storage
//! - Bounded range reads for SCAN, prefix listing for KEYS
//! - Millisecond expiry, purged on COMPACT
//! - Whole-keyspace snapshots for BGSAVE
//!
//! ## Key Encoding
//! ```text
//! ┌─────────────┬──────────────┬──────────────┐
//! │ ns_len (1)  │  namespace   │   user key   │
//! └─────────────┴──────────────┴──────────────┘
//! ```
//! One length byte keeps each namespace a contiguous, prefix-addressable
//! range; it is why namespace names are capped at 255 bytes.

mod backup;
mod memory;

pub use backup::{list_backups, purge_backups, read_backup, write_backup, BACKUP_DIR};
pub use memory::MemoryStorage;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A stored value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    String(Vec<u8>),
    List(Vec<Vec<u8>>),
    Hash(BTreeMap<Vec<u8>, Vec<u8>>),
    Set(BTreeSet<Vec<u8>>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
            Value::Set(_) => "set",
        }
    }
}

/// One key of a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub namespace: String,
    pub key: Vec<u8>,
    pub value: Value,
    /// Absolute expiry, Unix milliseconds
    pub expire_at_ms: Option<u64>,
}

/// Result of one bounded range read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<Vec<u8>>,
    /// Last key returned, when more matching keys follow
    pub end_key: Option<Vec<u8>>,
}

/// Namespace-partitioned keyspace
///
/// Every operation is confined to one namespace's key range, except
/// `flush_all`, `purge_expired` and `snapshot`, which span all of them.
/// Expired keys are invisible to reads.
pub trait Storage: Send + Sync {
    fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Value>>;

    /// Store `value`; `ttl_ms` of `None` means no expiry
    fn put(&self, ns: &str, key: &[u8], value: Value, ttl_ms: Option<u64>) -> Result<()>;

    fn exists(&self, ns: &str, key: &[u8]) -> Result<bool>;

    /// Returns whether a live key was removed
    fn delete(&self, ns: &str, key: &[u8]) -> Result<bool>;

    /// All keys starting with `prefix`, ascending
    fn keys(&self, ns: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Up to `limit` keys starting with `prefix` and strictly after `after`
    fn scan(&self, ns: &str, after: Option<&[u8]>, limit: usize, prefix: &[u8])
        -> Result<ScanPage>;

    /// First key after `after`, wrapping to the start of the namespace
    fn random_key(&self, ns: &str, after: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Encoded size of the value at `key`
    fn key_size(&self, ns: &str, key: &[u8]) -> Result<Option<u64>>;

    fn key_count(&self, ns: &str) -> Result<u64>;

    fn flush_namespace(&self, ns: &str) -> Result<()>;

    fn flush_all(&self) -> Result<()>;

    /// Drop expired entries; returns how many were dropped
    fn purge_expired(&self) -> Result<usize>;

    /// Every live key of every namespace
    fn snapshot(&self) -> Result<Vec<Record>>;
}

/// Encode `key` into the storage key space of `ns`
pub fn compose_key(ns: &str, key: &[u8]) -> Vec<u8> {
    let ns = ns.as_bytes();
    let mut composed = Vec::with_capacity(1 + ns.len() + key.len());
    composed.push(ns.len() as u8);
    composed.extend_from_slice(ns);
    composed.extend_from_slice(key);
    composed
}

/// Split a storage key into `(namespace, user key)`
pub fn decompose_key(composed: &[u8]) -> Option<(&str, &[u8])> {
    let (&len, rest) = composed.split_first()?;
    let len = len as usize;
    if rest.len() < len {
        return None;
    }
    let ns = std::str::from_utf8(&rest[..len]).ok()?;
    Some((ns, &rest[len..]))
}
