//! In-memory storage
//!
//! BTreeMap-based keyspace with RwLock for concurrency.
//!
//! ## Concurrency
//! - Reads (get/scan/keys/snapshot) share the read lock
//! - Writes (put/delete/flush/purge) take the write lock
//! - Each call is atomic with respect to every other call

use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::clock::now_ms;
use crate::error::Result;

use super::{compose_key, decompose_key, Record, ScanPage, Storage, Value};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    expire_at_ms: Option<u64>,
}

impl StoredEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expire_at_ms.map_or(true, |at| at > now)
    }
}

/// Ordered in-memory keyspace
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: RwLock<BTreeMap<Vec<u8>, StoredEntry>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub fn raw_len(&self) -> usize {
        self.data.read().len()
    }

    /// Live entries from `lower` onward whose composed key starts with `match_prefix`
    fn live_range<'a>(
        data: &'a BTreeMap<Vec<u8>, StoredEntry>,
        lower: Bound<Vec<u8>>,
        match_prefix: &'a [u8],
        now: u64,
    ) -> impl Iterator<Item = (&'a Vec<u8>, &'a StoredEntry)> + 'a {
        data.range((lower, Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(match_prefix))
            .filter(move |(_, e)| e.is_live(now))
    }
}

/// Strip the namespace header from a composed key
fn user_key(composed: &[u8], ns_header_len: usize) -> Vec<u8> {
    composed[ns_header_len..].to_vec()
}

impl Storage for MemoryStorage {
    fn get(&self, ns: &str, key: &[u8]) -> Result<Option<Value>> {
        let now = now_ms();
        Ok(self
            .data
            .read()
            .get(&compose_key(ns, key))
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    fn put(&self, ns: &str, key: &[u8], value: Value, ttl_ms: Option<u64>) -> Result<()> {
        let entry = StoredEntry {
            value,
            expire_at_ms: ttl_ms.map(|ttl| now_ms().saturating_add(ttl)),
        };
        self.data.write().insert(compose_key(ns, key), entry);
        Ok(())
    }

    fn exists(&self, ns: &str, key: &[u8]) -> Result<bool> {
        let now = now_ms();
        Ok(self
            .data
            .read()
            .get(&compose_key(ns, key))
            .is_some_and(|e| e.is_live(now)))
    }

    fn delete(&self, ns: &str, key: &[u8]) -> Result<bool> {
        let now = now_ms();
        Ok(self
            .data
            .write()
            .remove(&compose_key(ns, key))
            .is_some_and(|e| e.is_live(now)))
    }

    fn keys(&self, ns: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let header = compose_key(ns, b"").len();
        let match_prefix = compose_key(ns, prefix);
        let data = self.data.read();
        Ok(
            Self::live_range(&data, Bound::Included(match_prefix.clone()), &match_prefix, now_ms())
                .map(|(k, _)| user_key(k, header))
                .collect(),
        )
    }

    fn scan(
        &self,
        ns: &str,
        after: Option<&[u8]>,
        limit: usize,
        prefix: &[u8],
    ) -> Result<ScanPage> {
        let header = compose_key(ns, b"").len();
        let match_prefix = compose_key(ns, prefix);
        let lower = match after.map(|key| compose_key(ns, key)) {
            Some(start) if start >= match_prefix => Bound::Excluded(start),
            _ => Bound::Included(match_prefix.clone()),
        };

        let data = self.data.read();
        let mut page = ScanPage::default();
        for (k, _) in Self::live_range(&data, lower, &match_prefix, now_ms()) {
            if page.keys.len() == limit {
                page.end_key = page.keys.last().cloned();
                break;
            }
            page.keys.push(user_key(k, header));
        }
        Ok(page)
    }

    fn random_key(&self, ns: &str, after: &[u8]) -> Result<Option<Vec<u8>>> {
        let ns_prefix = compose_key(ns, b"");
        let header = ns_prefix.len();
        let now = now_ms();
        let data = self.data.read();

        let next = Self::live_range(
            &data,
            Bound::Excluded(compose_key(ns, after)),
            &ns_prefix,
            now,
        )
        .next()
        .or_else(|| Self::live_range(&data, Bound::Included(ns_prefix.clone()), &ns_prefix, now).next());

        Ok(next.map(|(k, _)| user_key(k, header)))
    }

    fn key_size(&self, ns: &str, key: &[u8]) -> Result<Option<u64>> {
        match self.get(ns, key)? {
            Some(value) => Ok(Some(bincode::serialized_size(&value)?)),
            None => Ok(None),
        }
    }

    fn key_count(&self, ns: &str) -> Result<u64> {
        let ns_prefix = compose_key(ns, b"");
        let data = self.data.read();
        Ok(
            Self::live_range(&data, Bound::Included(ns_prefix.clone()), &ns_prefix, now_ms())
                .count() as u64,
        )
    }

    fn flush_namespace(&self, ns: &str) -> Result<()> {
        let ns_prefix = compose_key(ns, b"");
        self.data.write().retain(|k, _| !k.starts_with(&ns_prefix));
        Ok(())
    }

    fn flush_all(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = now_ms();
        let mut data = self.data.write();
        let before = data.len();
        data.retain(|_, e| e.is_live(now));
        Ok(before - data.len())
    }

    fn snapshot(&self) -> Result<Vec<Record>> {
        let now = now_ms();
        let data = self.data.read();
        Ok(data
            .iter()
            .filter(|(_, e)| e.is_live(now))
            .filter_map(|(k, e)| {
                let (ns, key) = decompose_key(k)?;
                Some(Record {
                    namespace: ns.to_string(),
                    key: key.to_vec(),
                    value: e.value.clone(),
                    expire_at_ms: e.expire_at_ms,
                })
            })
            .collect())
    }
}
