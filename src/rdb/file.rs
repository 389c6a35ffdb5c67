//! Record files
//!
//! Length-prefixed bincode records between a magic header and a
//! count + CRC32 footer. RDB LOAD reads them; BGSAVE writes them.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::now_ms;
use crate::error::{Error, Result};
use crate::storage::{Storage, Value};

/// Magic of RDB LOAD input files
pub const RDB_MAGIC: &[u8; 4] = b"HRDB";

const FILE_VERSION: u16 = 1;

/// Magic (4) + Version (2)
const HEADER_SIZE: usize = 6;

/// Count (8) + CRC32 (4)
const FOOTER_SIZE: usize = 12;

/// One key of an RDB file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdbRecord {
    /// Logical database index
    pub db: u32,
    pub key: Vec<u8>,
    pub value: Value,
    /// Absolute expiry, Unix milliseconds
    pub expire_at_ms: Option<u64>,
}

/// Outcome of an RDB load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: u64,
    pub skipped_expired: u64,
    /// Kept because NX was given and the key existed
    pub skipped_existing: u64,
    /// Records of other database indexes
    pub other_db: u64,
}

// =============================================================================
// Generic record files
// =============================================================================

/// Write `records` to `path`, replacing any existing file
pub fn write_records<T: Serialize>(path: &Path, magic: &[u8; 4], records: &[T]) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(magic)?;
    writer.write_all(&FILE_VERSION.to_le_bytes())?;

    let mut hasher = crc32fast::Hasher::new();
    for record in records {
        let body = bincode::serialize(record)?;
        let len = (body.len() as u32).to_le_bytes();
        writer.write_all(&len)?;
        writer.write_all(&body)?;
        hasher.update(&len);
        hasher.update(&body);
    }

    writer.write_all(&(records.len() as u64).to_le_bytes())?;
    writer.write_all(&hasher.finalize().to_le_bytes())?;
    writer.flush()?;

    let file: File = writer
        .into_inner()
        .map_err(|e| Error::Storage(format!("failed to flush {}: {}", path.display(), e)))?;
    file.sync_all()?;
    Ok(())
}

/// Read and verify every record of `path`
pub fn read_records<T: DeserializeOwned>(path: &Path, magic: &[u8; 4]) -> Result<Vec<T>> {
    let bytes = fs::read(path)?;
    if bytes.len() < HEADER_SIZE + FOOTER_SIZE || &bytes[..4] != magic {
        return Err(Error::Rdb(format!("{} is not a valid record file", path.display())));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FILE_VERSION {
        return Err(Error::Rdb(format!("unsupported record file version {}", version)));
    }

    let footer_start = bytes.len() - FOOTER_SIZE;
    let body = &bytes[HEADER_SIZE..footer_start];
    let footer = &bytes[footer_start..];
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&footer[..8]);
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&footer[8..]);

    if crc32fast::hash(body) != u32::from_le_bytes(crc_bytes) {
        return Err(Error::Rdb("record file checksum mismatch".to_string()));
    }

    let mut records = Vec::new();
    let mut offset = 0;
    while offset < body.len() {
        if body.len() - offset < 4 {
            return Err(Error::Rdb("truncated record header".to_string()));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&body[offset..offset + 4]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        offset += 4;

        if body.len() - offset < len {
            return Err(Error::Rdb("truncated record".to_string()));
        }
        records.push(bincode::deserialize(&body[offset..offset + len])?);
        offset += len;
    }

    if records.len() as u64 != u64::from_le_bytes(count_bytes) {
        return Err(Error::Rdb("record count mismatch".to_string()));
    }
    Ok(records)
}

// =============================================================================
// RDB
// =============================================================================

/// Write an RDB file (tests and tooling produce inputs this way)
pub fn write_rdb(path: &Path, records: &[RdbRecord]) -> Result<()> {
    write_records(path, RDB_MAGIC, records)
}

/// Load the records of database `db` from `path` into namespace `ns`
///
/// Expired records are skipped. With `overwrite` false, existing keys keep
/// their value.
pub fn load_rdb(
    path: &Path,
    storage: &dyn Storage,
    ns: &str,
    db: u32,
    overwrite: bool,
) -> Result<LoadStats> {
    if !path.is_file() {
        return Err(Error::Rdb(format!(
            "failed to open rdb file: {}",
            path.display()
        )));
    }

    let records: Vec<RdbRecord> = read_records(path, RDB_MAGIC)?;
    let now = now_ms();
    let mut stats = LoadStats::default();

    for record in records {
        if record.db != db {
            stats.other_db += 1;
            continue;
        }

        let ttl = match record.expire_at_ms {
            Some(at) if at <= now => {
                stats.skipped_expired += 1;
                continue;
            }
            Some(at) => Some(at - now),
            None => None,
        };

        if !overwrite && storage.exists(ns, &record.key)? {
            stats.skipped_existing += 1;
            continue;
        }

        storage.put(ns, &record.key, record.value, ttl)?;
        stats.loaded += 1;
    }

    tracing::info!(
        path = %path.display(),
        ns,
        db,
        loaded = stats.loaded,
        skipped_expired = stats.skipped_expired,
        skipped_existing = stats.skipped_existing,
        "rdb loaded"
    );
    Ok(stats)
}
