//! Keyspace backups
//!
//! BGSAVE snapshots land in `<data_dir>/backup/<unix_ms>.bak`, one record
//! file per snapshot.

use std::fs;
use std::path::{Path, PathBuf};

use crate::clock::now_ms;
use crate::error::Result;
use crate::rdb::{read_records, write_records};

use super::Record;

/// Backup directory under the data directory
pub const BACKUP_DIR: &str = "backup";

const BACKUP_MAGIC: &[u8; 4] = b"HBAK";
const BACKUP_EXT: &str = "bak";

/// Write a snapshot; returns the file written
pub fn write_backup(data_dir: &Path, records: &[Record]) -> Result<PathBuf> {
    let dir = data_dir.join(BACKUP_DIR);
    fs::create_dir_all(&dir)?;

    let mut stamp = now_ms();
    let mut path = dir.join(format!("{}.{}", stamp, BACKUP_EXT));
    while path.exists() {
        stamp += 1;
        path = dir.join(format!("{}.{}", stamp, BACKUP_EXT));
    }

    write_records(&path, BACKUP_MAGIC, records)?;
    Ok(path)
}

/// Read back a snapshot written by [`write_backup`]
pub fn read_backup(path: &Path) -> Result<Vec<Record>> {
    read_records(path, BACKUP_MAGIC)
}

/// Existing snapshots, oldest first
pub fn list_backups(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = data_dir.join(BACKUP_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut backups = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == BACKUP_EXT) {
            backups.push(path);
        }
    }
    backups.sort();
    Ok(backups)
}

/// Delete every snapshot; returns how many were removed
pub fn purge_backups(data_dir: &Path) -> Result<usize> {
    let backups = list_backups(data_dir)?;
    for path in &backups {
        fs::remove_file(path)?;
    }
    Ok(backups.len())
}
