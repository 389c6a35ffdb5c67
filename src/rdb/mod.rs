//! RDB Module
//!
//! Serialized forms of keys outside the live keyspace.
//!
//! ## DUMP Payload (RESTORE / DUMP)
//! ```text
//! ┌────────────────────────┬─────────────┬──────────────┐
//! │ bincode(Value)         │ Version (2) │  CRC32 (4)   │
//! └────────────────────────┴─────────────┴──────────────┘
//! ```
//! The CRC covers the value bytes and the version.
//!
//! ## Record File (RDB LOAD, backups)
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header:  Magic (4) │ Version (2)       │
//! ├────────────────────────────────────────┤
//! │ Record:  Len (4) │ bincode(record)     │
//! │ ... (repeated)                         │
//! ├────────────────────────────────────────┤
//! │ Footer:  Count (8) │ CRC32 (4)         │
//! └────────────────────────────────────────┘
//! ```
//! The CRC covers every record frame.

mod dump;
mod file;

pub use dump::{decode_dump, encode_dump, DUMP_VERSION};
pub use file::{load_rdb, read_records, write_rdb, write_records, LoadStats, RdbRecord, RDB_MAGIC};
