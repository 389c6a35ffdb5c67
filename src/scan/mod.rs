//! Scan Module
//!
//! Stateless, resumable key iteration.
//!
//! ## Cursor Format
//! ```text
//! "0"                       start of scan (from client) / scan complete (from server)
//! ┌───┬─────┬──────────────────────┐
//! │ _ │ tag │  hex(last key seen)  │
//! └───┴─────┴──────────────────────┘
//! ```
//! The tag binds a cursor to one kind of scan; a cursor presented to a scan
//! of another kind is rejected.
//!
//! ## One Round
//! ```text
//! decode(cursor) ──► storage range read (> start, prefix, ≤ COUNT keys)
//!                         │
//!                         ▼
//!              end_key? ──yes──► encode(end_key) as next cursor
//!                  │ no
//!                  ▼
//!                 "0"
//! ```

mod cursor;
mod params;

pub use cursor::{decode, encode, next_cursor, CursorType, ScanStart, SCAN_COMPLETE};
pub use params::{parse_key_pattern, ScanParams};
