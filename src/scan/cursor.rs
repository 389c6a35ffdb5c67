//! Scan cursor codec

use crate::error::{Error, Result};

/// The sentinel cursor: begin when sent, done when returned
pub const SCAN_COMPLETE: &str = "0";

/// Fixed structural prefix of every non-sentinel cursor
const CURSOR_PREFIX: char = '_';

/// Kind of iteration a cursor belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorType {
    /// Main keyspace (SCAN)
    Base,
    Hash,
    Set,
    ZSet,
}

impl CursorType {
    fn tag(self) -> char {
        match self {
            CursorType::Base => 'b',
            CursorType::Hash => 'h',
            CursorType::Set => 's',
            CursorType::ZSet => 'z',
        }
    }
}

/// Where a scan resumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStart {
    Beginning,
    /// Strictly after this key
    After(Vec<u8>),
}

/// Encode the last visited key as an opaque cursor
pub fn encode(kind: CursorType, last_key: &[u8]) -> String {
    let mut cursor = String::with_capacity(2 + last_key.len() * 2);
    cursor.push(CURSOR_PREFIX);
    cursor.push(kind.tag());
    for byte in last_key {
        cursor.push(HEX[(byte >> 4) as usize] as char);
        cursor.push(HEX[(byte & 0x0f) as usize] as char);
    }
    cursor
}

/// Cursor to return after a round that stopped at `end_key`
///
/// The empty key is a real key and encodes as the bare prefix and tag.
pub fn next_cursor(kind: CursorType, end_key: Option<&[u8]>) -> String {
    match end_key {
        Some(key) => encode(kind, key),
        None => SCAN_COMPLETE.to_string(),
    }
}

/// Decode a client cursor for a scan of kind `expected`
pub fn decode(cursor: &str, expected: CursorType) -> Result<ScanStart> {
    if cursor == SCAN_COMPLETE {
        return Ok(ScanStart::Beginning);
    }

    let mut chars = cursor.chars();
    if chars.next() != Some(CURSOR_PREFIX) || chars.next() != Some(expected.tag()) {
        return Err(invalid_cursor());
    }

    let hex = chars.as_str().as_bytes();
    if hex.len() % 2 != 0 {
        return Err(invalid_cursor());
    }

    let mut key = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks(2) {
        let hi = nibble(pair[0]).ok_or_else(invalid_cursor)?;
        let lo = nibble(pair[1]).ok_or_else(invalid_cursor)?;
        key.push(hi << 4 | lo);
    }
    Ok(ScanStart::After(key))
}

const HEX: &[u8; 16] = b"0123456789abcdef";

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn invalid_cursor() -> Error {
    Error::parse("invalid cursor")
}
