//! Protocol codec
//!
//! Blocking, stream-based RESP2 reading and writing.

use std::io::{BufRead, ErrorKind, Read, Write};

use bytes::Bytes;

use super::Frame;
use crate::error::{Error, Result};

/// Maximum bulk string length (512 MB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum length of a header or inline request line (64 KB)
pub const MAX_INLINE_LEN: usize = 64 * 1024;

/// Maximum number of elements in one array
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// Maximum array nesting accepted by `read_frame`
pub const MAX_NESTING: usize = 32;

/// Upper bound on capacity reserved before elements actually arrive
const PREALLOC_ITEMS: usize = 1024;
const PREALLOC_BYTES: usize = 64 * 1024;

// =============================================================================
// Reading
// =============================================================================

/// Read one request as its argument list
///
/// Returns `Ok(None)` on a clean EOF between requests. An empty inline
/// line yields an empty argument list.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<Vec<Bytes>>> {
    let first = match reader.fill_buf()?.first() {
        Some(byte) => *byte,
        None => return Ok(None),
    };

    if first != b'*' {
        return Ok(read_line(reader)?.map(|line| split_inline(&line)));
    }

    let header = match read_line(reader)? {
        Some(line) => line,
        None => return Ok(None),
    };
    let count = parse_int(&header[1..])?;
    if count <= 0 {
        return Ok(Some(Vec::new()));
    }
    if count > MAX_ARRAY_LEN {
        return Err(Error::Protocol("invalid multibulk length".to_string()));
    }

    let mut args = Vec::with_capacity((count as usize).min(PREALLOC_ITEMS));
    for _ in 0..count {
        let line = read_line(reader)?.ok_or_else(unexpected_eof)?;
        match line.split_first() {
            Some((b'$', digits)) => {
                let len = parse_int(digits)?;
                if len < 0 {
                    return Err(Error::Protocol("invalid bulk length".to_string()));
                }
                args.push(read_bulk(reader, len as usize)?);
            }
            _ => {
                return Err(Error::Protocol(
                    "expected bulk string argument".to_string(),
                ))
            }
        }
    }
    Ok(Some(args))
}

/// Read one frame of any type
///
/// Returns `Ok(None)` on a clean EOF before the frame starts.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<Frame>> {
    match read_line(reader)? {
        Some(line) => parse_frame(reader, &line, 0).map(Some),
        None => Ok(None),
    }
}

fn parse_frame<R: BufRead>(reader: &mut R, line: &[u8], depth: usize) -> Result<Frame> {
    let (&tag, rest) = line
        .split_first()
        .ok_or_else(|| Error::Protocol("empty frame header".to_string()))?;

    match tag {
        b'+' => Ok(Frame::Simple(String::from_utf8_lossy(rest).into_owned())),
        b'-' => Ok(Frame::Error(String::from_utf8_lossy(rest).into_owned())),
        b':' => Ok(Frame::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Frame::Null);
            }
            read_bulk(reader, len as usize).map(Frame::Bulk)
        }
        b'*' => {
            let count = parse_int(rest)?;
            if count < 0 {
                return Ok(Frame::Null);
            }
            if count > MAX_ARRAY_LEN {
                return Err(Error::Protocol("invalid multibulk length".to_string()));
            }
            if depth >= MAX_NESTING {
                return Err(Error::Protocol("too deeply nested array".to_string()));
            }

            let mut items = Vec::with_capacity((count as usize).min(PREALLOC_ITEMS));
            for _ in 0..count {
                let line = read_line(reader)?.ok_or_else(unexpected_eof)?;
                items.push(parse_frame(reader, &line, depth + 1)?);
            }
            Ok(Frame::Array(items))
        }
        other => Err(Error::Protocol(format!(
            "unexpected frame type '{}'",
            other as char
        ))),
    }
}

/// Read a CRLF (or bare LF) terminated line, without the terminator
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let limit = (MAX_INLINE_LEN + 2) as u64;
    let read = reader.by_ref().take(limit).read_until(b'\n', &mut line)?;

    if read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        if read as u64 >= limit {
            return Err(Error::Protocol("too big inline request".to_string()));
        }
        return Err(unexpected_eof());
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn read_bulk<R: BufRead>(reader: &mut R, len: usize) -> Result<Bytes> {
    if len > MAX_BULK_LEN {
        return Err(Error::Protocol("invalid bulk length".to_string()));
    }

    let mut buf = Vec::with_capacity((len + 2).min(PREALLOC_BYTES));
    let read = reader.by_ref().take(len as u64 + 2).read_to_end(&mut buf)?;
    if read < len + 2 {
        return Err(unexpected_eof());
    }
    if &buf[len..] != b"\r\n" {
        return Err(Error::Protocol("expected CRLF after bulk string".to_string()));
    }
    buf.truncate(len);
    Ok(Bytes::from(buf))
}

fn parse_int(digits: &[u8]) -> Result<i64> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol("invalid length".to_string()))
}

fn split_inline(line: &[u8]) -> Vec<Bytes> {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|word| !word.is_empty())
        .map(Bytes::copy_from_slice)
        .collect()
}

fn unexpected_eof() -> Error {
    Error::Io(std::io::Error::new(
        ErrorKind::UnexpectedEof,
        "connection closed mid-frame",
    ))
}

// =============================================================================
// Writing
// =============================================================================

/// Write one frame and flush
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    writer.write_all(&frame.to_bytes())?;
    writer.flush()?;
    Ok(())
}
