//! Argument helpers shared by the command parsers

use std::str::FromStr;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Argument `idx` as UTF-8 text
pub fn text(args: &[Bytes], idx: usize) -> Result<&str> {
    let arg = args.get(idx).ok_or(Error::WrongArity)?;
    std::str::from_utf8(arg).map_err(|_| Error::parse("invalid argument encoding"))
}

/// Argument `idx` as owned text
pub fn owned(args: &[Bytes], idx: usize) -> Result<String> {
    text(args, idx).map(str::to_string)
}

/// Argument `idx` lowercased, for keyword matching
pub fn keyword(args: &[Bytes], idx: usize) -> Result<String> {
    text(args, idx).map(str::to_ascii_lowercase)
}

/// Raw bytes of argument `idx` (keys may be binary)
pub fn raw(args: &[Bytes], idx: usize) -> Result<Vec<u8>> {
    args.get(idx)
        .map(|arg| arg.to_vec())
        .ok_or(Error::WrongArity)
}

/// Every argument from `from` on, as text
pub fn texts(args: &[Bytes], from: usize) -> Result<Vec<String>> {
    (from..args.len()).map(|idx| owned(args, idx)).collect()
}

/// Parse a number, mapping failure to the generic integer error
pub fn number<T: FromStr>(value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::not_integer())
}

/// Lossy rendering of every argument (gates and MONITOR)
pub fn lossy(args: &[Bytes]) -> Vec<String> {
    args.iter()
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}
