//! MATCH / COUNT options

use crate::error::{Error, Result};

/// Bounds of one scan round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanParams {
    /// Only keys starting with this prefix
    pub prefix: Vec<u8>,
    /// COUNT, when given
    pub count: Option<usize>,
}

impl ScanParams {
    /// Parse `[MATCH pattern] [COUNT n]` given as option/value pairs
    pub fn parse(options: &[&str]) -> Result<Self> {
        if options.len() % 2 != 0 {
            return Err(Error::WrongArity);
        }

        let mut params = ScanParams {
            prefix: Vec::new(),
            count: None,
        };

        for pair in options.chunks(2) {
            let (option, value) = (pair[0], pair[1]);
            if option.eq_ignore_ascii_case("match") {
                params.prefix = parse_key_pattern(value)?;
            } else if option.eq_ignore_ascii_case("count") {
                let count: i64 = value.parse().map_err(|_| Error::not_integer())?;
                if count <= 0 {
                    return Err(Error::parse("COUNT must be positive"));
                }
                params.count = Some(count as usize);
            } else {
                return Err(Error::syntax());
            }
        }
        Ok(params)
    }

    /// Keys to visit this round
    pub fn limit(&self, default_count: usize) -> usize {
        self.count.unwrap_or(default_count).max(1)
    }
}

/// Turn a key pattern into a prefix; only `*` and `prefix*` are supported
pub fn parse_key_pattern(pattern: &str) -> Result<Vec<u8>> {
    match pattern.strip_suffix('*') {
        Some(prefix) => Ok(prefix.as_bytes().to_vec()),
        None => Err(Error::exec("only keys prefix match was supported")),
    }
}
