//! DUMP payload codec

use crate::error::{Error, Result};
use crate::storage::Value;

/// Payload format version
pub const DUMP_VERSION: u16 = 1;

/// Version (2) + CRC32 (4)
const FOOTER_SIZE: usize = 6;

/// Serialize `value` into a RESTORE-able payload
pub fn encode_dump(value: &Value) -> Result<Vec<u8>> {
    let mut payload = bincode::serialize(value)?;
    payload.extend_from_slice(&DUMP_VERSION.to_le_bytes());

    let crc = crc32fast::hash(&payload);
    payload.extend_from_slice(&crc.to_le_bytes());
    Ok(payload)
}

/// Verify and decode a payload produced by [`encode_dump`]
pub fn decode_dump(payload: &[u8]) -> Result<Value> {
    if payload.len() < FOOTER_SIZE {
        return Err(bad_payload());
    }

    let (body, crc_bytes) = payload.split_at(payload.len() - 4);
    let crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    if crc32fast::hash(body) != crc {
        return Err(bad_payload());
    }

    let (value_bytes, version_bytes) = body.split_at(body.len() - 2);
    if u16::from_le_bytes([version_bytes[0], version_bytes[1]]) != DUMP_VERSION {
        return Err(bad_payload());
    }

    bincode::deserialize(value_bytes).map_err(|_| Error::Rdb("Bad data format".to_string()))
}

fn bad_payload() -> Error {
    Error::Rdb("DUMP payload version or checksum are wrong".to_string())
}
