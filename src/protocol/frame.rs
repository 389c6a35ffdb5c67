//! Frame definitions

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Error;

/// One RESP2 value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    /// Error text without the leading `-`
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    /// Null bulk string
    Null,
    Array(Vec<Frame>),
}

impl Frame {
    /// `+OK`
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    pub fn simple(text: impl Into<String>) -> Self {
        Frame::Simple(text.into())
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(data.into())
    }

    pub fn bulk_str(text: &str) -> Self {
        Frame::Bulk(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Error reply for a failed command
    pub fn error(err: &Error) -> Self {
        Frame::Error(err.reply_line())
    }

    /// Array of bulk strings
    pub fn bulk_array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        Frame::Array(
            items
                .into_iter()
                .map(|item| Frame::Bulk(Bytes::copy_from_slice(item.as_ref())))
                .collect(),
        )
    }

    /// Request frame, as a client sends it
    pub fn command(args: &[&str]) -> Self {
        Frame::bulk_array(args)
    }

    /// Bulk payload as text (lossy), for simple and bulk strings
    pub fn as_text(&self) -> Option<String> {
        match self {
            Frame::Simple(s) | Frame::Error(s) => Some(s.clone()),
            Frame::Bulk(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Append the wire encoding to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Frame::Simple(text) => {
                buf.put_u8(b'+');
                buf.put_slice(text.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Frame::Error(text) => {
                buf.put_u8(b'-');
                buf.put_slice(text.as_bytes());
                buf.put_slice(b"\r\n");
            }
            Frame::Integer(n) => {
                buf.put_u8(b':');
                buf.put_slice(n.to_string().as_bytes());
                buf.put_slice(b"\r\n");
            }
            Frame::Bulk(data) => {
                buf.put_u8(b'$');
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                buf.put_slice(data);
                buf.put_slice(b"\r\n");
            }
            Frame::Null => buf.put_slice(b"$-1\r\n"),
            Frame::Array(items) => {
                buf.put_u8(b'*');
                buf.put_slice(items.len().to_string().as_bytes());
                buf.put_slice(b"\r\n");
                for item in items {
                    item.encode(buf);
                }
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.to_vec()
    }
}
