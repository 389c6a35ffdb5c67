//! Protocol Module
//!
//! RESP2 framing for client-server communication.
//!
//! ## Frame Types
//! ```text
//! +OK\r\n                       simple string
//! -ERR message\r\n              error
//! :42\r\n                       integer
//! $5\r\nhello\r\n               bulk string      ($-1\r\n = null)
//! *2\r\n$4\r\nPING\r\n$2\r\nhi\r\n   array of frames
//! ```
//!
//! ### Requests
//! A request is an array of bulk strings. Plain-text inline requests
//! (`PING hi\r\n`) are accepted too, split on whitespace.

mod codec;
mod frame;

pub use codec::{read_frame, read_request, write_frame, MAX_BULK_LEN, MAX_INLINE_LEN, MAX_NESTING};
pub use frame::Frame;
