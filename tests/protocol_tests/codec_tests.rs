//! Codec Tests
//!
//! RESP request and reply framing over in-memory streams.

use std::io::{BufReader, Cursor};

use bytes::Bytes;
use harborkv::error::Error;
use harborkv::protocol::{
    read_frame, read_request, write_frame, Frame, MAX_INLINE_LEN, MAX_NESTING,
};

fn reader(data: &[u8]) -> BufReader<Cursor<Vec<u8>>> {
    BufReader::new(Cursor::new(data.to_vec()))
}

fn args(words: &[&str]) -> Vec<Bytes> {
    words
        .iter()
        .map(|w| Bytes::copy_from_slice(w.as_bytes()))
        .collect()
}

// =============================================================================
// Requests
// =============================================================================

#[test]
fn test_read_array_request() {
    let mut r = reader(b"*2\r\n$4\r\nPING\r\n$2\r\nhi\r\n");
    assert_eq!(read_request(&mut r).unwrap(), Some(args(&["PING", "hi"])));
    assert_eq!(read_request(&mut r).unwrap(), None);
}

#[test]
fn test_read_inline_request() {
    let mut r = reader(b"SCAN  0 COUNT\t5\r\n");
    assert_eq!(
        read_request(&mut r).unwrap(),
        Some(args(&["SCAN", "0", "COUNT", "5"]))
    );
}

#[test]
fn test_inline_request_bare_lf() {
    let mut r = reader(b"PING\n");
    assert_eq!(read_request(&mut r).unwrap(), Some(args(&["PING"])));
}

#[test]
fn test_empty_inline_line_is_empty_request() {
    let mut r = reader(b"\r\nPING\r\n");
    assert_eq!(read_request(&mut r).unwrap(), Some(Vec::new()));
    assert_eq!(read_request(&mut r).unwrap(), Some(args(&["PING"])));
}

#[test]
fn test_pipelined_requests() {
    let mut data = Frame::command(&["AUTH", "secret"]).to_bytes();
    data.extend_from_slice(b"PING\r\n");
    data.extend_from_slice(&Frame::command(&["ECHO", "a b"]).to_bytes());

    let mut r = reader(&data);
    assert_eq!(read_request(&mut r).unwrap(), Some(args(&["AUTH", "secret"])));
    assert_eq!(read_request(&mut r).unwrap(), Some(args(&["PING"])));
    assert_eq!(read_request(&mut r).unwrap(), Some(args(&["ECHO", "a b"])));
    assert_eq!(read_request(&mut r).unwrap(), None);
}

#[test]
fn test_binary_safe_bulk_argument() {
    let payload = [0u8, b'\r', b'\n', 255];
    let mut data = b"*2\r\n$7\r\nRESTORE\r\n$4\r\n".to_vec();
    data.extend_from_slice(&payload);
    data.extend_from_slice(b"\r\n");

    let request = read_request(&mut reader(&data)).unwrap().unwrap();
    assert_eq!(&request[1][..], &payload[..]);
}

#[test]
fn test_request_with_non_bulk_element_rejected() {
    let mut r = reader(b"*2\r\n$4\r\nPING\r\n:1\r\n");
    assert!(matches!(read_request(&mut r), Err(Error::Protocol(_))));
}

#[test]
fn test_truncated_request_is_eof_error() {
    let mut r = reader(b"*2\r\n$4\r\nPING\r\n");
    assert!(matches!(read_request(&mut r), Err(Error::Io(_))));

    let mut r = reader(b"*1\r\n$10\r\nshort\r\n");
    assert!(read_request(&mut r).is_err());
}

#[test]
fn test_nested_request_rejected_without_recursion() {
    let mut data = b"*1\r\n".repeat(200_000);
    data.extend_from_slice(b"$1\r\na\r\n");

    // Connection threads run on a small stack
    let result = std::thread::Builder::new()
        .stack_size(256 * 1024)
        .spawn(move || matches!(read_request(&mut reader(&data)), Err(Error::Protocol(_))))
        .unwrap()
        .join()
        .unwrap();
    assert!(result);
}

#[test]
fn test_huge_declared_bulk_is_eof_not_allocation() {
    let mut r = reader(b"*1\r\n$536870912\r\nab");
    assert!(matches!(read_request(&mut r), Err(Error::Io(_))));

    let mut r = reader(b"*1048576\r\n$4\r\nPING\r\n");
    assert!(matches!(read_request(&mut r), Err(Error::Io(_))));
}

#[test]
fn test_negative_bulk_in_request_rejected() {
    let mut r = reader(b"*1\r\n$-1\r\n");
    assert!(matches!(read_request(&mut r), Err(Error::Protocol(_))));
}

#[test]
fn test_oversized_inline_rejected() {
    let mut data = vec![b'a'; MAX_INLINE_LEN + 10];
    data.extend_from_slice(b"\r\n");
    assert!(matches!(
        read_request(&mut reader(&data)),
        Err(Error::Protocol(_))
    ));
}

// =============================================================================
// Frames
// =============================================================================

#[test]
fn test_read_each_frame_type() {
    let frames = vec![
        Frame::ok(),
        Frame::Error("ERR nope".to_string()),
        Frame::Integer(-42),
        Frame::bulk_str("hello"),
        Frame::bulk_str(""),
        Frame::Null,
        Frame::Array(vec![]),
        Frame::Array(vec![
            Frame::bulk_str("0"),
            Frame::bulk_array(["k1", "k2"]),
            Frame::Integer(7),
        ]),
    ];

    let mut data = Vec::new();
    for frame in &frames {
        write_frame(&mut data, frame).unwrap();
    }

    let mut r = reader(&data);
    for expected in &frames {
        assert_eq!(read_frame(&mut r).unwrap().as_ref(), Some(expected));
    }
    assert_eq!(read_frame(&mut r).unwrap(), None);
}

#[test]
fn test_frame_nesting_limited() {
    let mut ok = b"*1\r\n".repeat(MAX_NESTING);
    ok.extend_from_slice(b":1\r\n");
    assert!(read_frame(&mut reader(&ok)).unwrap().is_some());

    let mut deep = b"*1\r\n".repeat(200_000);
    deep.extend_from_slice(b":1\r\n");
    assert!(matches!(
        read_frame(&mut reader(&deep)),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_null_array_reads_as_null() {
    assert_eq!(read_frame(&mut reader(b"*-1\r\n")).unwrap(), Some(Frame::Null));
}

#[test]
fn test_wire_encoding() {
    assert_eq!(Frame::simple("PONG").to_bytes(), b"+PONG\r\n");
    assert_eq!(Frame::Error("ERR x".to_string()).to_bytes(), b"-ERR x\r\n");
    assert_eq!(Frame::Array(vec![]).to_bytes(), b"*0\r\n");
    assert_eq!(
        Frame::command(&["GET", "k"]).to_bytes(),
        b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n".to_vec()
    );
}

#[test]
fn test_malformed_frames_rejected() {
    for data in [
        &b"?what\r\n"[..],
        b"$abc\r\n",
        b":12x\r\n",
        b"$3\r\nabcXY",
        b"*99999999\r\n",
    ] {
        assert!(read_frame(&mut reader(data)).is_err(), "{:?}", data);
    }
}

#[test]
fn test_as_text() {
    assert_eq!(Frame::bulk_str("v").as_text().as_deref(), Some("v"));
    assert_eq!(Frame::simple("OK").as_text().as_deref(), Some("OK"));
    assert_eq!(Frame::Integer(1).as_text(), None);
    assert!(Frame::Error("ERR".to_string()).is_error());
}
