//! Scan Tests
//!
//! Cursor codec properties and full SCAN walks over a namespace.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;
use harborkv::commands::dispatch;
use harborkv::protocol::Frame;
use harborkv::scan::{decode, encode, next_cursor, CursorType, ScanParams, ScanStart, SCAN_COMPLETE};
use harborkv::session::{ClientSink, Session};
use harborkv::storage::Value;
use harborkv::{Config, ServerContext};
use tempfile::TempDir;

struct NullSink;

impl ClientSink for NullSink {
    fn send(&self, _frame: &[u8]) -> std::io::Result<()> {
        Ok(())
    }

    fn close(&self) {}
}

fn setup(dir: &TempDir) -> (Arc<ServerContext>, Arc<Session>) {
    let config = Config::builder()
        .namespace("tenant", "tenant_token")
        .data_dir(dir.path())
        .build();
    let ctx = ServerContext::builder(config).build().unwrap();
    let session = ctx
        .registry()
        .register("127.0.0.1:40000", Arc::new(NullSink), ctx.initial_binding());

    for c in b'a'..=b'z' {
        ctx.storage()
            .put("default", &[c], Value::String(vec![c]), None)
            .unwrap();
    }
    (ctx, session)
}

fn call(ctx: &ServerContext, session: &Session, words: &[&str]) -> Frame {
    let args: Vec<Bytes> = words
        .iter()
        .map(|w| Bytes::copy_from_slice(w.as_bytes()))
        .collect();
    dispatch(ctx, session, &args)
}

/// Split a SCAN reply into `(cursor, keys)`
fn scan_reply(frame: Frame) -> (String, Vec<String>) {
    let Frame::Array(mut parts) = frame else {
        panic!("expected array reply, got {:?}", frame);
    };
    assert_eq!(parts.len(), 2);
    let keys = match parts.pop() {
        Some(Frame::Array(keys)) => keys.iter().filter_map(Frame::as_text).collect(),
        other => panic!("expected key list, got {:?}", other),
    };
    let cursor = parts[0].as_text().unwrap();
    (cursor, keys)
}

/// Follow cursors from "0" until the scan reports completion
fn scan_all(ctx: &ServerContext, session: &Session, extra: &[&str]) -> (Vec<String>, usize) {
    let mut cursor = SCAN_COMPLETE.to_string();
    let mut seen = Vec::new();
    let mut rounds = 0;
    loop {
        let mut words = vec!["SCAN", cursor.as_str()];
        words.extend_from_slice(extra);
        let (next, keys) = scan_reply(call(ctx, session, &words));
        seen.extend(keys);
        rounds += 1;
        assert!(rounds <= 100, "scan did not terminate");
        if next == SCAN_COMPLETE {
            return (seen, rounds);
        }
        cursor = next;
    }
}

// =============================================================================
// Cursor Codec
// =============================================================================

#[test]
fn test_cursor_round_trip_keeps_type() {
    for kind in [CursorType::Base, CursorType::Hash, CursorType::Set, CursorType::ZSet] {
        let cursor = encode(kind, b"user:42");
        assert_eq!(decode(&cursor, kind).unwrap(), ScanStart::After(b"user:42".to_vec()));
    }
}

#[test]
fn test_cursor_of_other_type_rejected() {
    let kinds = [CursorType::Base, CursorType::Hash, CursorType::Set, CursorType::ZSet];
    for produced in kinds {
        let cursor = encode(produced, b"k");
        for expected in kinds.iter().filter(|k| **k != produced) {
            assert!(decode(&cursor, *expected).is_err());
        }
    }
}

#[test]
fn test_next_cursor_sentinel() {
    assert_eq!(next_cursor(CursorType::Base, None), SCAN_COMPLETE);
    assert_ne!(next_cursor(CursorType::Base, Some(b"k")), SCAN_COMPLETE);
    assert_ne!(next_cursor(CursorType::Base, Some(b"")), SCAN_COMPLETE);
}

#[test]
fn test_scan_params() {
    let params = ScanParams::parse(&["MATCH", "a*", "COUNT", "3"]).unwrap();
    assert_eq!(params.prefix, b"a");
    assert_eq!(params.limit(20), 3);
    assert!(ScanParams::parse(&["COUNT", "-1"]).is_err());
    assert!(ScanParams::parse(&["MATCH", "*a"]).is_err());
}

// =============================================================================
// SCAN Walks
// =============================================================================

#[test]
fn test_scan_page_ending_on_empty_key_continues() {
    let dir = TempDir::new().unwrap();
    let (ctx, session) = setup(&dir);
    ctx.storage()
        .put("default", b"", Value::String(b"empty".to_vec()), None)
        .unwrap();

    let (cursor, keys) = scan_reply(call(&ctx, &session, &["SCAN", "0", "COUNT", "1"]));
    assert_eq!(keys, vec![String::new()]);
    assert_ne!(cursor, SCAN_COMPLETE);

    let (seen, _) = scan_all(&ctx, &session, &["COUNT", "1"]);
    assert_eq!(seen.len(), 27);
    assert_eq!(seen.iter().collect::<BTreeSet<_>>().len(), 27);
}

#[test]
fn test_scan_returns_every_key_once_for_any_count() {
    let dir = TempDir::new().unwrap();
    let (ctx, session) = setup(&dir);
    let expected: BTreeSet<String> = (b'a'..=b'z').map(|c| (c as char).to_string()).collect();

    for count in 1..=30 {
        let count_arg = count.to_string();
        let (seen, rounds) = scan_all(&ctx, &session, &["COUNT", &count_arg]);

        let unique: BTreeSet<String> = seen.iter().cloned().collect();
        assert_eq!(unique.len(), seen.len(), "duplicates with COUNT {}", count);
        assert_eq!(unique, expected, "keys differ with COUNT {}", count);
        assert_eq!(rounds, (26 + count - 1) / count, "rounds with COUNT {}", count);
    }
}

#[test]
fn test_scan_default_count() {
    let dir = TempDir::new().unwrap();
    let (ctx, session) = setup(&dir);

    let (cursor, keys) = scan_reply(call(&ctx, &session, &["SCAN", "0"]));
    assert_eq!(keys.len(), 20);
    assert_ne!(cursor, SCAN_COMPLETE);

    let (cursor, keys) = scan_reply(call(&ctx, &session, &["SCAN", &cursor]));
    assert_eq!(keys.len(), 6);
    assert_eq!(cursor, SCAN_COMPLETE);
}

#[test]
fn test_scan_match_prefix() {
    let dir = TempDir::new().unwrap();
    let (ctx, session) = setup(&dir);
    for key in ["user:1", "user:2", "user:3", "v"] {
        ctx.storage()
            .put("default", key.as_bytes(), Value::String(vec![]), None)
            .unwrap();
    }

    let (seen, _) = scan_all(&ctx, &session, &["MATCH", "user:*", "COUNT", "1"]);
    assert_eq!(seen, vec!["user:1", "user:2", "user:3"]);
}

#[test]
fn test_scan_confined_to_namespace() {
    let dir = TempDir::new().unwrap();
    let (ctx, session) = setup(&dir);
    ctx.storage()
        .put("tenant", b"only_tenant", Value::String(vec![]), None)
        .unwrap();

    assert_eq!(call(&ctx, &session, &["AUTH", "tenant_token"]), Frame::ok());
    let (seen, _) = scan_all(&ctx, &session, &[]);
    assert_eq!(seen, vec!["only_tenant"]);
}

#[test]
fn test_scan_rejects_bad_input() {
    let dir = TempDir::new().unwrap();
    let (ctx, session) = setup(&dir);

    let hash_cursor = encode(CursorType::Hash, b"a");
    for words in [
        vec!["SCAN", hash_cursor.as_str()],
        vec!["SCAN", "not-a-cursor"],
        vec!["SCAN", "0", "MATCH", "a*b"],
        vec!["SCAN", "0", "COUNT", "0"],
        vec!["SCAN", "0", "COUNT"],
        vec!["SCAN", "0", "LIMIT", "3"],
    ] {
        assert!(call(&ctx, &session, &words).is_error(), "{:?}", words);
    }
}

#[test]
fn test_scan_resumes_after_deleted_cursor_key() {
    let dir = TempDir::new().unwrap();
    let (ctx, session) = setup(&dir);

    let (cursor, keys) = scan_reply(call(&ctx, &session, &["SCAN", "0", "COUNT", "3"]));
    assert_eq!(keys, vec!["a", "b", "c"]);

    // The cursor key itself disappearing does not derail the walk
    ctx.storage().delete("default", b"c").unwrap();
    let (_, keys) = scan_reply(call(&ctx, &session, &["SCAN", &cursor, "COUNT", "3"]));
    assert_eq!(keys, vec!["d", "e", "f"]);
}
