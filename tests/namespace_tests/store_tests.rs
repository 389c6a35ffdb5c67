//! Namespace Store Tests
//!
//! Token table rules and their exact error messages.

use std::sync::Arc;
use std::thread;

use harborkv::namespace::{NamespaceStore, DEFAULT_NAMESPACE, MAX_NAMESPACE_LEN};

fn message<T: std::fmt::Debug>(result: harborkv::Result<T>) -> String {
    result.unwrap_err().to_string()
}

// =============================================================================
// Add / Get
// =============================================================================

#[test]
fn test_add_and_lookup() {
    let store = NamespaceStore::new();
    store.add("ns1", "t1", "").unwrap();
    store.add("ns2", "t2", "").unwrap();

    assert_eq!(store.get("ns1").as_deref(), Some("t1"));
    assert_eq!(store.get_by_token("t2").as_deref(), Some("ns2"));
    assert_eq!(store.get("missing"), None);
    assert_eq!(store.len(), 2);
    assert!(store.contains_token("t1"));
}

#[test]
fn test_list_is_ordered_by_token() {
    let store = NamespaceStore::new();
    store.add("zeta", "a_token", "").unwrap();
    store.add("alpha", "b_token", "").unwrap();

    assert_eq!(
        store.list(),
        vec![
            ("zeta".to_string(), "a_token".to_string()),
            ("alpha".to_string(), "b_token".to_string()),
        ]
    );
}

#[test]
fn test_add_existing_namespace_fails() {
    let store = NamespaceStore::new();
    store.add("ns1", "t1", "").unwrap();

    assert_eq!(message(store.add("ns1", "t9", "")), "the namespace has already exists");
    assert_eq!(store.get("ns1").as_deref(), Some("t1"));
}

#[test]
fn test_duplicate_token_fails() {
    let store = NamespaceStore::new();
    store.add("ns1", "shared", "").unwrap();

    assert_eq!(message(store.add("ns2", "shared", "")), "the token has already exists");
    assert_eq!(message(store.set("ns2", "shared", "")), "the token has already exists");
    assert_eq!(store.len(), 1);
}

#[test]
fn test_token_equal_to_requirepass_fails() {
    let store = NamespaceStore::new();
    assert_eq!(
        message(store.add("ns1", "secret", "secret")),
        "the token is duplicated with requirepass"
    );
    assert!(store.is_empty());
}

#[test]
fn test_invalid_names_and_tokens() {
    let store = NamespaceStore::new();
    let long_name = "n".repeat(MAX_NAMESPACE_LEN + 1);

    assert_eq!(message(store.add(&long_name, "t", "")), "size exceed limit");
    assert_eq!(message(store.add("ns1", "", "")), "the token can't be empty");
    assert_eq!(
        message(store.add(DEFAULT_NAMESPACE, "t", "")),
        "forbidden to add the default namespace"
    );
    assert_eq!(
        message(store.set(DEFAULT_NAMESPACE, "t", "")),
        "forbidden to add the default namespace"
    );

    let longest = "n".repeat(MAX_NAMESPACE_LEN);
    store.add(&longest, "t", "").unwrap();
}

// =============================================================================
// Set / Del
// =============================================================================

#[test]
fn test_set_replaces_token() {
    let store = NamespaceStore::new();
    store.add("ns1", "old", "").unwrap();
    store.set("ns1", "new", "").unwrap();

    assert_eq!(store.get("ns1").as_deref(), Some("new"));
    assert!(!store.contains_token("old"));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_set_creates_missing_namespace() {
    let store = NamespaceStore::new();
    store.set("fresh", "t", "").unwrap();
    assert_eq!(store.get("fresh").as_deref(), Some("t"));
}

#[test]
fn test_del() {
    let store = NamespaceStore::new();
    store.add("ns1", "t1", "").unwrap();

    store.del("ns1").unwrap();
    assert!(store.get_by_token("t1").is_none());

    assert_eq!(message(store.del("ns1")), "the namespace was not found");
    assert_eq!(
        message(store.del(DEFAULT_NAMESPACE)),
        "forbidden to delete the default namespace"
    );
}

#[test]
fn test_from_pairs_applies_add_rules() {
    let pairs = vec![
        ("ns1".to_string(), "t1".to_string()),
        ("ns2".to_string(), "t1".to_string()),
    ];
    assert!(NamespaceStore::from_pairs(&pairs, "").is_err());

    let pairs = vec![("ns1".to_string(), "t1".to_string())];
    let store = NamespaceStore::from_pairs(&pairs, "").unwrap();
    assert_eq!(store.get("ns1").as_deref(), Some("t1"));
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_failed_persist_leaves_table_unchanged() {
    let store = NamespaceStore::new();
    store.add("ns1", "t1", "").unwrap();
    let refuse = |_: &[(String, String)]| -> harborkv::Result<()> {
        Err(harborkv::Error::exec("disk full"))
    };

    assert_eq!(message(store.add_with("ns2", "t2", "", refuse)), "disk full");
    assert_eq!(message(store.set_with("ns1", "t9", "", refuse)), "disk full");
    assert_eq!(message(store.del_with("ns1", refuse)), "disk full");

    assert_eq!(store.list(), vec![("ns1".to_string(), "t1".to_string())]);
}

#[test]
fn test_persist_sees_resulting_pairs() {
    let store = NamespaceStore::new();
    store.add("ns1", "t1", "").unwrap();

    let mut seen = Vec::new();
    store
        .add_with("ns2", "t2", "", |pairs| {
            seen = pairs.to_vec();
            Ok(())
        })
        .unwrap();
    assert_eq!(seen, store.list());
    assert_eq!(seen.len(), 2);

    // Validation failures never reach the persist step
    let mut called = false;
    assert!(store
        .add_with("ns1", "t3", "", |_| {
            called = true;
            Ok(())
        })
        .is_err());
    assert!(!called);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_readers_see_whole_table() {
    let store = Arc::new(NamespaceStore::new());
    store.add("ns", "t0", "").unwrap();

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 1..200 {
                store.set("ns", &format!("t{}", i), "").unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..200 {
                    // Exactly one token for the namespace at any instant
                    assert_eq!(store.list().len(), 1);
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(store.get("ns").as_deref(), Some("t199"));
}
