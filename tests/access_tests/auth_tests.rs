//! Authentication Tests
//!
//! Token resolution against namespace tokens and the global password.

use std::sync::Arc;

use harborkv::access::authenticate;
use harborkv::error::Error;
use harborkv::namespace::NamespaceStore;
use harborkv::session::{Binding, ClientSink, ConnectionRegistry, Privilege, Session};

struct NullSink;

impl ClientSink for NullSink {
    fn send(&self, _frame: &[u8]) -> std::io::Result<()> {
        Ok(())
    }

    fn close(&self) {}
}

fn store() -> NamespaceStore {
    let store = NamespaceStore::new();
    store.add("tenant_a", "token_a", "").unwrap();
    store.add("tenant_b", "token_b", "").unwrap();
    store
}

fn unbound_session(registry: &ConnectionRegistry) -> Arc<Session> {
    registry.register("127.0.0.1:50000", Arc::new(NullSink), None)
}

// =============================================================================
// Namespace Tokens
// =============================================================================

#[test]
fn test_token_binds_restricted_namespace() {
    let store = store();

    for requirepass in ["", "secret"] {
        let outcome = authenticate(&store, requirepass, "token_a");
        assert_eq!(outcome.binding, Some(Binding::restricted("tenant_a")));
        assert!(outcome.report.is_ok());
    }
}

#[test]
fn test_each_token_reaches_its_own_namespace() {
    let store = store();
    let registry = ConnectionRegistry::new();
    let session = unbound_session(&registry);

    authenticate(&store, "secret", "token_b")
        .apply(&session)
        .unwrap();

    assert_eq!(session.namespace().as_deref(), Some("tenant_b"));
    assert!(!session.is_admin());
    assert_eq!(
        session.binding().map(|b| b.privilege),
        Some(Privilege::Restricted)
    );
}

// =============================================================================
// Global Password
// =============================================================================

#[test]
fn test_global_password_binds_admin() {
    let store = store();
    let registry = ConnectionRegistry::new();
    let session = unbound_session(&registry);

    authenticate(&store, "secret", "secret")
        .apply(&session)
        .unwrap();

    assert_eq!(session.binding(), Some(Binding::admin()));
    assert!(session.is_admin());
}

#[test]
fn test_wrong_password_leaves_session_untouched() {
    let store = store();
    let registry = ConnectionRegistry::new();
    let session = unbound_session(&registry);

    let outcome = authenticate(&store, "secret", "guess");
    assert!(outcome.binding.is_none());
    assert!(matches!(outcome.report, Err(Error::InvalidPassword)));

    assert!(outcome.apply(&session).is_err());
    assert!(!session.is_authenticated());
}

#[test]
fn test_wrong_password_keeps_previous_binding() {
    let store = store();
    let registry = ConnectionRegistry::new();
    let session = unbound_session(&registry);
    session.bind(Binding::restricted("tenant_a"));

    assert!(authenticate(&store, "secret", "guess").apply(&session).is_err());
    assert_eq!(session.namespace().as_deref(), Some("tenant_a"));
}

// =============================================================================
// No Password Configured
// =============================================================================

#[test]
fn test_no_password_binds_admin_and_reports_error() {
    let store = store();
    let registry = ConnectionRegistry::new();
    let session = unbound_session(&registry);

    let outcome = authenticate(&store, "", "anything");
    assert_eq!(outcome.binding, Some(Binding::admin()));
    assert!(matches!(outcome.report, Err(Error::NoPasswordConfigured)));

    // The session is bound even though the caller sees an error
    let err = outcome.apply(&session).unwrap_err();
    assert_eq!(err.reply_line(), "ERR Client sent AUTH, but no password is set");
    assert!(session.is_admin());
    assert_eq!(session.namespace().as_deref(), Some("default"));
}

#[test]
fn test_no_password_token_still_restricted() {
    let store = store();
    let outcome = authenticate(&store, "", "token_a");
    assert_eq!(outcome.binding, Some(Binding::restricted("tenant_a")));
    assert!(outcome.report.is_ok());
}
