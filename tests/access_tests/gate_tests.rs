//! Authorization Gate Tests
//!
//! NOAUTH gate, admin gate and the replica namespace rule, exercised
//! through command dispatch.

use std::net::IpAddr;
use std::sync::Arc;

use bytes::Bytes;
use harborkv::commands::dispatch;
use harborkv::error::{Error, Result};
use harborkv::protocol::Frame;
use harborkv::replication::{HostResolver, LinkState, UpstreamTransport};
use harborkv::session::{Binding, ClientSink, Session};
use harborkv::storage::Value;
use harborkv::{Config, ServerContext};
use tempfile::TempDir;

const PERMISSION: &str = "ERR admin permission required to perform the command";

struct NullSink;

impl ClientSink for NullSink {
    fn send(&self, _frame: &[u8]) -> std::io::Result<()> {
        Ok(())
    }

    fn close(&self) {}
}

/// Resolves literal IPs only
struct LiteralResolver;

impl HostResolver for LiteralResolver {
    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        host.parse()
            .map(|ip| vec![ip])
            .map_err(|_| Error::exec(format!("Can not resolve hostname: {}", host)))
    }
}

/// Transport that never leaves the process
struct IdleTransport;

impl UpstreamTransport for IdleTransport {
    fn start(&self, _host: &str, _port: u16, _listening_port: u16) -> Result<()> {
        Ok(())
    }

    fn stop(&self) {}

    fn state(&self) -> LinkState {
        LinkState::Connecting
    }
}

fn context(config: Config) -> Arc<ServerContext> {
    ServerContext::builder(config)
        .resolver(Box::new(LiteralResolver))
        .transport(Arc::new(IdleTransport))
        .build()
        .unwrap()
}

fn connect(ctx: &ServerContext) -> Arc<Session> {
    ctx.registry()
        .register("127.0.0.1:40000", Arc::new(NullSink), ctx.initial_binding())
}

fn call(ctx: &ServerContext, session: &Session, words: &[&str]) -> Frame {
    let args: Vec<Bytes> = words
        .iter()
        .map(|w| Bytes::copy_from_slice(w.as_bytes()))
        .collect();
    dispatch(ctx, session, &args)
}

fn error_text(frame: &Frame) -> String {
    match frame {
        Frame::Error(text) => text.clone(),
        other => panic!("expected an error reply, got {:?}", other),
    }
}

// =============================================================================
// NOAUTH Gate
// =============================================================================

#[test]
fn test_password_server_requires_auth() {
    let dir = TempDir::new().unwrap();
    let ctx = context(Config::builder().requirepass("secret").data_dir(dir.path()).build());
    let session = connect(&ctx);

    assert!(!session.is_authenticated());
    assert_eq!(
        error_text(&call(&ctx, &session, &["PING"])),
        "NOAUTH Authentication required."
    );
    assert_eq!(
        error_text(&call(&ctx, &session, &["KEYS", "*"])),
        "NOAUTH Authentication required."
    );

    assert_eq!(call(&ctx, &session, &["AUTH", "secret"]), Frame::ok());
    assert_eq!(call(&ctx, &session, &["PING"]), Frame::simple("PONG"));
}

#[test]
fn test_hello_without_auth_is_refused() {
    let dir = TempDir::new().unwrap();
    let ctx = context(Config::builder().requirepass("secret").data_dir(dir.path()).build());
    let session = connect(&ctx);

    assert_eq!(
        error_text(&call(&ctx, &session, &["HELLO", "2"])),
        "NOAUTH Authentication required."
    );

    let reply = call(&ctx, &session, &["HELLO", "2", "AUTH", "default", "secret"]);
    assert!(!reply.is_error());
    assert!(session.is_admin());
}

#[test]
fn test_no_password_server_starts_admin() {
    let dir = TempDir::new().unwrap();
    let ctx = context(Config::builder().data_dir(dir.path()).build());
    let session = connect(&ctx);

    assert_eq!(session.binding(), Some(Binding::admin()));
    assert_eq!(call(&ctx, &session, &["PING", "hi"]), Frame::bulk_str("hi"));
}

#[test]
fn test_unknown_command_and_arity() {
    let dir = TempDir::new().unwrap();
    let ctx = context(Config::builder().data_dir(dir.path()).build());
    let session = connect(&ctx);

    assert_eq!(
        error_text(&call(&ctx, &session, &["NOPE"])),
        "ERR unknown command `nope`"
    );
    assert_eq!(
        error_text(&call(&ctx, &session, &["ECHO"])),
        "ERR wrong number of arguments"
    );
}

// =============================================================================
// Admin Gate
// =============================================================================

#[test]
fn test_restricted_session_denied_admin_commands() {
    let dir = TempDir::new().unwrap();
    let ctx = context(
        Config::builder()
            .namespace("tenant", "tenant_token")
            .data_dir(dir.path())
            .build(),
    );
    let session = connect(&ctx);
    assert_eq!(call(&ctx, &session, &["AUTH", "tenant_token"]), Frame::ok());

    for words in [
        &["FLUSHALL"][..],
        &["CONFIG", "GET", "*"],
        &["NAMESPACE", "GET", "*"],
        &["CLIENT", "LIST"],
        &["CLIENT", "KILL", "127.0.0.1:1"],
        &["SLAVEOF", "NO", "ONE"],
        &["BGSAVE"],
        &["SHUTDOWN"],
    ] {
        assert_eq!(error_text(&call(&ctx, &session, words)), PERMISSION, "{:?}", words);
    }

    assert!(!ctx.is_shutdown());
    assert_eq!(call(&ctx, &session, &["CLIENT", "SETNAME", "worker"]), Frame::ok());
    assert_eq!(call(&ctx, &session, &["KEYS", "*"]), Frame::Array(vec![]));
}

#[test]
fn test_denied_flushall_has_no_effect() {
    let dir = TempDir::new().unwrap();
    let ctx = context(
        Config::builder()
            .namespace("tenant", "tenant_token")
            .data_dir(dir.path())
            .build(),
    );
    ctx.storage()
        .put("default", b"keep", Value::String(b"v".to_vec()), None)
        .unwrap();

    let session = connect(&ctx);
    call(&ctx, &session, &["AUTH", "tenant_token"]);
    call(&ctx, &session, &["FLUSHALL"]);

    assert!(ctx.storage().exists("default", b"keep").unwrap());
}

#[test]
fn test_restricted_commands_stay_in_namespace() {
    let dir = TempDir::new().unwrap();
    let ctx = context(
        Config::builder()
            .namespace("tenant", "tenant_token")
            .data_dir(dir.path())
            .build(),
    );
    ctx.storage()
        .put("default", b"admin_key", Value::String(vec![]), None)
        .unwrap();
    ctx.storage()
        .put("tenant", b"tenant_key", Value::String(vec![]), None)
        .unwrap();

    let session = connect(&ctx);
    call(&ctx, &session, &["AUTH", "tenant_token"]);

    assert_eq!(
        call(&ctx, &session, &["KEYS", "*"]),
        Frame::bulk_array(["tenant_key"])
    );
    assert_eq!(call(&ctx, &session, &["FLUSHDB"]), Frame::ok());
    assert!(ctx.storage().exists("default", b"admin_key").unwrap());
    assert!(!ctx.storage().exists("tenant", b"tenant_key").unwrap());
}

// =============================================================================
// Replica Namespace Rule
// =============================================================================

#[test]
fn test_namespace_read_only_on_replica() {
    let dir = TempDir::new().unwrap();
    let ctx = context(
        Config::builder()
            .repl_namespace_enabled(true)
            .namespace("tenant", "tenant_token")
            .data_dir(dir.path())
            .build(),
    );
    let admin = connect(&ctx);

    assert_eq!(call(&ctx, &admin, &["SLAVEOF", "10.1.1.1", "6379"]), Frame::ok());
    assert_eq!(
        error_text(&call(&ctx, &admin, &["NAMESPACE", "ADD", "other", "other_token"])),
        "ERR namespace is read-only for slave"
    );
    assert_eq!(
        error_text(&call(&ctx, &admin, &["NAMESPACE", "DEL", "tenant"])),
        "ERR namespace is read-only for slave"
    );
    assert_eq!(
        call(&ctx, &admin, &["NAMESPACE", "GET", "tenant"]),
        Frame::bulk_str("tenant_token")
    );

    assert_eq!(call(&ctx, &admin, &["SLAVEOF", "NO", "ONE"]), Frame::ok());
    assert_eq!(
        call(&ctx, &admin, &["NAMESPACE", "ADD", "other", "other_token"]),
        Frame::ok()
    );
}
