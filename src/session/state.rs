//! Client session
//!
//! One per live connection. Immutable identity (id, peer address) plus a
//! mutex-guarded mutable state.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{Error, Result};

use super::{Binding, ClientKind, ClientSink};

/// Protocol flags carried by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionFlags(u8);

impl SessionFlags {
    /// Close the connection once the current reply is written
    pub const CLOSE_AFTER_REPLY: SessionFlags = SessionFlags(1);
    /// Receives the MONITOR feed
    pub const MONITOR: SessionFlags = SessionFlags(1 << 1);

    pub fn contains(&self, other: SessionFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: SessionFlags) {
        self.0 |= other.0;
    }
}

/// Mutable part of a session
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) name: Option<String>,
    pub(crate) binding: Option<Binding>,
    pub(crate) kind: ClientKind,
    pub(crate) flags: SessionFlags,
    pub(crate) last_cmd: String,
    pub(crate) last_interaction: Instant,
    /// Port a replica announced for itself
    pub(crate) replica_listening_port: Option<u16>,
}

/// A live client session
pub struct Session {
    id: u64,
    addr: String,
    created_at: Instant,
    sink: Arc<dyn ClientSink>,
    state: Mutex<SessionState>,
    closed: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        id: u64,
        addr: String,
        sink: Arc<dyn ClientSink>,
        binding: Option<Binding>,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            addr,
            created_at: now,
            sink,
            state: Mutex::new(SessionState {
                name: None,
                binding,
                kind: ClientKind::Normal,
                flags: SessionFlags::default(),
                last_cmd: "NULL".to_string(),
                last_interaction: now,
                replica_listening_port: None,
            }),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Peer address as `ip:port`
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Peer IP, when the address parses
    pub fn ip(&self) -> Option<IpAddr> {
        self.addr.parse::<SocketAddr>().ok().map(|a| a.ip())
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    // =========================================================================
    // Binding
    // =========================================================================

    pub fn binding(&self) -> Option<Binding> {
        self.state.lock().binding.clone()
    }

    /// Bound namespace; `None` until authenticated
    pub fn namespace(&self) -> Option<String> {
        self.state.lock().binding.as_ref().map(|b| b.namespace.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.lock().binding.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.state
            .lock()
            .binding
            .as_ref()
            .map(Binding::is_admin)
            .unwrap_or(false)
    }

    pub fn bind(&self, binding: Binding) {
        self.state.lock().binding = Some(binding);
    }

    // =========================================================================
    // Name, kind and flags
    // =========================================================================

    pub fn name(&self) -> Option<String> {
        self.state.lock().name.clone()
    }

    /// Set the display name; an empty name clears it
    pub fn set_name(&self, name: &str) -> Result<()> {
        validate_client_name(name)?;
        self.state.lock().name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        Ok(())
    }

    pub fn kind(&self) -> ClientKind {
        self.state.lock().kind
    }

    pub fn set_kind(&self, kind: ClientKind) {
        self.state.lock().kind = kind;
    }

    pub fn has_flag(&self, flag: SessionFlags) -> bool {
        self.state.lock().flags.contains(flag)
    }

    pub fn enable_flag(&self, flag: SessionFlags) {
        self.state.lock().flags.insert(flag);
    }

    /// Record the command about to run
    pub fn touch(&self, command: &str) {
        let mut state = self.state.lock();
        state.last_cmd = command.to_ascii_lowercase();
        state.last_interaction = Instant::now();
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Write an out-of-band frame (MONITOR feed)
    pub fn send(&self, frame: &[u8]) -> std::io::Result<()> {
        self.sink.send(frame)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Flip the closed flag; true only for the call that actually closed it
    pub(crate) fn mark_closed(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Force-close the transport. Idempotent.
    pub fn close(&self) -> bool {
        if self.mark_closed() {
            self.sink.close();
            true
        } else {
            false
        }
    }

    pub(crate) fn sink(&self) -> &Arc<dyn ClientSink> {
        &self.sink
    }

    /// CLIENT LIST / CLIENT INFO line (without trailing newline)
    pub fn to_line(&self) -> String {
        let state = self.state.lock();
        self.format_line(&state)
    }

    pub(crate) fn format_line(&self, state: &SessionState) -> String {
        let now = Instant::now();
        format!(
            "id={} addr={} name={} age={} idle={} flags={} namespace={} cmd={}",
            self.id,
            self.addr,
            state.name.as_deref().unwrap_or(""),
            now.duration_since(self.created_at).as_secs(),
            now.duration_since(state.last_interaction).as_secs(),
            flag_letters(state),
            state
                .binding
                .as_ref()
                .map(|b| b.namespace.as_str())
                .unwrap_or(""),
            state.last_cmd,
        )
    }
}

fn flag_letters(state: &SessionState) -> String {
    let mut flags = String::new();
    match state.kind {
        ClientKind::Replica => flags.push('S'),
        ClientKind::Master => flags.push('M'),
        ClientKind::PubSub => flags.push('P'),
        ClientKind::Normal => {}
    }
    if state.flags.contains(SessionFlags::MONITOR) {
        flags.push('O');
    }
    if state.flags.contains(SessionFlags::CLOSE_AFTER_REPLY) {
        flags.push('c');
    }
    if flags.is_empty() {
        flags.push('N');
    }
    flags
}

/// Client names must be printable ASCII without spaces so that CLIENT LIST
/// stays splittable on whitespace
pub fn validate_client_name(name: &str) -> Result<()> {
    if name.bytes().all(|b| (b'!'..=b'~').contains(&b)) {
        Ok(())
    } else {
        Err(Error::parse(
            "Client names cannot contain spaces, newlines or special characters",
        ))
    }
}
