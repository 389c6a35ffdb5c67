//! Connection Registry
//!
//! The single shared table of live sessions.
//!
//! ## Concurrency
//! - `sessions`: RwLock; registration and removal take the write lock,
//!   enumeration and kill take the read lock
//! - kill inspects and closes each candidate while holding that session's
//!   state lock, so a session is never closed mid-mutation
//! - closing goes through `Session::mark_closed`, so a session is counted
//!   and torn down at most once even if it is disconnecting concurrently
//! - MONITOR lines go through a bounded queue drained by one writer thread
//!   per monitor; a monitor whose queue is full is closed, so command
//!   execution never waits on a monitor socket

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use super::{Binding, ClientKind, ClientSink, KillFilter, Session, SessionFlags};
use crate::error::{Error, Result};

/// MONITOR lines queued per monitor before it is considered stalled
pub const MONITOR_BACKLOG: usize = 1024;

/// Registry of all live client sessions
pub struct ConnectionRegistry {
    sessions: RwLock<BTreeMap<u64, Arc<Session>>>,

    /// Feed queue of each monitor session
    monitors: Mutex<BTreeMap<u64, Sender<Bytes>>>,

    /// Next session id (monotonic, starts at 1)
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            monitors: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new session. `binding` is the initial namespace binding
    /// (`None` when a password must be presented first).
    pub fn register(
        &self,
        addr: impl Into<String>,
        sink: Arc<dyn ClientSink>,
        binding: Option<Binding>,
    ) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::new(id, addr.into(), sink, binding));
        self.sessions.write().insert(id, Arc::clone(&session));
        tracing::debug!(id, addr = session.addr(), "session registered");
        session
    }

    /// Remove a session on disconnect
    pub fn deregister(&self, id: u64) -> Option<Arc<Session>> {
        let removed = self.sessions.write().remove(&id);
        self.monitors.lock().remove(&id);
        if let Some(session) = &removed {
            session.mark_closed();
            tracing::debug!(id, addr = session.addr(), "session deregistered");
        }
        removed
    }

    pub fn get(&self, id: u64) -> Option<Arc<Session>> {
        self.sessions.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// CLIENT LIST body: one line per session, in id order
    pub fn list(&self) -> String {
        let sessions = self.sessions.read();
        let mut out = String::new();
        for session in sessions.values() {
            let state = session.lock_state();
            out.push_str(&session.format_line(&state));
            out.push('\n');
        }
        out
    }

    /// Close every session selected by `filter`, returning how many were
    /// closed. The caller itself is never torn down mid-command: when it
    /// matches, it is flagged to close after its reply instead.
    pub fn kill(&self, filter: &KillFilter, caller: &Session) -> u64 {
        let sessions = self.sessions.read();
        let mut killed = 0;

        for session in sessions.values() {
            if session.is_closed() {
                continue;
            }

            let mut state = session.lock_state();
            if !filter.matches(session.id(), session.addr(), state.kind, caller.id()) {
                continue;
            }

            if session.id() == caller.id() {
                state.flags.insert(SessionFlags::CLOSE_AFTER_REPLY);
                killed += 1;
            } else if session.mark_closed() {
                session.sink().close();
                killed += 1;
            }
        }

        tracing::info!(killed, by = caller.addr(), "client kill");
        killed
    }

    /// Force-close every session (server shutdown)
    pub fn close_all(&self) -> usize {
        self.monitors.lock().clear();
        let sessions = self.sessions.read();
        sessions.values().filter(|session| session.close()).count()
    }

    /// Mark a session as an attached replica that announced `listening_port`
    pub fn mark_replica(&self, id: u64, listening_port: u16) -> bool {
        match self.sessions.read().get(&id) {
            Some(session) => {
                let mut state = session.lock_state();
                state.kind = ClientKind::Replica;
                state.replica_listening_port = Some(listening_port);
                true
            }
            None => false,
        }
    }

    /// `(ip, listening_port)` of every attached replica
    pub fn replica_addresses(&self) -> Vec<(String, u16)> {
        let sessions = self.sessions.read();
        sessions
            .values()
            .filter_map(|session| {
                let state = session.lock_state();
                match (state.kind, state.replica_listening_port, session.ip()) {
                    (ClientKind::Replica, Some(port), Some(ip)) => Some((ip.to_string(), port)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Switch session `id` into monitor mode and start its feed writer
    pub fn add_monitor(&self, id: u64) -> Result<()> {
        let session = self
            .get(id)
            .ok_or_else(|| Error::exec("No such client"))?;

        let mut monitors = self.monitors.lock();
        if monitors.contains_key(&id) {
            return Ok(());
        }
        let (tx, rx) = channel::bounded(MONITOR_BACKLOG);
        spawn_monitor_writer(Arc::clone(&session), rx)?;
        monitors.insert(id, tx);
        session.enable_flag(SessionFlags::MONITOR);
        Ok(())
    }

    /// Queue a MONITOR line for every monitor session except `origin`.
    /// Never blocks; a monitor that cannot keep up is closed.
    pub fn feed_monitors(&self, origin: u64, frame: &[u8]) {
        let frame = Bytes::copy_from_slice(frame);
        let mut stalled = Vec::new();

        self.monitors.lock().retain(|&id, feed| {
            if id == origin {
                return true;
            }
            match feed.try_send(frame.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    stalled.push(id);
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        });

        for id in stalled {
            if let Some(session) = self.get(id) {
                if session.close() {
                    tracing::warn!(id, addr = session.addr(), "monitor fell behind, closing");
                }
            }
        }
    }
}

fn spawn_monitor_writer(session: Arc<Session>, feed: Receiver<Bytes>) -> Result<()> {
    thread::Builder::new()
        .name(format!("monitor-{}", session.id()))
        .spawn(move || {
            for frame in feed {
                if let Err(e) = session.send(&frame) {
                    tracing::debug!(id = session.id(), "monitor write failed: {}", e);
                    session.close();
                    return;
                }
            }
        })?;
    Ok(())
}
