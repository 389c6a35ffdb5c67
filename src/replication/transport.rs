//! Upstream link to a master
//!
//! [`TcpUpstream`] keeps one background thread per link:
//! ```text
//! ┌──────────────┐ connect ok ┌─────────────┐  EOF / error  ┌──────────────┐
//! │  Connecting  │ ─────────► │  Connected  │ ────────────► │ Disconnected │
//! └──────────────┘            └─────────────┘               └──────┬───────┘
//!        ▲                                                         │ retry
//!        └─────────────────────────────────────────────────────────┘
//! ```
//! On connect it announces its listening port with
//! `REPLCONF listening-port <port>` so the master lists it as a replica.
//! The sync byte stream itself is not consumed here.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::protocol::Frame;

/// State of the link to the master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Disconnected,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Disconnected => "disconnected",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LinkState::Connecting,
            1 => LinkState::Connected,
            _ => LinkState::Disconnected,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            LinkState::Connecting => 0,
            LinkState::Connected => 1,
            LinkState::Disconnected => 2,
        }
    }
}

/// Starts and stops the replication link
pub trait UpstreamTransport: Send + Sync {
    /// Initiate a link to `host:port`, replacing any current link; returns
    /// once initiation succeeded. On failure the current link is untouched.
    /// `listening_port` is the port this node announces to its master.
    fn start(&self, host: &str, port: u16, listening_port: u16) -> Result<()>;

    /// Tear down the current link, if any. Idempotent.
    fn stop(&self);

    fn state(&self) -> LinkState;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

struct Link {
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
}

/// TCP implementation of [`UpstreamTransport`]
#[derive(Default)]
pub struct TcpUpstream {
    link: Mutex<Option<Link>>,
}

impl TcpUpstream {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UpstreamTransport for TcpUpstream {
    fn start(&self, host: &str, port: u16, listening_port: u16) -> Result<()> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::exec(format!("failed to connect to {}:{}: {}", host, port, e)))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::exec(format!("Can not resolve hostname: {}", host)));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(LinkState::Connecting.to_u8()));
        let announce = Frame::command(&[
            "REPLCONF",
            "listening-port",
            &listening_port.to_string(),
        ])
        .to_bytes();

        let worker_stop = Arc::clone(&stop);
        let worker_state = Arc::clone(&state);
        let peer = format!("{}:{}", host, port);
        thread::Builder::new()
            .name("harborkv-upstream".to_string())
            .spawn(move || run_link(peer, addrs, announce, worker_stop, worker_state))
            .map_err(|e| Error::exec(format!("failed to start replication link: {}", e)))?;

        if let Some(old) = self.link.lock().replace(Link { stop, state }) {
            old.stop.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&self) {
        if let Some(link) = self.link.lock().take() {
            link.stop.store(true, Ordering::SeqCst);
        }
    }

    fn state(&self) -> LinkState {
        self.link
            .lock()
            .as_ref()
            .map(|l| LinkState::from_u8(l.state.load(Ordering::SeqCst)))
            .unwrap_or(LinkState::Disconnected)
    }
}

impl Drop for TcpUpstream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_link(
    peer: String,
    addrs: Vec<SocketAddr>,
    announce: Vec<u8>,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
) {
    tracing::info!(master = %peer, "replication link started");

    while !stop.load(Ordering::SeqCst) {
        state.store(LinkState::Connecting.to_u8(), Ordering::SeqCst);

        match connect_any(&addrs) {
            Some(mut stream) => {
                if stream.write_all(&announce).is_ok() {
                    state.store(LinkState::Connected.to_u8(), Ordering::SeqCst);
                    tracing::info!(master = %peer, "connected to master");
                    drain(&mut stream, &stop);
                }
                let _ = stream.shutdown(std::net::Shutdown::Both);
                tracing::info!(master = %peer, "disconnected from master");
            }
            None => tracing::debug!(master = %peer, "master unreachable, retrying"),
        }

        state.store(LinkState::Disconnected.to_u8(), Ordering::SeqCst);
        sleep_unless_stopped(RETRY_INTERVAL, &stop);
    }

    tracing::info!(master = %peer, "replication link stopped");
}

fn connect_any(addrs: &[SocketAddr]) -> Option<TcpStream> {
    addrs.iter().find_map(|addr| {
        let stream = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT).ok()?;
        stream.set_read_timeout(Some(POLL_INTERVAL)).ok()?;
        Some(stream)
    })
}

/// Read and discard until EOF, error or stop
fn drain(stream: &mut TcpStream, stop: &AtomicBool) {
    let mut buf = [0u8; 4096];
    while !stop.load(Ordering::SeqCst) {
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(_) => return,
        }
    }
}

fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let mut slept = Duration::ZERO;
    while slept < total && !stop.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
        slept += POLL_INTERVAL;
    }
}
