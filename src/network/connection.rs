//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{self, BufReader, ErrorKind, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::commands::dispatch;
use crate::context::ServerContext;
use crate::error::{Error, Result};
use crate::protocol::{read_request, Frame};
use crate::session::{ClientSink, Session, SessionFlags};

/// A write that makes no progress for this long fails and ends the session
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write half of a client socket, shared with the registry
pub struct TcpSink {
    writer: Mutex<TcpStream>,
    /// Separate handle so close never waits behind a write
    control: TcpStream,
}

impl TcpSink {
    pub fn new(stream: &TcpStream) -> io::Result<Self> {
        Ok(Self {
            writer: Mutex::new(stream.try_clone()?),
            control: stream.try_clone()?,
        })
    }
}

impl ClientSink for TcpSink {
    fn send(&self, frame: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(frame)?;
        writer.flush()
    }

    fn close(&self) {
        let _ = self.control.shutdown(Shutdown::Both);
    }
}

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    session: Arc<Session>,

    ctx: Arc<ServerContext>,
}

impl Connection {
    /// Register a session for `stream` and configure the socket
    pub fn new(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;

        let timeout_secs = ctx.config().timeout_secs;
        if timeout_secs > 0 {
            stream.set_read_timeout(Some(Duration::from_secs(timeout_secs)))?;
        }

        let sink = Arc::new(TcpSink::new(&stream)?);
        let session = ctx
            .registry()
            .register(peer_addr, sink, ctx.initial_binding());

        Ok(Self {
            reader: BufReader::new(stream),
            session,
            ctx,
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Serve requests until the peer leaves, the session is killed or it
    /// asked to be closed; always deregisters the session
    pub fn handle(&mut self) -> Result<()> {
        let result = self.serve();
        if let Some(session) = self.ctx.registry().deregister(self.session.id()) {
            session.sink().close();
        }
        result
    }

    fn serve(&mut self) -> Result<()> {
        let id = self.session.id();
        tracing::debug!(id, addr = self.session.addr(), "connection established");

        loop {
            let args = match read_request(&mut self.reader) {
                Ok(Some(args)) => args,
                Ok(None) => {
                    tracing::debug!(id, "client disconnected");
                    return Ok(());
                }
                Err(Error::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!(id, "connection closed: {}", e);
                    return Ok(());
                }
                Err(Error::Io(ref e)) if is_timeout(e.kind()) => {
                    tracing::debug!(id, "idle timeout");
                    return Ok(());
                }
                Err(e) => {
                    if self.session.is_closed() {
                        return Ok(());
                    }
                    tracing::warn!(id, "bad request: {}", e);
                    let _ = self.session.send(&Frame::error(&e).to_bytes());
                    return Err(e);
                }
            };

            if self.session.is_closed() {
                return Ok(());
            }
            if args.is_empty() {
                continue;
            }

            let reply = dispatch(&self.ctx, &self.session, &args);
            if let Err(e) = self.session.send(&reply.to_bytes()) {
                if is_disconnect(e.kind()) || self.session.is_closed() {
                    tracing::debug!(id, "client left before reply: {}", e);
                    return Ok(());
                }
                if is_timeout(e.kind()) {
                    tracing::warn!(id, "client stopped reading, closing");
                    return Ok(());
                }
                return Err(e.into());
            }

            if self.session.has_flag(SessionFlags::CLOSE_AFTER_REPLY) {
                tracing::debug!(id, "closing after reply");
                return Ok(());
            }
        }
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
