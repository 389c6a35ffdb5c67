//! TCP Server
//!
//! Accepts connections on every configured address and hands each one to
//! its own thread.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::context::ServerContext;
use crate::error::{Error, Result};
use crate::protocol::Frame;

use super::Connection;

/// How long the acceptor sleeps when no listener had a pending connection
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// TCP server for HarborKV
pub struct Server {
    ctx: Arc<ServerContext>,
    listeners: Vec<TcpListener>,
}

impl Server {
    /// Bind every configured address. With port 0 the first listener picks
    /// a port and the others reuse it; the context learns the real port.
    pub fn bind(ctx: Arc<ServerContext>) -> Result<Self> {
        let (binds, mut port) = {
            let config = ctx.config();
            (config.binds.clone(), config.port)
        };
        if binds.is_empty() {
            return Err(Error::Config("no bind address configured".to_string()));
        }

        let mut listeners = Vec::with_capacity(binds.len());
        for bind in &binds {
            let listener = TcpListener::bind((bind.as_str(), port))?;
            if port == 0 {
                port = listener.local_addr()?.port();
            }
            listener.set_nonblocking(true)?;
            tracing::info!(addr = %listener.local_addr()?, "listening");
            listeners.push(listener);
        }
        ctx.set_port(port);

        Ok(Self { ctx, listeners })
    }

    /// Address of the first listener
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let listener = self
            .listeners
            .first()
            .ok_or_else(|| Error::Config("server has no listener".to_string()))?;
        Ok(listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Accept connections until shutdown is requested (blocking)
    pub fn run(&self) -> Result<()> {
        while !self.ctx.is_shutdown() {
            let mut accepted = false;
            for listener in &self.listeners {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        accepted = true;
                        self.spawn_connection(stream, addr);
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                    Err(e) => tracing::warn!("accept failed: {}", e),
                }
            }
            if !accepted {
                thread::sleep(ACCEPT_POLL);
            }
        }

        let closed = self.ctx.registry().close_all();
        self.ctx.replication().become_master(false);
        tracing::info!(closed, "server stopped");
        Ok(())
    }

    /// Signal the accept loop to stop
    pub fn shutdown(&self) {
        self.ctx.request_shutdown();
    }

    fn spawn_connection(&self, mut stream: TcpStream, addr: SocketAddr) {
        let max_clients = self.ctx.config().max_clients;
        if self.ctx.registry().len() >= max_clients {
            tracing::warn!(%addr, max_clients, "rejecting client");
            let reject = Frame::Error("ERR max number of clients reached".to_string());
            let _ = stream.write_all(&reject.to_bytes());
            return;
        }

        // Accepted sockets must block; the listener is nonblocking
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!(%addr, "failed to configure socket: {}", e);
            return;
        }

        let ctx = Arc::clone(&self.ctx);
        let spawned = thread::Builder::new()
            .name(format!("harborkv-conn-{}", addr))
            .spawn(move || match Connection::new(stream, ctx) {
                Ok(mut connection) => {
                    if let Err(e) = connection.handle() {
                        tracing::warn!(%addr, "connection error: {}", e);
                    }
                }
                Err(e) => tracing::warn!(%addr, "failed to set up connection: {}", e),
            });
        if let Err(e) = spawned {
            tracing::error!(%addr, "failed to spawn connection thread: {}", e);
        }
    }
}
