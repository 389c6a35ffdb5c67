//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - One nonblocking acceptor loop over every bound address
//! - One thread per client connection
//! - Requests routed through [`crate::commands::dispatch`]

mod connection;
mod server;

pub use connection::{Connection, TcpSink};
pub use server::Server;
