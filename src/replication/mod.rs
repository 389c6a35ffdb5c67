//! Replication Module
//!
//! The node's role in a master/replica topology and the transitions
//! between roles.
//!
//! ## State Machine
//! ```text
//!            SLAVEOF host port
//!   ┌────────┐ ───────────────────► ┌──────────────────┐
//!   │ Master │                      │ Slave(host,port) │ ──┐ SLAVEOF other port
//!   └────────┘ ◄─────────────────── └──────────────────┘ ◄─┘ (old link stopped first)
//!               SLAVEOF NO ONE
//! ```
//!
//! ## Collaborators
//! - [`HostResolver`]: hostname → IP addresses
//! - [`UpstreamTransport`]: the link to the master; initiation only, the
//!   sync stream is its own business
//! - [`MigrationCoordinator`]: cluster slot migration stop flag

mod controller;
mod migration;
mod resolver;
mod transport;

pub use controller::{ReplicationController, SlaveOfTarget, Topology};
pub use migration::MigrationCoordinator;
pub use resolver::{HostResolver, SystemResolver};
pub use transport::{LinkState, TcpUpstream, UpstreamTransport};

/// Replication role of this node
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Master,
    Slave { host: String, port: u16 },
}

impl Role {
    pub fn is_slave(&self) -> bool {
        matches!(self, Role::Slave { .. })
    }

    /// `master` / `slave`, as reported by INFO and ROLE
    pub fn name(&self) -> &'static str {
        match self {
            Role::Master => "master",
            Role::Slave { .. } => "slave",
        }
    }
}
