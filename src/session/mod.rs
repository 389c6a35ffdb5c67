//! Session Module
//!
//! Live client sessions and the registry that tracks them.
//!
//! ## Responsibilities
//! - Per-connection mutable state (namespace binding, privilege, name, flags)
//! - Enumeration for CLIENT LIST and INFO
//! - Filtered, idempotent force-close for CLIENT KILL
//! - Out-of-band delivery to MONITOR sessions
//!
//! ## Locking
//! ```text
//! registry.sessions (RwLock)  →  session.state (Mutex)
//! ```
//! Always in that order. Command handlers never hold their own session's
//! state lock while calling into the registry.

mod filter;
mod registry;
mod state;

pub use filter::{KillCriteria, KillFilter};
pub use registry::{ConnectionRegistry, MONITOR_BACKLOG};
pub use state::{validate_client_name, Session, SessionFlags};

use crate::namespace::DEFAULT_NAMESPACE;

/// Privilege level of an authenticated session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Unrestricted principal on the default namespace
    Admin,
    /// Token holder confined to its namespace
    Restricted,
}

/// Result of a successful authentication: where the session now lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub namespace: String,
    pub privilege: Privilege,
}

impl Binding {
    /// Admin binding on the default namespace
    pub fn admin() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            privilege: Privilege::Admin,
        }
    }

    /// Restricted binding on a token-addressed namespace
    pub fn restricted(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            privilege: Privilege::Restricted,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.privilege == Privilege::Admin
    }
}

/// What kind of peer a session is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientKind {
    #[default]
    Normal,
    PubSub,
    /// Link to our upstream master
    Master,
    /// A replica attached to this node
    Replica,
}

impl ClientKind {
    fn bit(self) -> u8 {
        match self {
            ClientKind::Normal => 1,
            ClientKind::PubSub => 1 << 1,
            ClientKind::Master => 1 << 2,
            ClientKind::Replica => 1 << 3,
        }
    }
}

/// Set of client kinds; empty matches every kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KindMask(u8);

impl KindMask {
    pub fn insert(&mut self, kind: ClientKind) {
        self.0 |= kind.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn matches(&self, kind: ClientKind) -> bool {
        self.is_empty() || self.0 & kind.bit() != 0
    }
}

/// Transport behind a session, as seen by the registry
///
/// Implemented by the TCP layer; tests provide in-memory sinks.
pub trait ClientSink: Send + Sync {
    /// Write one complete, already encoded frame
    fn send(&self, frame: &[u8]) -> std::io::Result<()>;

    /// Tear down the transport. Must be idempotent.
    fn close(&self);
}
