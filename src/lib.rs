//! # HarborKV
//!
//! The administrative control plane of a Redis-wire-compatible,
//! replicated key-value node:
//! - Namespace-scoped token authentication with admin / restricted principals
//! - Resumable, type-tagged keyspace scan cursors
//! - The master / replica role state machine (SLAVEOF)
//! - A live connection registry with filtered CLIENT KILL
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 TCP Server (thread per client)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ RESP2 request
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │      Command table → NOAUTH gate → admin gate → handler     │
//! └──────┬──────────────┬──────────────┬──────────────┬─────────┘
//!        │              │              │              │
//!        ▼              ▼              ▼              ▼
//!  ┌───────────┐ ┌────────────┐ ┌─────────────┐ ┌────────────┐
//!  │ Namespace │ │ Connection │ │ Replication │ │  Storage   │
//!  │   Store   │ │  Registry  │ │ Controller  │ │ + Jobs     │
//!  │ (RwLock)  │ │  (RwLock)  │ │  (RwLock)   │ │ (RwLock)   │
//!  └───────────┘ └────────────┘ └─────────────┘ └────────────┘
//! ```
//!
//! All shared state hangs off one [`ServerContext`] handed to every handler.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod config;
pub mod error;

pub mod access;
pub mod namespace;
pub mod replication;
pub mod scan;
pub mod session;

pub mod jobs;
pub mod rdb;
pub mod storage;

pub mod commands;
pub mod context;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use context::ServerContext;
pub use error::{Error, Result};
pub use network::Server;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of HarborKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
