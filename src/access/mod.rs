//! Access Module
//!
//! Who a connection is, and what it may do.
//!
//! ## Flow
//! ```text
//! AUTH / HELLO ──► authenticate() ──► Binding { namespace, privilege }
//!                                         │ stored on the Session
//!                                         ▼
//! every command ──► gate::check_authenticated ──► gate::check_admin ──► execute
//! ```
//!
//! The gate is a set of pure predicates; denial happens before a command
//! touches any state.

mod auth;
mod gate;

pub use auth::{authenticate, AuthOutcome};
pub use gate::{check_admin, check_authenticated, check_namespace_writable, AdminRule};
