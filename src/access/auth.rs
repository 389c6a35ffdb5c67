//! Token authentication
//!
//! ```text
//! token ──► NamespaceStore hit? ──yes──► restricted on that namespace
//!               │ no
//!               ▼
//!        requirepass set and != token? ──yes──► InvalidPassword (no binding)
//!               │ no
//!               ▼
//!        admin on `default`  (+ NoPasswordConfigured when requirepass is empty)
//! ```

use crate::error::{Error, Result};
use crate::namespace::NamespaceStore;
use crate::session::{Binding, Session};

/// Result of presenting a token
///
/// `binding` and `report` are independent: with no global password the
/// session is bound to `default`/admin *and* the report is
/// `Err(NoPasswordConfigured)`. Callers apply the binding first, then
/// surface the report.
#[derive(Debug)]
pub struct AuthOutcome {
    pub binding: Option<Binding>,
    pub report: Result<()>,
}

impl AuthOutcome {
    /// Bind `session` (when there is a binding) and return the report
    pub fn apply(self, session: &Session) -> Result<()> {
        if let Some(binding) = self.binding {
            session.bind(binding);
        }
        self.report
    }
}

/// Resolve `token` against the namespace tokens and the global password
pub fn authenticate(store: &NamespaceStore, requirepass: &str, token: &str) -> AuthOutcome {
    if let Some(ns) = store.get_by_token(token) {
        return AuthOutcome {
            binding: Some(Binding::restricted(ns)),
            report: Ok(()),
        };
    }

    if !requirepass.is_empty() && token != requirepass {
        return AuthOutcome {
            binding: None,
            report: Err(Error::InvalidPassword),
        };
    }

    let report = if requirepass.is_empty() {
        Err(Error::NoPasswordConfigured)
    } else {
        Ok(())
    };

    AuthOutcome {
        binding: Some(Binding::admin()),
        report,
    }
}
