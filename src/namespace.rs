//! Namespace & Token Store
//!
//! Maps opaque bearer tokens to namespace names. The `default` namespace is
//! implicit: it never has a token of its own and is reached through the
//! global password instead.
//!
//! ## Invariants
//! - token → namespace is injective: one token names exactly one namespace
//!   and every namespace owns at most one token
//! - a failed mutation leaves the table unchanged, including one whose
//!   persistence step fails
//!
//! ## Concurrency
//! The table sits behind a single `RwLock`; each mutation validates and
//! applies under one write guard so readers never see a half-applied change.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Name of the namespace bound by the global password
pub const DEFAULT_NAMESPACE: &str = "default";

/// Longest namespace name accepted (one length byte in the key encoding)
pub const MAX_NAMESPACE_LEN: usize = u8::MAX as usize;

/// Token → namespace table
#[derive(Debug, Default)]
pub struct NamespaceStore {
    /// Keyed by token, ordered so listings are stable
    tokens: RwLock<BTreeMap<String, String>>,
}

impl NamespaceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(namespace, token)` pairs, applying the same
    /// rules as `NAMESPACE ADD`
    pub fn from_pairs(pairs: &[(String, String)], requirepass: &str) -> Result<Self> {
        let store = Self::new();
        for (ns, token) in pairs {
            store.add(ns, token, requirepass)?;
        }
        Ok(store)
    }

    /// Token owned by `ns`, if any
    pub fn get(&self, ns: &str) -> Option<String> {
        self.tokens
            .read()
            .iter()
            .find(|(_, owner)| owner.as_str() == ns)
            .map(|(token, _)| token.clone())
    }

    /// Namespace reached through `token`, if any
    pub fn get_by_token(&self, token: &str) -> Option<String> {
        self.tokens.read().get(token).cloned()
    }

    /// All `(namespace, token)` pairs ordered by token
    pub fn list(&self) -> Vec<(String, String)> {
        Self::pairs(&self.tokens.read())
    }

    /// Whether `token` is currently bound to some namespace
    pub fn contains_token(&self, token: &str) -> bool {
        self.tokens.read().contains_key(token)
    }

    /// Number of namespaces with a token
    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }

    /// Create or replace the token of `ns`
    pub fn set(&self, ns: &str, token: &str, requirepass: &str) -> Result<()> {
        self.set_with(ns, token, requirepass, |_| Ok(()))
    }

    /// Create `ns`; fails if it already owns a token
    pub fn add(&self, ns: &str, token: &str, requirepass: &str) -> Result<()> {
        self.add_with(ns, token, requirepass, |_| Ok(()))
    }

    /// Remove `ns` and its token
    pub fn del(&self, ns: &str) -> Result<()> {
        self.del_with(ns, |_| Ok(()))
    }

    /// `set`, committed only once `persist` accepts the resulting pairs
    pub fn set_with<F>(&self, ns: &str, token: &str, requirepass: &str, persist: F) -> Result<()>
    where
        F: FnOnce(&[(String, String)]) -> Result<()>,
    {
        self.mutate(persist, |tokens| {
            Self::validate(tokens, ns, token, requirepass)?;
            tokens.retain(|_, owner| owner.as_str() != ns);
            tokens.insert(token.to_string(), ns.to_string());
            Ok(())
        })
    }

    /// `add`, committed only once `persist` accepts the resulting pairs
    pub fn add_with<F>(&self, ns: &str, token: &str, requirepass: &str, persist: F) -> Result<()>
    where
        F: FnOnce(&[(String, String)]) -> Result<()>,
    {
        self.mutate(persist, |tokens| {
            if tokens.values().any(|owner| owner == ns) {
                return Err(Error::exec("the namespace has already exists"));
            }
            Self::validate(tokens, ns, token, requirepass)?;
            tokens.insert(token.to_string(), ns.to_string());
            Ok(())
        })
    }

    /// `del`, committed only once `persist` accepts the resulting pairs
    pub fn del_with<F>(&self, ns: &str, persist: F) -> Result<()>
    where
        F: FnOnce(&[(String, String)]) -> Result<()>,
    {
        if ns == DEFAULT_NAMESPACE {
            return Err(Error::exec("forbidden to delete the default namespace"));
        }
        self.mutate(persist, |tokens| {
            let before = tokens.len();
            tokens.retain(|_, owner| owner.as_str() != ns);
            if tokens.len() == before {
                return Err(Error::exec("the namespace was not found"));
            }
            Ok(())
        })
    }

    /// Apply `change` to a copy of the table, hand the result to `persist`
    /// and install it only if both succeed
    fn mutate<P, C>(&self, persist: P, change: C) -> Result<()>
    where
        P: FnOnce(&[(String, String)]) -> Result<()>,
        C: FnOnce(&mut BTreeMap<String, String>) -> Result<()>,
    {
        let mut tokens = self.tokens.write();
        let mut staged = tokens.clone();
        change(&mut staged)?;
        persist(&Self::pairs(&staged))?;
        *tokens = staged;
        Ok(())
    }

    fn pairs(tokens: &BTreeMap<String, String>) -> Vec<(String, String)> {
        tokens
            .iter()
            .map(|(token, ns)| (ns.clone(), token.clone()))
            .collect()
    }

    fn validate(
        tokens: &BTreeMap<String, String>,
        ns: &str,
        token: &str,
        requirepass: &str,
    ) -> Result<()> {
        if ns.is_empty() {
            return Err(Error::exec("the namespace can't be empty"));
        }
        if ns.len() > MAX_NAMESPACE_LEN {
            return Err(Error::exec("size exceed limit"));
        }
        if token.is_empty() {
            return Err(Error::exec("the token can't be empty"));
        }
        if ns == DEFAULT_NAMESPACE {
            return Err(Error::exec("forbidden to add the default namespace"));
        }
        if !requirepass.is_empty() && token == requirepass {
            return Err(Error::exec("the token is duplicated with requirepass"));
        }
        match tokens.get(token) {
            Some(owner) if owner != ns => Err(Error::exec("the token has already exists")),
            _ => Ok(()),
        }
    }
}
