//! Authorization gate
//!
//! Pure predicates evaluated by the dispatcher before a command executes.

use crate::error::{Error, Result};
use crate::session::Session;

/// Which invocations of a command need admin privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRule {
    /// Runs under the caller's namespace whatever its privilege
    Never,
    Always,
    /// Only the listed subcommands (matched case-insensitively on `args[1]`)
    Subcommands(&'static [&'static str]),
}

impl AdminRule {
    /// Whether this invocation (`args[0]` is the command name) needs admin
    pub fn requires_admin(&self, args: &[&str]) -> bool {
        match self {
            AdminRule::Never => false,
            AdminRule::Always => true,
            AdminRule::Subcommands(subs) => args
                .get(1)
                .is_some_and(|sub| subs.iter().any(|s| s.eq_ignore_ascii_case(sub))),
        }
    }
}

/// Unbound sessions may only run commands that establish a binding
pub fn check_authenticated(session: &Session, allow_unauthenticated: bool) -> Result<()> {
    if allow_unauthenticated || session.is_authenticated() {
        Ok(())
    } else {
        Err(Error::NoAuth)
    }
}

/// Deny non-admin sessions when `rule` requires admin for `args`
pub fn check_admin(session: &Session, rule: AdminRule, args: &[&str]) -> Result<()> {
    if rule.requires_admin(args) && !session.is_admin() {
        return Err(Error::Permission);
    }
    Ok(())
}

/// A replica propagating namespaces from its master only serves NAMESPACE GET
pub fn check_namespace_writable(
    repl_namespace_enabled: bool,
    is_slave: bool,
    subcommand: &str,
) -> Result<()> {
    if repl_namespace_enabled && is_slave && !subcommand.eq_ignore_ascii_case("get") {
        return Err(Error::exec("namespace is read-only for slave"));
    }
    Ok(())
}
