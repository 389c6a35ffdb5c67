//! Command table
//!
//! One row per command: arity (negative = at least), COMMAND INFO flags,
//! key positions, gate rules and the parser producing the [`Command`].

use bytes::Bytes;

use crate::access::AdminRule;
use crate::error::Result;

use super::{admin, connection, keyspace, Command};

/// Static description of a command
pub struct CommandSpec {
    pub name: &'static str,
    /// Exact argument count including the name, or `-n` for at least `n`
    pub arity: i32,
    /// Space separated COMMAND INFO flags
    pub flags: &'static str,
    pub first_key: i32,
    /// Negative counts from the end
    pub last_key: i32,
    pub step: i32,
    pub admin: AdminRule,
    /// Runnable before the session is bound to a namespace
    pub allow_unauthenticated: bool,
    /// Echoed to MONITOR sessions (false for commands carrying credentials)
    pub monitored: bool,
    pub parse: fn(&[Bytes]) -> Result<Command>,
}

impl CommandSpec {
    /// Whether `argc` arguments satisfy the arity
    pub fn accepts(&self, argc: usize) -> bool {
        let argc = argc as i64;
        let arity = self.arity as i64;
        if arity >= 0 {
            argc == arity
        } else {
            argc >= -arity
        }
    }

    /// Indexes of the key arguments of an `argc`-argument invocation
    pub fn key_positions(&self, argc: usize) -> Vec<usize> {
        if self.first_key <= 0 || self.step <= 0 {
            return Vec::new();
        }
        let last = if self.last_key < 0 {
            argc as i32 + self.last_key
        } else {
            self.last_key
        };
        (self.first_key..=last)
            .step_by(self.step as usize)
            .filter(|&idx| (idx as usize) < argc)
            .map(|idx| idx as usize)
            .collect()
    }

    pub fn flag_list(&self) -> impl Iterator<Item = &'static str> {
        self.flags.split_whitespace()
    }
}

/// Find a command by its lowercase name
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMAND_TABLE
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
}

macro_rules! command {
    ($name:expr, $arity:expr, $flags:expr, $keys:expr, $admin:expr, $parse:expr) => {
        command!($name, $arity, $flags, $keys, $admin, $parse, false, true)
    };
    ($name:expr, $arity:expr, $flags:expr, $keys:expr, $admin:expr, $parse:expr, $unauth:expr, $monitored:expr) => {
        CommandSpec {
            name: $name,
            arity: $arity,
            flags: $flags,
            first_key: $keys.0,
            last_key: $keys.1,
            step: $keys.2,
            admin: $admin,
            allow_unauthenticated: $unauth,
            monitored: $monitored,
            parse: $parse,
        }
    };
}

const NO_KEYS: (i32, i32, i32) = (0, 0, 0);
const FIRST_KEY: (i32, i32, i32) = (1, 1, 1);

pub static COMMAND_TABLE: &[CommandSpec] = &[
    // Connection
    command!("auth", 2, "read-only ok-loading", NO_KEYS, AdminRule::Never, connection::parse_auth, true, false),
    command!("hello", -1, "read-only ok-loading", NO_KEYS, AdminRule::Never, connection::parse_hello, true, false),
    command!("quit", 1, "read-only", NO_KEYS, AdminRule::Never, connection::parse_quit, true, true),
    command!("ping", -1, "read-only", NO_KEYS, AdminRule::Never, connection::parse_ping),
    command!("echo", 2, "read-only", NO_KEYS, AdminRule::Never, connection::parse_echo),
    command!("select", 2, "read-only", NO_KEYS, AdminRule::Never, connection::parse_select),
    command!("time", 1, "read-only ok-loading", NO_KEYS, AdminRule::Never, connection::parse_time),
    command!("monitor", 1, "read-only no-multi", NO_KEYS, AdminRule::Always, connection::parse_monitor),
    command!("client", -2, "read-only", NO_KEYS, AdminRule::Subcommands(&["list", "kill"]), connection::parse_client),
    command!("command", -1, "read-only", NO_KEYS, AdminRule::Never, connection::parse_command),
    // Keyspace
    command!("keys", 2, "read-only", NO_KEYS, AdminRule::Never, keyspace::parse_keys),
    command!("scan", -2, "read-only", NO_KEYS, AdminRule::Never, keyspace::parse_scan),
    command!("randomkey", 1, "read-only no-script", NO_KEYS, AdminRule::Never, keyspace::parse_random_key),
    command!("flushdb", 1, "write no-script", NO_KEYS, AdminRule::Never, keyspace::parse_flush_db),
    command!("flushall", 1, "write no-script", NO_KEYS, AdminRule::Always, keyspace::parse_flush_all),
    command!("dbsize", -1, "read-only", NO_KEYS, AdminRule::Never, keyspace::parse_db_size),
    command!("disk", 3, "read-only", NO_KEYS, AdminRule::Never, keyspace::parse_key_size),
    command!("memory", 3, "read-only", NO_KEYS, AdminRule::Never, keyspace::parse_key_size),
    command!("restore", -4, "write", FIRST_KEY, AdminRule::Never, keyspace::parse_restore),
    command!("dump", 2, "read-only", FIRST_KEY, AdminRule::Never, keyspace::parse_dump),
    command!("rdb", -3, "write exclusive", NO_KEYS, AdminRule::Always, keyspace::parse_rdb),
    // Administration
    command!("info", -1, "read-only ok-loading", NO_KEYS, AdminRule::Never, admin::parse_info),
    command!("role", 1, "read-only ok-loading", NO_KEYS, AdminRule::Never, admin::parse_role),
    command!("namespace", -3, "read-only admin", NO_KEYS, AdminRule::Always, admin::parse_namespace),
    command!("config", -2, "read-only admin", NO_KEYS, AdminRule::Always, admin::parse_config),
    command!("slaveof", 3, "read-only exclusive no-script admin", NO_KEYS, AdminRule::Always, admin::parse_slave_of),
    command!("replconf", -3, "read-only replication no-script", NO_KEYS, AdminRule::Never, admin::parse_replconf, true, false),
    command!("compact", 1, "read-only no-script admin", NO_KEYS, AdminRule::Always, admin::parse_compact),
    command!("bgsave", 1, "read-only no-script admin", NO_KEYS, AdminRule::Always, admin::parse_bgsave),
    command!("flushbackup", 1, "read-only no-script admin", NO_KEYS, AdminRule::Always, admin::parse_flush_backup),
    command!("lastsave", 1, "read-only admin", NO_KEYS, AdminRule::Always, admin::parse_last_save),
    command!("debug", -2, "read-only exclusive admin", NO_KEYS, AdminRule::Always, admin::parse_debug),
    command!("shutdown", 1, "read-only exclusive no-script admin", NO_KEYS, AdminRule::Always, admin::parse_shutdown),
];
