//! Commands Module
//!
//! Every request goes through one table lookup and a fixed sequence of
//! checks before its handler runs:
//!
//! ```text
//! args ──► lookup ──► arity ──► NOAUTH gate ──► admin gate ──► parse
//!                                                               │
//!               reply ◄── execute ◄── touch ◄── MONITOR feed ◄──┘
//! ```
//!
//! A failure at any step becomes an error reply; nothing after it runs.
//! Parsing turns the raw arguments into a [`Command`] variant that owns its
//! arguments, so handlers never see unvalidated input.

mod admin;
mod args;
mod connection;
mod keyspace;
mod table;

pub use admin::{ConfigOp, NamespaceOp};
pub use connection::{ClientOp, CommandOp, HelloArgs, HelloOption};
pub use keyspace::RestoreArgs;
pub use table::{lookup, CommandSpec, COMMAND_TABLE};

use bytes::Bytes;

use crate::access::{check_admin, check_authenticated};
use crate::clock::now_us;
use crate::context::ServerContext;
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::replication::SlaveOfTarget;
use crate::scan::{ScanParams, ScanStart};
use crate::session::Session;

/// A parsed request
#[derive(Debug, Clone)]
pub enum Command {
    // Connection
    Auth { token: String },
    Hello(HelloArgs),
    Ping { message: Option<Bytes> },
    Echo { message: Bytes },
    Select,
    Quit,
    Time,
    Monitor,
    Client(ClientOp),
    Command(CommandOp),

    // Keyspace, confined to the caller's namespace
    Keys { prefix: Vec<u8> },
    Scan { start: ScanStart, params: ScanParams },
    RandomKey,
    FlushDb,
    FlushAll,
    DbSize { scan: bool },
    KeySize { key: Vec<u8> },
    Restore(RestoreArgs),
    Dump { key: Vec<u8> },
    RdbLoad { path: String, overwrite: bool, db: u32 },

    // Administration
    Info { section: String },
    Role,
    Namespace(NamespaceOp),
    Config(ConfigOp),
    SlaveOf(SlaveOfTarget),
    Replconf { listening_port: Option<u16> },
    Compact,
    BgSave,
    FlushBackup,
    LastSave,
    DebugSleep { secs: f64 },
    Shutdown,
}

/// Run one request for `session` and produce its reply
pub fn dispatch(ctx: &ServerContext, session: &Session, args: &[Bytes]) -> Frame {
    match run(ctx, session, args) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(id = session.id(), kind = ?e.kind(), "command failed: {}", e);
            Frame::error(&e)
        }
    }
}

fn run(ctx: &ServerContext, session: &Session, args: &[Bytes]) -> Result<Frame> {
    let first = args.first().ok_or(Error::WrongArity)?;
    let name = String::from_utf8_lossy(first).to_ascii_lowercase();
    let spec = lookup(&name).ok_or_else(|| Error::UnknownCommand(name.clone()))?;

    if !spec.accepts(args.len()) {
        return Err(Error::WrongArity);
    }

    check_authenticated(session, spec.allow_unauthenticated)?;

    let words = args::lossy(args);
    let word_refs: Vec<&str> = words.iter().map(String::as_str).collect();
    check_admin(session, spec.admin, &word_refs)?;

    let command = (spec.parse)(args)?;
    tracing::trace!(id = session.id(), ?command, "dispatch");

    if spec.monitored {
        ctx.registry()
            .feed_monitors(session.id(), &monitor_line(session, &words));
    }
    session.touch(spec.name);

    execute(ctx, session, command)
}

fn execute(ctx: &ServerContext, session: &Session, command: Command) -> Result<Frame> {
    match command {
        Command::Auth { token } => connection::auth(ctx, session, &token),
        Command::Hello(hello) => connection::hello(ctx, session, hello),
        Command::Ping { message } => Ok(connection::ping(message)),
        Command::Echo { message } => Ok(Frame::bulk(message)),
        Command::Select => Ok(Frame::ok()),
        Command::Quit => Ok(connection::quit(session)),
        Command::Time => Ok(connection::time()),
        Command::Monitor => connection::monitor(ctx, session),
        Command::Client(op) => connection::client(ctx, session, op),
        Command::Command(op) => connection::command(op),

        Command::Keys { prefix } => keyspace::keys(ctx, session, &prefix),
        Command::Scan { start, params } => keyspace::scan(ctx, session, start, &params),
        Command::RandomKey => keyspace::random_key(ctx, session),
        Command::FlushDb => keyspace::flush_db(ctx, session),
        Command::FlushAll => keyspace::flush_all(ctx, session),
        Command::DbSize { scan } => keyspace::db_size(ctx, session, scan),
        Command::KeySize { key } => keyspace::key_size(ctx, session, &key),
        Command::Restore(restore) => keyspace::restore(ctx, session, restore),
        Command::Dump { key } => keyspace::dump(ctx, session, &key),
        Command::RdbLoad {
            path,
            overwrite,
            db,
        } => keyspace::rdb_load(ctx, session, &path, overwrite, db),

        Command::Info { section } => admin::info(ctx, session, &section),
        Command::Role => Ok(admin::role(ctx)),
        Command::Namespace(op) => admin::namespace(ctx, op),
        Command::Config(op) => admin::config(ctx, op),
        Command::SlaveOf(target) => admin::slave_of(ctx, session, target),
        Command::Replconf { listening_port } => {
            Ok(admin::replconf(ctx, session, listening_port))
        }
        Command::Compact => ctx.jobs().compact().map(|_| Frame::ok()),
        Command::BgSave => ctx.jobs().bgsave().map(|_| Frame::ok()),
        Command::FlushBackup => ctx.jobs().purge_backups().map(|_| Frame::ok()),
        Command::LastSave => Ok(Frame::Integer(ctx.jobs().stats().last_bgsave_time())),
        Command::DebugSleep { secs } => Ok(admin::debug_sleep(secs)),
        Command::Shutdown => Ok(admin::shutdown(ctx, session)),
    }
}

/// Namespace the session is bound to; the NOAUTH gate guarantees one for
/// every command that gets this far without `allow_unauthenticated`
fn bound_namespace(session: &Session) -> Result<String> {
    session.namespace().ok_or(Error::NoAuth)
}

/// `+<unix.micros> [<namespace> <addr>] "<arg>" ...`
fn monitor_line(session: &Session, words: &[String]) -> Vec<u8> {
    let now = now_us();
    let mut line = format!(
        "{}.{:06} [{} {}]",
        now / 1_000_000,
        now % 1_000_000,
        session.namespace().unwrap_or_default(),
        session.addr()
    );
    for word in words {
        line.push(' ');
        line.push_str(&quote(word));
    }
    Frame::Simple(line).to_bytes()
}

/// Double-quote `arg`, escaping what would break a single status line
fn quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('"');
    for c in arg.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
