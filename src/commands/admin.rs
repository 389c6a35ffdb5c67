//! Administrative commands: NAMESPACE, CONFIG, SLAVEOF, ROLE, INFO,
//! REPLCONF, background job triggers, DEBUG, SHUTDOWN

use std::fmt::Write as _;
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use crate::access::check_namespace_writable;
use crate::context::ServerContext;
use crate::error::{Error, Result};
use crate::namespace::DEFAULT_NAMESPACE;
use crate::protocol::Frame;
use crate::replication::{Role, SlaveOfTarget};
use crate::session::{Session, SessionFlags};

use super::{args, bound_namespace, Command};

const INFO_SECTIONS: &[&str] = &[
    "server",
    "clients",
    "persistence",
    "replication",
    "cluster",
    "keyspace",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceOp {
    /// Token of a namespace, or every pair for `*`
    Get(String),
    Set { ns: String, token: String },
    Add { ns: String, token: String },
    Del(String),
}

impl NamespaceOp {
    fn subcommand(&self) -> &'static str {
        match self {
            NamespaceOp::Get(_) => "get",
            NamespaceOp::Set { .. } => "set",
            NamespaceOp::Add { .. } => "add",
            NamespaceOp::Del(_) => "del",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOp {
    Get(String),
    Set { name: String, value: String },
    Rewrite,
}

// =============================================================================
// Parsers
// =============================================================================

pub(super) fn parse_info(args: &[Bytes]) -> Result<Command> {
    let section = match args.len() {
        1 => "all".to_string(),
        2 => args::keyword(args, 1)?,
        _ => return Err(Error::syntax()),
    };
    Ok(Command::Info { section })
}

pub(super) fn parse_role(_: &[Bytes]) -> Result<Command> {
    Ok(Command::Role)
}

pub(super) fn parse_namespace(args: &[Bytes]) -> Result<Command> {
    let sub = args::keyword(args, 1)?;
    let op = match (sub.as_str(), args.len()) {
        ("get", 3) => NamespaceOp::Get(args::owned(args, 2)?),
        ("set", 4) => NamespaceOp::Set {
            ns: args::owned(args, 2)?,
            token: args::owned(args, 3)?,
        },
        ("add", 4) => NamespaceOp::Add {
            ns: args::owned(args, 2)?,
            token: args::owned(args, 3)?,
        },
        ("del", 3) => NamespaceOp::Del(args::owned(args, 2)?),
        ("get" | "set" | "add" | "del", _) => return Err(Error::WrongArity),
        _ => {
            return Err(Error::parse(
                "NAMESPACE subcommand must be one of GET, SET, DEL, ADD",
            ))
        }
    };
    Ok(Command::Namespace(op))
}

pub(super) fn parse_config(args: &[Bytes]) -> Result<Command> {
    let sub = args::keyword(args, 1)?;
    let op = match (sub.as_str(), args.len()) {
        ("get", 3) => ConfigOp::Get(args::owned(args, 2)?),
        ("set", 4) => ConfigOp::Set {
            name: args::keyword(args, 2)?,
            value: args::owned(args, 3)?,
        },
        ("rewrite", 2) => ConfigOp::Rewrite,
        ("get" | "set" | "rewrite", _) => return Err(Error::WrongArity),
        _ => {
            return Err(Error::parse(
                "CONFIG subcommand must be one of GET, SET, REWRITE",
            ))
        }
    };
    Ok(Command::Config(op))
}

pub(super) fn parse_slave_of(args: &[Bytes]) -> Result<Command> {
    let host = args::owned(args, 1)?;
    let port = args::text(args, 2)?;

    if host.eq_ignore_ascii_case("no") && port.eq_ignore_ascii_case("one") {
        return Ok(Command::SlaveOf(SlaveOfTarget::NoOne));
    }
    let port = port
        .parse()
        .map_err(|_| Error::parse("port should be number"))?;
    Ok(Command::SlaveOf(SlaveOfTarget::Master { host, port }))
}

/// `REPLCONF option value [option value ...]`; unknown options are ignored
pub(super) fn parse_replconf(args: &[Bytes]) -> Result<Command> {
    if args.len() % 2 == 0 {
        return Err(Error::WrongArity);
    }

    let mut listening_port = None;
    for idx in (1..args.len()).step_by(2) {
        if args::keyword(args, idx)? == "listening-port" {
            listening_port = Some(args::number(args::text(args, idx + 1)?)?);
        }
    }
    Ok(Command::Replconf { listening_port })
}

pub(super) fn parse_compact(_: &[Bytes]) -> Result<Command> {
    Ok(Command::Compact)
}

pub(super) fn parse_bgsave(_: &[Bytes]) -> Result<Command> {
    Ok(Command::BgSave)
}

pub(super) fn parse_flush_backup(_: &[Bytes]) -> Result<Command> {
    Ok(Command::FlushBackup)
}

pub(super) fn parse_last_save(_: &[Bytes]) -> Result<Command> {
    Ok(Command::LastSave)
}

pub(super) fn parse_debug(args: &[Bytes]) -> Result<Command> {
    if args.len() != 3 || args::keyword(args, 1)? != "sleep" {
        return Err(Error::parse("Syntax error, DEBUG SLEEP <seconds>"));
    }

    let secs: f64 = args::text(args, 2)?
        .parse()
        .map_err(|_| Error::parse("invalid debug sleep time"))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::parse("invalid debug sleep time"));
    }
    Ok(Command::DebugSleep { secs })
}

pub(super) fn parse_shutdown(_: &[Bytes]) -> Result<Command> {
    Ok(Command::Shutdown)
}

// =============================================================================
// NAMESPACE / CONFIG
// =============================================================================

pub(super) fn namespace(ctx: &ServerContext, op: NamespaceOp) -> Result<Frame> {
    // Held across the mutation so requirepass cannot change underneath it
    let config = ctx.config();
    check_namespace_writable(
        config.repl_namespace_enabled,
        ctx.replication().is_slave(),
        op.subcommand(),
    )?;

    let store = ctx.namespaces();
    let requirepass = config.requirepass.as_str();
    let persist = |pairs: &[(String, String)]| match config.config_path {
        Some(_) => config.rewrite(pairs),
        None => Ok(()),
    };

    match op {
        NamespaceOp::Get(ns) if ns == "*" => {
            let mut items = Vec::new();
            for (ns, token) in store.list() {
                items.push(ns);
                items.push(token);
            }
            items.push(DEFAULT_NAMESPACE.to_string());
            items.push(requirepass.to_string());
            Ok(Frame::bulk_array(items))
        }
        NamespaceOp::Get(ns) if ns == DEFAULT_NAMESPACE => Ok(Frame::bulk_str(requirepass)),
        NamespaceOp::Get(ns) => Ok(match store.get(&ns) {
            Some(token) => Frame::bulk(token),
            None => Frame::Null,
        }),
        NamespaceOp::Set { ns, token } => {
            store.set_with(&ns, &token, requirepass, persist)?;
            tracing::warn!(namespace = %ns, "namespace token updated");
            Ok(Frame::ok())
        }
        NamespaceOp::Add { ns, token } => {
            store.add_with(&ns, &token, requirepass, persist)?;
            tracing::warn!(namespace = %ns, "namespace added");
            Ok(Frame::ok())
        }
        NamespaceOp::Del(ns) => {
            store.del_with(&ns, persist)?;
            tracing::warn!(namespace = %ns, "namespace deleted");
            Ok(Frame::ok())
        }
    }
}

pub(super) fn config(ctx: &ServerContext, op: ConfigOp) -> Result<Frame> {
    match op {
        ConfigOp::Get(pattern) => Ok(Frame::bulk_array(ctx.config().get_matching(&pattern))),
        ConfigOp::Set { name, value } => {
            // Checked under the write guard; NAMESPACE mutations hold the read guard
            let mut config = ctx.config_mut();
            if name == "requirepass" && ctx.namespaces().contains_token(&value) {
                return Err(config_set_error(&name, "the token is duplicated with namespace"));
            }

            config
                .set_param(&name, &value)
                .map_err(|e| match e {
                    Error::Config(msg) => config_set_error(&name, &msg),
                    other => config_set_error(&name, &other.to_string()),
                })?;
            tracing::info!(name = %name, "config parameter updated");
            Ok(Frame::ok())
        }
        ConfigOp::Rewrite => {
            ctx.config().rewrite(&ctx.namespaces().list())?;
            tracing::info!("config file rewritten");
            Ok(Frame::ok())
        }
    }
}

fn config_set_error(name: &str, msg: &str) -> Error {
    Error::exec(format!("CONFIG SET '{}' error: {}", name, msg))
}

// =============================================================================
// Replication
// =============================================================================

pub(super) fn slave_of(ctx: &ServerContext, session: &Session, target: SlaveOfTarget) -> Result<Frame> {
    let topology = ctx.topology();
    ctx.replication().slave_of(&target, &topology)?;

    let slaveof = match target {
        SlaveOfTarget::NoOne => {
            tracing::warn!(by = session.addr(), "role changed to master");
            None
        }
        SlaveOfTarget::Master { host, port } => {
            tracing::warn!(master = %format!("{}:{}", host, port), by = session.addr(), "role changed to slave");
            Some((host, port))
        }
    };
    ctx.config_mut().slaveof = slaveof;
    Ok(Frame::ok())
}

pub(super) fn role(ctx: &ServerContext) -> Frame {
    match ctx.replication().role() {
        Role::Master => {
            let replicas = ctx
                .registry()
                .replica_addresses()
                .into_iter()
                .map(|(ip, port)| Frame::bulk_array([ip, port.to_string(), "0".to_string()]))
                .collect();
            Frame::Array(vec![
                Frame::bulk_str("master"),
                Frame::Integer(0),
                Frame::Array(replicas),
            ])
        }
        Role::Slave { host, port } => Frame::Array(vec![
            Frame::bulk_str("slave"),
            Frame::bulk(host),
            Frame::Integer(port as i64),
            Frame::bulk_str(ctx.replication().link_state().as_str()),
            Frame::Integer(0),
        ]),
    }
}

pub(super) fn replconf(ctx: &ServerContext, session: &Session, listening_port: Option<u16>) -> Frame {
    if let Some(port) = listening_port {
        ctx.registry().mark_replica(session.id(), port);
        tracing::info!(addr = session.addr(), port, "replica announced itself");
    }
    Frame::ok()
}

// =============================================================================
// INFO
// =============================================================================

pub(super) fn info(ctx: &ServerContext, session: &Session, section: &str) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    let mut out = String::new();

    for name in INFO_SECTIONS {
        if section != "all" && section != *name {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\r\n");
        }
        match *name {
            "server" => info_server(ctx, &mut out),
            "clients" => info_clients(ctx, &mut out),
            "persistence" => info_persistence(ctx, &mut out),
            "replication" => info_replication(ctx, &mut out),
            "cluster" => info_cluster(ctx, &mut out),
            _ => info_keyspace(ctx, &ns, &mut out),
        }
    }
    Ok(Frame::bulk(out))
}

fn info_server(ctx: &ServerContext, out: &mut String) {
    let _ = write!(
        out,
        "# Server\r\nversion:{}\r\nos:{} {}\r\nprocess_id:{}\r\ntcp_port:{}\r\nuptime_in_seconds:{}\r\nuptime_in_days:{}\r\n",
        crate::VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH,
        std::process::id(),
        ctx.config().port,
        ctx.uptime_secs(),
        ctx.uptime_secs() / 86_400,
    );
}

fn info_clients(ctx: &ServerContext, out: &mut String) {
    let _ = write!(
        out,
        "# Clients\r\nmaxclients:{}\r\nconnected_clients:{}\r\n",
        ctx.config().max_clients,
        ctx.registry().len(),
    );
}

fn info_persistence(ctx: &ServerContext, out: &mut String) {
    let stats = ctx.jobs().stats();
    let _ = write!(
        out,
        "# Persistence\r\nbgsave_in_progress:{}\r\nlast_bgsave_status:{}\r\nlast_bgsave_time:{}\r\nlast_bgsave_time_sec:{}\r\n",
        stats.bgsave_in_progress() as u8,
        if stats.last_bgsave_ok() { "ok" } else { "err" },
        stats.last_bgsave_time(),
        stats.last_bgsave_duration_secs(),
    );
}

fn info_replication(ctx: &ServerContext, out: &mut String) {
    let role = ctx.replication().role();
    let replicas = ctx.registry().replica_addresses();
    let _ = write!(out, "# Replication\r\nrole:{}\r\n", role.name());
    if let Role::Slave { host, port } = &role {
        let _ = write!(
            out,
            "master_host:{}\r\nmaster_port:{}\r\nmaster_link_status:{}\r\n",
            host,
            port,
            ctx.replication().link_state().as_str(),
        );
    }
    let _ = write!(out, "connected_slaves:{}\r\n", replicas.len());
    for (idx, (ip, port)) in replicas.iter().enumerate() {
        let _ = write!(out, "slave{}:ip={},port={}\r\n", idx, ip, port);
    }
}

fn info_cluster(ctx: &ServerContext, out: &mut String) {
    let _ = write!(
        out,
        "# Cluster\r\ncluster_enabled:{}\r\n",
        ctx.config().cluster_enabled as u8
    );
}

fn info_keyspace(ctx: &ServerContext, ns: &str, out: &mut String) {
    let stats = ctx.jobs().stats().key_num(ns);
    let _ = write!(
        out,
        "# Keyspace\r\n# Last DBSIZE SCAN time: {}\r\ndb0:keys={},expires=0\r\n",
        stats.scanned_at, stats.n_key,
    );
}

// =============================================================================
// Misc
// =============================================================================

pub(super) fn debug_sleep(secs: f64) -> Frame {
    thread::sleep(Duration::from_secs_f64(secs));
    Frame::ok()
}

pub(super) fn shutdown(ctx: &ServerContext, session: &Session) -> Frame {
    tracing::warn!(by = session.addr(), "shutdown requested");
    session.enable_flag(SessionFlags::CLOSE_AFTER_REPLY);
    ctx.request_shutdown();
    Frame::ok()
}
