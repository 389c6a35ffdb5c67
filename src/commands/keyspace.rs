//! Keyspace commands
//!
//! Everything here runs against the caller's bound namespace only, except
//! FLUSHALL (admin) which clears every namespace.

use std::path::Path;

use bytes::Bytes;

use crate::clock::now_ms;
use crate::context::ServerContext;
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::rdb::{decode_dump, encode_dump, load_rdb};
use crate::scan::{decode, next_cursor, parse_key_pattern, CursorType, ScanParams, ScanStart};
use crate::session::Session;

use super::{args, bound_namespace, Command};

/// Parsed RESTORE arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreArgs {
    pub key: Vec<u8>,
    /// Relative TTL, or absolute Unix milliseconds with `absttl`; 0 = none
    pub ttl_ms: i64,
    pub payload: Bytes,
    pub replace: bool,
    pub absttl: bool,
    /// Accepted and range checked, no storage effect
    pub idle_time: Option<i64>,
    pub freq: Option<i64>,
}

// =============================================================================
// Parsers
// =============================================================================

pub(super) fn parse_keys(args: &[Bytes]) -> Result<Command> {
    Ok(Command::Keys {
        prefix: parse_key_pattern(args::text(args, 1)?)?,
    })
}

pub(super) fn parse_scan(args: &[Bytes]) -> Result<Command> {
    let start = decode(args::text(args, 1)?, CursorType::Base)?;
    let options = args::texts(args, 2)?;
    let options: Vec<&str> = options.iter().map(String::as_str).collect();
    Ok(Command::Scan {
        start,
        params: ScanParams::parse(&options)?,
    })
}

pub(super) fn parse_random_key(_: &[Bytes]) -> Result<Command> {
    Ok(Command::RandomKey)
}

pub(super) fn parse_flush_db(_: &[Bytes]) -> Result<Command> {
    Ok(Command::FlushDb)
}

pub(super) fn parse_flush_all(_: &[Bytes]) -> Result<Command> {
    Ok(Command::FlushAll)
}

pub(super) fn parse_db_size(args: &[Bytes]) -> Result<Command> {
    match args.len() {
        1 => Ok(Command::DbSize { scan: false }),
        2 if args::keyword(args, 1)? == "scan" => Ok(Command::DbSize { scan: true }),
        _ => Err(Error::parse("DBSIZE subcommand only supports scan")),
    }
}

/// `DISK USAGE key` and `MEMORY USAGE key`
pub(super) fn parse_key_size(args: &[Bytes]) -> Result<Command> {
    if args::keyword(args, 1)? != "usage" {
        return Err(Error::exec("Unknown operation"));
    }
    Ok(Command::KeySize {
        key: args::raw(args, 2)?,
    })
}

pub(super) fn parse_restore(args: &[Bytes]) -> Result<Command> {
    let ttl_ms: i64 = args::number(args::text(args, 2)?)?;
    if ttl_ms < 0 {
        return Err(Error::not_integer());
    }

    let mut restore = RestoreArgs {
        key: args::raw(args, 1)?,
        ttl_ms,
        payload: args[3].clone(),
        replace: false,
        absttl: false,
        idle_time: None,
        freq: None,
    };

    let mut next = 4;
    while next < args.len() {
        let option = args::keyword(args, next)?;
        let has_value = next + 1 < args.len();
        match option.as_str() {
            "replace" => restore.replace = true,
            "absttl" => restore.absttl = true,
            "idletime" if has_value => {
                let idle: i64 = args::number(args::text(args, next + 1)?)?;
                if idle < 0 {
                    return Err(Error::parse("IDLETIME can't be negative"));
                }
                restore.idle_time = Some(idle);
                next += 1;
            }
            "freq" if has_value => {
                let freq: i64 = args::number(args::text(args, next + 1)?)?;
                if !(0..=255).contains(&freq) {
                    return Err(Error::parse("FREQ must be >= 0 and <= 255"));
                }
                restore.freq = Some(freq);
                next += 1;
            }
            _ => return Err(Error::syntax()),
        }
        next += 1;
    }
    Ok(Command::Restore(restore))
}

pub(super) fn parse_dump(args: &[Bytes]) -> Result<Command> {
    Ok(Command::Dump {
        key: args::raw(args, 1)?,
    })
}

/// `RDB LOAD path [NX] [DB n]`
pub(super) fn parse_rdb(args: &[Bytes]) -> Result<Command> {
    if args::keyword(args, 1)? != "load" {
        return Err(Error::parse("unknown subcommand"));
    }

    let path = args::owned(args, 2)?;
    let mut overwrite = true;
    let mut db = 0;

    let mut next = 3;
    while next < args.len() {
        match args::keyword(args, next)?.as_str() {
            "nx" => overwrite = false,
            "db" if next + 1 < args.len() => {
                db = args::number(args::text(args, next + 1)?)?;
                next += 1;
            }
            _ => return Err(Error::syntax()),
        }
        next += 1;
    }
    Ok(Command::RdbLoad {
        path,
        overwrite,
        db,
    })
}

// =============================================================================
// Handlers
// =============================================================================

pub(super) fn keys(ctx: &ServerContext, session: &Session, prefix: &[u8]) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    Ok(Frame::bulk_array(ctx.storage().keys(&ns, prefix)?))
}

pub(super) fn scan(
    ctx: &ServerContext,
    session: &Session,
    start: ScanStart,
    params: &ScanParams,
) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    let limit = params.limit(ctx.config().scan_default_count);
    let after = match &start {
        ScanStart::Beginning => None,
        ScanStart::After(key) => Some(key.as_slice()),
    };

    let page = ctx.storage().scan(&ns, after, limit, &params.prefix)?;
    let cursor = next_cursor(CursorType::Base, page.end_key.as_deref());
    Ok(Frame::Array(vec![
        Frame::bulk(cursor),
        Frame::bulk_array(page.keys),
    ]))
}

pub(super) fn random_key(ctx: &ServerContext, session: &Session) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    Ok(match ctx.next_random_key(&ns)? {
        Some(key) => Frame::bulk(key),
        None => Frame::Null,
    })
}

pub(super) fn flush_db(ctx: &ServerContext, session: &Session) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    stop_migration_for(ctx, "flushdb");
    ctx.storage().flush_namespace(&ns)?;
    tracing::warn!(namespace = %ns, by = session.addr(), "namespace flushed");
    Ok(Frame::ok())
}

pub(super) fn flush_all(ctx: &ServerContext, session: &Session) -> Result<Frame> {
    stop_migration_for(ctx, "flushall");
    ctx.storage().flush_all()?;
    tracing::warn!(by = session.addr(), "all namespaces flushed");
    Ok(Frame::ok())
}

/// A flush in cluster mode must not race a slot migration
fn stop_migration_for(ctx: &ServerContext, command: &str) {
    if ctx.config().cluster_enabled && ctx.migration().stop_if_running() {
        tracing::info!(command, "stopped migration task");
    }
}

pub(super) fn db_size(ctx: &ServerContext, session: &Session, scan: bool) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    if scan {
        ctx.jobs().scan_db_size(&ns)?;
        Ok(Frame::ok())
    } else {
        Ok(Frame::Integer(ctx.jobs().stats().key_num(&ns).n_key as i64))
    }
}

pub(super) fn key_size(ctx: &ServerContext, session: &Session, key: &[u8]) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    Ok(match ctx.storage().key_size(&ns, key)? {
        Some(size) => Frame::Integer(size as i64),
        None => Frame::Null,
    })
}

pub(super) fn restore(ctx: &ServerContext, session: &Session, restore: RestoreArgs) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    let storage = ctx.storage();

    if !restore.replace && storage.exists(&ns, &restore.key)? {
        return Err(Error::exec("target key name already exists."));
    }
    let value = decode_dump(&restore.payload)?;

    if restore.replace {
        storage.delete(&ns, &restore.key)?;
    }

    let mut ttl_ms = restore.ttl_ms;
    if ttl_ms > 0 && restore.absttl {
        ttl_ms -= now_ms() as i64;
        if ttl_ms <= 0 {
            // Already expired: nothing to store
            return Ok(Frame::ok());
        }
    }

    let ttl = (ttl_ms > 0).then_some(ttl_ms as u64);
    storage.put(&ns, &restore.key, value, ttl)?;
    Ok(Frame::ok())
}

pub(super) fn dump(ctx: &ServerContext, session: &Session, key: &[u8]) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    Ok(match ctx.storage().get(&ns, key)? {
        Some(value) => Frame::bulk(encode_dump(&value)?),
        None => Frame::Null,
    })
}

pub(super) fn rdb_load(
    ctx: &ServerContext,
    session: &Session,
    path: &str,
    overwrite: bool,
    db: u32,
) -> Result<Frame> {
    let ns = bound_namespace(session)?;
    load_rdb(Path::new(path), ctx.storage(), &ns, db, overwrite)?;
    Ok(Frame::ok())
}
