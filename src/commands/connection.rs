//! Connection commands: AUTH, HELLO, PING, ECHO, SELECT, QUIT, TIME,
//! MONITOR, CLIENT, COMMAND

use bytes::Bytes;

use crate::access::authenticate;
use crate::clock::now_us;
use crate::context::ServerContext;
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::session::{KillFilter, Session, SessionFlags};

use super::table::{lookup, CommandSpec, COMMAND_TABLE};
use super::{args, Command};

const CLIENT_SYNTAX: &str = "Syntax error, try CLIENT LIST|INFO|ID|KILL ip:port|GETNAME|SETNAME";

/// Parsed HELLO arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelloArgs {
    pub protover: Option<i64>,
    /// Applied in the order the client sent them
    pub options: Vec<HelloOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelloOption {
    Auth {
        user: Option<String>,
        password: String,
    },
    SetName(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientOp {
    List,
    Info,
    Id,
    GetName,
    SetName(String),
    Kill(KillFilter),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOp {
    All,
    Count,
    Info(Vec<String>),
    GetKeys(Vec<Bytes>),
}

// =============================================================================
// Parsers
// =============================================================================

pub(super) fn parse_auth(args: &[Bytes]) -> Result<Command> {
    Ok(Command::Auth {
        token: args::owned(args, 1)?,
    })
}

pub(super) fn parse_hello(args: &[Bytes]) -> Result<Command> {
    let mut hello = HelloArgs::default();
    if args.len() < 2 {
        return Ok(Command::Hello(hello));
    }

    hello.protover = Some(
        args::text(args, 1)?
            .parse()
            .map_err(|_| Error::parse("Protocol version is not an integer or out of range"))?,
    );

    let mut next = 2;
    while next < args.len() {
        let option = args::keyword(args, next)?;
        let remaining = args.len() - next - 1;

        if option == "auth" && remaining > 0 {
            // Two or four trailing arguments mean a username is present
            if remaining == 2 || remaining == 4 {
                hello.options.push(HelloOption::Auth {
                    user: Some(args::owned(args, next + 1)?),
                    password: args::owned(args, next + 2)?,
                });
                next += 3;
            } else {
                hello.options.push(HelloOption::Auth {
                    user: None,
                    password: args::owned(args, next + 1)?,
                });
                next += 2;
            }
        } else if option == "setname" && remaining > 0 {
            hello.options.push(HelloOption::SetName(args::owned(args, next + 1)?));
            next += 2;
        } else {
            return Err(Error::parse(format!(
                "Syntax error in HELLO option {}",
                args::text(args, next)?
            )));
        }
    }
    Ok(Command::Hello(hello))
}

pub(super) fn parse_quit(_: &[Bytes]) -> Result<Command> {
    Ok(Command::Quit)
}

pub(super) fn parse_ping(args: &[Bytes]) -> Result<Command> {
    match args.len() {
        1 => Ok(Command::Ping { message: None }),
        2 => Ok(Command::Ping {
            message: Some(args[1].clone()),
        }),
        _ => Err(Error::WrongArity),
    }
}

pub(super) fn parse_echo(args: &[Bytes]) -> Result<Command> {
    Ok(Command::Echo {
        message: args[1].clone(),
    })
}

pub(super) fn parse_select(_: &[Bytes]) -> Result<Command> {
    Ok(Command::Select)
}

pub(super) fn parse_time(_: &[Bytes]) -> Result<Command> {
    Ok(Command::Time)
}

pub(super) fn parse_monitor(_: &[Bytes]) -> Result<Command> {
    Ok(Command::Monitor)
}

pub(super) fn parse_client(args: &[Bytes]) -> Result<Command> {
    let sub = args::keyword(args, 1)?;
    let op = match (sub.as_str(), args.len()) {
        ("list", 2) => ClientOp::List,
        ("info", 2) => ClientOp::Info,
        ("id", 2) => ClientOp::Id,
        ("getname", 2) => ClientOp::GetName,
        ("setname", 3) => ClientOp::SetName(args::owned(args, 2)?),
        ("kill", n) if n >= 3 => ClientOp::Kill(KillFilter::parse(&args::texts(args, 2)?)?),
        _ => return Err(Error::parse(CLIENT_SYNTAX)),
    };
    Ok(Command::Client(op))
}

pub(super) fn parse_command(args: &[Bytes]) -> Result<Command> {
    if args.len() == 1 {
        return Ok(Command::Command(CommandOp::All));
    }

    let op = match args::keyword(args, 1)?.as_str() {
        "count" if args.len() == 2 => CommandOp::Count,
        "count" => return Err(Error::WrongArity),
        "info" => CommandOp::Info(args::texts(args, 2)?),
        "getkeys" if args.len() >= 3 => CommandOp::GetKeys(args[2..].to_vec()),
        "getkeys" => return Err(Error::WrongArity),
        _ => {
            return Err(Error::parse(
                "Command subcommand must be one of COUNT, GETKEYS, INFO",
            ))
        }
    };
    Ok(Command::Command(op))
}

// =============================================================================
// Handlers
// =============================================================================

pub(super) fn auth(ctx: &ServerContext, session: &Session, token: &str) -> Result<Frame> {
    authenticate(ctx.namespaces(), &ctx.requirepass(), token).apply(session)?;
    Ok(Frame::ok())
}

pub(super) fn hello(ctx: &ServerContext, session: &Session, hello: HelloArgs) -> Result<Frame> {
    if let Some(version) = hello.protover {
        if !(2..=3).contains(&version) {
            return Err(Error::NoProto);
        }
    }

    for option in hello.options {
        match option {
            HelloOption::Auth { user, password } => {
                if user.is_some_and(|u| u != "default") {
                    return Err(Error::InvalidPassword);
                }
                authenticate(ctx.namespaces(), &ctx.requirepass(), &password).apply(session)?;
            }
            HelloOption::SetName(name) => {
                if !session.is_authenticated() {
                    return Err(Error::NoAuth);
                }
                session.set_name(&name)?;
            }
        }
    }

    if !session.is_authenticated() {
        return Err(Error::NoAuth);
    }

    let mode = if ctx.config().cluster_enabled {
        "cluster"
    } else {
        "standalone"
    };
    Ok(Frame::Array(vec![
        Frame::bulk_str("server"),
        Frame::bulk_str("redis"),
        Frame::bulk_str("version"),
        Frame::bulk_str(crate::VERSION),
        Frame::bulk_str("proto"),
        Frame::Integer(2),
        Frame::bulk_str("mode"),
        Frame::bulk_str(mode),
    ]))
}

pub(super) fn ping(message: Option<Bytes>) -> Frame {
    match message {
        Some(message) => Frame::bulk(message),
        None => Frame::simple("PONG"),
    }
}

pub(super) fn quit(session: &Session) -> Frame {
    session.enable_flag(SessionFlags::CLOSE_AFTER_REPLY);
    Frame::ok()
}

pub(super) fn time() -> Frame {
    let now = now_us();
    Frame::bulk_array([
        (now / 1_000_000).to_string(),
        (now % 1_000_000).to_string(),
    ])
}

pub(super) fn monitor(ctx: &ServerContext, session: &Session) -> Result<Frame> {
    ctx.registry().add_monitor(session.id())?;
    tracing::debug!(id = session.id(), "session entered monitor mode");
    Ok(Frame::ok())
}

pub(super) fn client(ctx: &ServerContext, session: &Session, op: ClientOp) -> Result<Frame> {
    match op {
        ClientOp::List => Ok(Frame::bulk(ctx.registry().list())),
        ClientOp::Info => Ok(Frame::bulk(session.to_line() + "\n")),
        ClientOp::Id => Ok(Frame::Integer(session.id() as i64)),
        ClientOp::GetName => Ok(match session.name() {
            Some(name) => Frame::bulk(name),
            None => Frame::Null,
        }),
        ClientOp::SetName(name) => {
            session.set_name(&name)?;
            Ok(Frame::ok())
        }
        ClientOp::Kill(filter) => {
            let killed = ctx.registry().kill(&filter, session);
            if filter.is_legacy() {
                if killed == 0 {
                    Err(Error::exec("No such client"))
                } else {
                    Ok(Frame::ok())
                }
            } else {
                Ok(Frame::Integer(killed as i64))
            }
        }
    }
}

pub(super) fn command(op: CommandOp) -> Result<Frame> {
    match op {
        CommandOp::All => Ok(Frame::Array(COMMAND_TABLE.iter().map(command_info).collect())),
        CommandOp::Count => Ok(Frame::Integer(COMMAND_TABLE.len() as i64)),
        CommandOp::Info(names) => Ok(Frame::Array(
            names
                .iter()
                .map(|name| lookup(name).map(command_info).unwrap_or(Frame::Null))
                .collect(),
        )),
        CommandOp::GetKeys(target) => {
            let name = String::from_utf8_lossy(&target[0]).to_ascii_lowercase();
            let spec = lookup(&name).ok_or_else(|| Error::parse("Invalid command specified"))?;
            if !spec.accepts(target.len()) {
                return Err(Error::parse(
                    "Invalid number of arguments specified for command",
                ));
            }

            let positions = spec.key_positions(target.len());
            if positions.is_empty() {
                return Err(Error::parse("Invalid arguments specified for command"));
            }
            Ok(Frame::Array(
                positions
                    .into_iter()
                    .map(|idx| Frame::bulk(target[idx].clone()))
                    .collect(),
            ))
        }
    }
}

/// `[name, arity, [flags...], first_key, last_key, step]`
fn command_info(spec: &CommandSpec) -> Frame {
    Frame::Array(vec![
        Frame::bulk_str(spec.name),
        Frame::Integer(spec.arity as i64),
        Frame::Array(spec.flag_list().map(Frame::simple).collect()),
        Frame::Integer(spec.first_key as i64),
        Frame::Integer(spec.last_key as i64),
        Frame::Integer(spec.step as i64),
    ])
}
