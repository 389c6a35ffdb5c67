//! CLIENT KILL filters
//!
//! Two grammars:
//! - legacy: `CLIENT KILL ip:port`
//! - structured: `CLIENT KILL [ADDR ip:port] [ID n] [TYPE kind]... [SKIPME yes|no]`
//!
//! Structured predicates are ANDed; unset predicates match everything.

use crate::error::{Error, Result};

use super::{ClientKind, KindMask};

/// Structured kill predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KillCriteria {
    pub addr: Option<String>,
    pub id: Option<u64>,
    pub kinds: KindMask,
    /// Exclude the issuing session
    pub skip_me: bool,
}

/// A parsed CLIENT KILL target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillFilter {
    /// Single exact address; zero matches is reported as an error
    Addr(String),
    Criteria(KillCriteria),
}

impl KillFilter {
    /// Parse the arguments following `KILL`
    pub fn parse(args: &[String]) -> Result<Self> {
        match args.len() {
            0 => Err(Error::syntax()),
            1 => Ok(KillFilter::Addr(args[0].clone())),
            _ => {
                let mut criteria = KillCriteria::default();
                for pair in args.chunks(2) {
                    let [option, value] = pair else {
                        return Err(Error::syntax());
                    };
                    match option.to_ascii_lowercase().as_str() {
                        "addr" => criteria.addr = Some(value.clone()),
                        "id" => {
                            criteria.id = Some(value.parse().map_err(|_| Error::not_integer())?)
                        }
                        "skipme" => {
                            criteria.skip_me = match value.to_ascii_lowercase().as_str() {
                                "yes" => true,
                                "no" => false,
                                _ => return Err(Error::syntax()),
                            }
                        }
                        "type" => criteria.kinds.insert(parse_kind(value)?),
                        _ => return Err(Error::syntax()),
                    }
                }
                Ok(KillFilter::Criteria(criteria))
            }
        }
    }

    /// Legacy single-address form
    pub fn is_legacy(&self) -> bool {
        matches!(self, KillFilter::Addr(_))
    }

    /// Whether a session with these attributes is selected
    pub fn matches(&self, id: u64, addr: &str, kind: ClientKind, caller_id: u64) -> bool {
        match self {
            KillFilter::Addr(target) => target == addr,
            KillFilter::Criteria(c) => {
                if c.skip_me && id == caller_id {
                    return false;
                }
                if c.addr.as_deref().is_some_and(|a| a != addr) {
                    return false;
                }
                if c.id.is_some_and(|target| target != id) {
                    return false;
                }
                c.kinds.matches(kind)
            }
        }
    }
}

fn parse_kind(value: &str) -> Result<ClientKind> {
    match value.to_ascii_lowercase().as_str() {
        "normal" => Ok(ClientKind::Normal),
        "pubsub" => Ok(ClientKind::PubSub),
        "master" => Ok(ClientKind::Master),
        "replica" | "slave" => Ok(ClientKind::Replica),
        _ => Err(Error::syntax()),
    }
}
