//! Hostname resolution

use std::net::{IpAddr, ToSocketAddrs};

use crate::error::{Error, Result};

/// Resolves a host to every address it names
pub trait HostResolver: Send + Sync {
    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// Resolver backed by the system resolver
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let unresolved = || Error::exec(format!("Can not resolve hostname: {}", host));
        let mut ips: Vec<IpAddr> = (host, 0)
            .to_socket_addrs()
            .map_err(|_| unresolved())?
            .map(|addr| addr.ip())
            .collect();
        ips.dedup();

        if ips.is_empty() {
            return Err(unresolved());
        }
        Ok(ips)
    }
}
