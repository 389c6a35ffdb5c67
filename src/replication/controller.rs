//! Replication role controller
//!
//! ## Preconditions (in order, before any mutation)
//! 1. admin privilege (enforced by the command gate)
//! 2. cluster mode disabled
//! 3. write-ahead log enabled
//! 4. for `SLAVEOF host port`, no resolved IP of `host` names this node or
//!    one of its own replicas
//!
//! ## Concurrency
//! Every transition holds the role write lock from the idempotence check
//! to the final assignment, so readers see either the old or the new role.

use std::net::IpAddr;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Error, Result};

use super::{HostResolver, LinkState, MigrationCoordinator, Role, UpstreamTransport};

/// Argument of SLAVEOF
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlaveOfTarget {
    NoOne,
    Master { host: String, port: u16 },
}

/// What the controller needs to know about this node
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub binds: Vec<String>,
    pub port: u16,
    pub cluster_enabled: bool,
    pub wal_disabled: bool,
    /// `(ip, listening_port)` of replicas attached to this node
    pub replicas: Vec<(String, u16)>,
}

pub struct ReplicationController {
    role: RwLock<Role>,
    resolver: Box<dyn HostResolver>,
    transport: Arc<dyn UpstreamTransport>,
    migration: Arc<MigrationCoordinator>,
}

impl ReplicationController {
    pub fn new(
        resolver: Box<dyn HostResolver>,
        transport: Arc<dyn UpstreamTransport>,
        migration: Arc<MigrationCoordinator>,
    ) -> Self {
        Self {
            role: RwLock::new(Role::Master),
            resolver,
            transport,
            migration,
        }
    }

    pub fn role(&self) -> Role {
        self.role.read().clone()
    }

    pub fn is_slave(&self) -> bool {
        self.role.read().is_slave()
    }

    pub fn link_state(&self) -> LinkState {
        self.transport.state()
    }

    /// Execute SLAVEOF
    pub fn slave_of(&self, target: &SlaveOfTarget, topology: &Topology) -> Result<()> {
        if topology.cluster_enabled {
            return Err(Error::exec("can't change to slave in cluster mode"));
        }
        if topology.wal_disabled {
            return Err(Error::exec("slaveof doesn't work with disable_wal option"));
        }

        match target {
            SlaveOfTarget::NoOne => {
                self.become_master(topology.cluster_enabled);
                Ok(())
            }
            SlaveOfTarget::Master { host, port } => {
                self.check_not_self(host, *port, topology)?;
                self.attach(host, *port, topology)
            }
        }
    }

    /// Detach from any master and take the master role
    pub fn become_master(&self, cluster_enabled: bool) {
        let mut role = self.role.write();
        if role.is_slave() {
            self.transport.stop();
        }
        *role = Role::Master;

        if cluster_enabled {
            self.migration.set_stop_migration_flag(false);
            tracing::info!("role changed to master, migration re-enabled");
        }
    }

    /// Follow `host:port`. Following the current master again is a no-op.
    pub fn attach(&self, host: &str, port: u16, topology: &Topology) -> Result<()> {
        let mut role = self.role.write();
        if let Role::Slave {
            host: current_host,
            port: current_port,
        } = &*role
        {
            if current_host == host && *current_port == port {
                return Ok(());
            }
        }

        self.transport.start(host, port, topology.port)?;
        *role = Role::Slave {
            host: host.to_string(),
            port,
        };

        if topology.cluster_enabled {
            self.migration.set_stop_migration_flag(true);
            tracing::info!("role changed to slave, migration stopped");
        }
        Ok(())
    }

    /// Reject a master that is this node or one of its replicas
    pub fn check_not_self(&self, host: &str, port: u16, topology: &Topology) -> Result<()> {
        let ips = self.resolver.resolve(host)?;
        for ip in ips {
            if port == topology.port && matches_listening_ip(&topology.binds, ip) {
                return Err(Error::exec("can't replicate itself"));
            }

            let ip_text = ip.to_string();
            if topology
                .replicas
                .iter()
                .any(|(replica_ip, replica_port)| *replica_ip == ip_text && *replica_port == port)
            {
                return Err(Error::exec("can't replicate your own replicas"));
            }
        }
        Ok(())
    }
}

/// Whether `ip` is one of the addresses this node listens on. A wildcard
/// bind listens on every local address, approximated by loopback.
fn matches_listening_ip(binds: &[String], ip: IpAddr) -> bool {
    binds.iter().any(|bind| match bind.parse::<IpAddr>() {
        Ok(bound) if bound.is_unspecified() => ip.is_loopback() || ip.is_unspecified(),
        Ok(bound) => bound == ip,
        Err(_) => *bind == ip.to_string(),
    })
}
