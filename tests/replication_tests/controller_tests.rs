//! Replication Controller Tests
//!
//! SLAVEOF preconditions and role transitions, with the resolver and the
//! upstream link replaced by in-process fakes.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use harborkv::error::{Error, Result};
use harborkv::replication::{
    HostResolver, LinkState, MigrationCoordinator, ReplicationController, Role, SlaveOfTarget,
    Topology, UpstreamTransport,
};
use parking_lot::Mutex;

/// Hostname table lookups; unknown hosts fail to resolve
struct TableResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl TableResolver {
    fn new(entries: &[(&str, &[&str])]) -> Self {
        let hosts = entries
            .iter()
            .map(|(host, ips)| {
                let ips = ips.iter().map(|ip| ip.parse().unwrap()).collect();
                (host.to_string(), ips)
            })
            .collect();
        Self { hosts }
    }
}

impl HostResolver for TableResolver {
    fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        if let Ok(ip) = host.parse() {
            return Ok(vec![ip]);
        }
        self.hosts
            .get(host)
            .cloned()
            .ok_or_else(|| Error::exec(format!("Can not resolve hostname: {}", host)))
    }
}

/// Records every start/stop; can be told to refuse starts
#[derive(Default)]
struct RecordingTransport {
    starts: Mutex<Vec<(String, u16, u16)>>,
    stops: Mutex<usize>,
    fail: AtomicBool,
}

impl RecordingTransport {
    fn starts(&self) -> Vec<(String, u16, u16)> {
        self.starts.lock().clone()
    }

    fn stops(&self) -> usize {
        *self.stops.lock()
    }
}

impl UpstreamTransport for RecordingTransport {
    fn start(&self, host: &str, port: u16, listening_port: u16) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::exec("connection refused"));
        }
        self.starts
            .lock()
            .push((host.to_string(), port, listening_port));
        Ok(())
    }

    fn stop(&self) {
        *self.stops.lock() += 1;
    }

    fn state(&self) -> LinkState {
        LinkState::Connecting
    }
}

struct Fixture {
    controller: ReplicationController,
    transport: Arc<RecordingTransport>,
    migration: Arc<MigrationCoordinator>,
    topology: Topology,
}

fn fixture() -> Fixture {
    let resolver = TableResolver::new(&[
        ("localhost", &["127.0.0.1"]),
        ("master.local", &["10.0.0.9"]),
        ("replica.local", &["10.0.0.5"]),
    ]);
    let transport = Arc::new(RecordingTransport::default());
    let migration = Arc::new(MigrationCoordinator::new());
    let controller = ReplicationController::new(
        Box::new(resolver),
        Arc::clone(&transport) as Arc<dyn UpstreamTransport>,
        Arc::clone(&migration),
    );
    let topology = Topology {
        binds: vec!["127.0.0.1".to_string()],
        port: 6666,
        cluster_enabled: false,
        wal_disabled: false,
        replicas: vec![("10.0.0.5".to_string(), 6667)],
    };
    Fixture {
        controller,
        transport,
        migration,
        topology,
    }
}

fn master(host: &str, port: u16) -> SlaveOfTarget {
    SlaveOfTarget::Master {
        host: host.to_string(),
        port,
    }
}

fn message(result: Result<()>) -> String {
    result.unwrap_err().to_string()
}

// =============================================================================
// Transitions
// =============================================================================

#[test]
fn test_master_to_slave_and_back() {
    let f = fixture();
    assert_eq!(f.controller.role(), Role::Master);

    f.controller
        .slave_of(&master("master.local", 6379), &f.topology)
        .unwrap();
    assert_eq!(
        f.controller.role(),
        Role::Slave {
            host: "master.local".to_string(),
            port: 6379
        }
    );
    assert!(f.controller.is_slave());
    assert_eq!(
        f.transport.starts(),
        vec![("master.local".to_string(), 6379, 6666)]
    );

    f.controller.slave_of(&SlaveOfTarget::NoOne, &f.topology).unwrap();
    assert_eq!(f.controller.role(), Role::Master);
    assert_eq!(f.transport.stops(), 1);
}

#[test]
fn test_no_one_on_master_is_noop() {
    let f = fixture();
    f.controller.slave_of(&SlaveOfTarget::NoOne, &f.topology).unwrap();
    assert_eq!(f.controller.role(), Role::Master);
    assert_eq!(f.transport.stops(), 0);
}

#[test]
fn test_same_master_is_idempotent() {
    let f = fixture();
    for _ in 0..3 {
        f.controller
            .slave_of(&master("10.0.0.9", 6379), &f.topology)
            .unwrap();
    }
    assert_eq!(f.transport.starts().len(), 1);
}

#[test]
fn test_switching_master_restarts_link() {
    let f = fixture();
    f.controller
        .slave_of(&master("10.0.0.9", 6379), &f.topology)
        .unwrap();
    f.controller
        .slave_of(&master("10.0.0.9", 6380), &f.topology)
        .unwrap();

    assert_eq!(f.transport.starts().len(), 2);
    assert_eq!(
        f.controller.role(),
        Role::Slave {
            host: "10.0.0.9".to_string(),
            port: 6380
        }
    );
}

// =============================================================================
// Preconditions
// =============================================================================

#[test]
fn test_replicating_itself_rejected() {
    let f = fixture();
    for host in ["127.0.0.1", "localhost"] {
        assert_eq!(
            message(f.controller.slave_of(&master(host, 6666), &f.topology)),
            "can't replicate itself"
        );
    }
    assert_eq!(f.controller.role(), Role::Master);
    assert!(f.transport.starts().is_empty());

    // Same host, other port is a different node
    f.controller
        .slave_of(&master("127.0.0.1", 6667), &f.topology)
        .unwrap();
}

#[test]
fn test_wildcard_bind_treats_loopback_as_self() {
    let mut f = fixture();
    f.topology.binds = vec!["0.0.0.0".to_string()];
    assert_eq!(
        message(f.controller.slave_of(&master("127.0.0.1", 6666), &f.topology)),
        "can't replicate itself"
    );
}

#[test]
fn test_replicating_own_replica_rejected() {
    let f = fixture();
    for host in ["10.0.0.5", "replica.local"] {
        assert_eq!(
            message(f.controller.slave_of(&master(host, 6667), &f.topology)),
            "can't replicate your own replicas"
        );
    }
    assert_eq!(f.controller.role(), Role::Master);
}

#[test]
fn test_cluster_mode_rejected() {
    let mut f = fixture();
    f.topology.cluster_enabled = true;
    assert_eq!(
        message(f.controller.slave_of(&master("10.0.0.9", 6379), &f.topology)),
        "can't change to slave in cluster mode"
    );
    assert_eq!(
        message(f.controller.slave_of(&SlaveOfTarget::NoOne, &f.topology)),
        "can't change to slave in cluster mode"
    );
    assert!(f.transport.starts().is_empty());
}

#[test]
fn test_wal_disabled_rejected() {
    let mut f = fixture();
    f.topology.wal_disabled = true;
    assert_eq!(
        message(f.controller.slave_of(&master("10.0.0.9", 6379), &f.topology)),
        "slaveof doesn't work with disable_wal option"
    );
    assert_eq!(f.controller.role(), Role::Master);
}

#[test]
fn test_unresolvable_host_reported() {
    let f = fixture();
    assert_eq!(
        message(f.controller.slave_of(&master("nowhere", 6379), &f.topology)),
        "Can not resolve hostname: nowhere"
    );
    assert_eq!(f.controller.role(), Role::Master);
}

#[test]
fn test_transport_failure_keeps_role() {
    let f = fixture();
    f.controller
        .slave_of(&master("10.0.0.9", 6379), &f.topology)
        .unwrap();

    f.transport.fail.store(true, Ordering::SeqCst);
    assert!(f
        .controller
        .slave_of(&master("10.0.0.10", 6379), &f.topology)
        .is_err());
    assert_eq!(
        f.controller.role(),
        Role::Slave {
            host: "10.0.0.9".to_string(),
            port: 6379
        }
    );
}

// =============================================================================
// Migration Flags
// =============================================================================

#[test]
fn test_cluster_attach_stops_migration_and_master_resumes_it() {
    let mut f = fixture();
    f.topology.cluster_enabled = true;

    f.controller.attach("10.0.0.9", 6379, &f.topology).unwrap();
    assert!(f.migration.stop_requested());

    f.controller.become_master(true);
    assert!(!f.migration.stop_requested());
    assert_eq!(f.controller.role(), Role::Master);
}

#[test]
fn test_non_cluster_attach_leaves_migration_alone() {
    let f = fixture();
    f.controller.attach("10.0.0.9", 6379, &f.topology).unwrap();
    assert!(!f.migration.stop_requested());
}

#[test]
fn test_stop_if_running() {
    let migration = MigrationCoordinator::new();
    assert!(!migration.stop_if_running());
    assert!(!migration.stop_requested());

    migration.set_in_progress(true);
    assert!(migration.stop_if_running());
    assert!(migration.stop_requested());
}
