//! Server Context
//!
//! The process-wide state every command handler works against. It is owned
//! explicitly and handed to handlers by reference; nothing here is global.
//!
//! ## Locking
//! ```text
//! config (RwLock)        rarely written: CONFIG SET, SLAVEOF
//! namespaces (RwLock)    rarely written: NAMESPACE SET/ADD/DEL
//! role (RwLock)          written by SLAVEOF only
//! registry (RwLock)      written on connect/disconnect
//! ```
//! No handler holds two of these at once, except that `topology()` reads
//! the config and then the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::Config;
use crate::error::Result;
use crate::jobs::JobRunner;
use crate::namespace::NamespaceStore;
use crate::replication::{
    HostResolver, MigrationCoordinator, ReplicationController, SystemResolver, TcpUpstream,
    Topology, UpstreamTransport,
};
use crate::session::{Binding, ConnectionRegistry};
use crate::storage::{MemoryStorage, Storage};

/// Shared state of a running node
pub struct ServerContext {
    config: RwLock<Config>,
    namespaces: NamespaceStore,
    registry: ConnectionRegistry,
    replication: ReplicationController,
    migration: Arc<MigrationCoordinator>,
    storage: Arc<dyn Storage>,
    jobs: JobRunner,
    /// Last key returned by RANDOMKEY
    random_key_cursor: Mutex<Vec<u8>>,
    shutdown: AtomicBool,
    started_at: Instant,
}

impl ServerContext {
    pub fn builder(config: Config) -> ServerContextBuilder {
        ServerContextBuilder {
            config,
            storage: None,
            resolver: None,
            transport: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> RwLockReadGuard<'_, Config> {
        self.config.read()
    }

    pub fn config_mut(&self) -> RwLockWriteGuard<'_, Config> {
        self.config.write()
    }

    pub fn requirepass(&self) -> String {
        self.config.read().requirepass.clone()
    }

    pub fn namespaces(&self) -> &NamespaceStore {
        &self.namespaces
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn replication(&self) -> &ReplicationController {
        &self.replication
    }

    pub fn migration(&self) -> &MigrationCoordinator {
        &self.migration
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn jobs(&self) -> &JobRunner {
        &self.jobs
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    // =========================================================================
    // Derived state
    // =========================================================================

    /// Binding a fresh connection starts with: none while a global password
    /// is configured, admin on `default` otherwise
    pub fn initial_binding(&self) -> Option<Binding> {
        if self.config.read().requirepass.is_empty() {
            Some(Binding::admin())
        } else {
            None
        }
    }

    /// Snapshot of what the replication controller checks against
    pub fn topology(&self) -> Topology {
        let (binds, port, cluster_enabled, wal_disabled) = {
            let config = self.config.read();
            (
                config.binds.clone(),
                config.port,
                config.cluster_enabled,
                config.wal_disabled,
            )
        };
        Topology {
            binds,
            port,
            cluster_enabled,
            wal_disabled,
            replicas: self.registry.replica_addresses(),
        }
    }

    /// Record the port the listener actually bound
    pub fn set_port(&self, port: u16) {
        self.config.write().port = port;
    }

    /// Next key of `ns` after the one returned last time, wrapping around
    pub fn next_random_key(&self, ns: &str) -> Result<Option<Vec<u8>>> {
        let mut cursor = self.random_key_cursor.lock();
        let key = self.storage.random_key(ns, &cursor)?;
        match &key {
            Some(k) => cursor.clone_from(k),
            None => cursor.clear(),
        }
        Ok(key)
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// Builder for [`ServerContext`]; collaborators default to the in-tree
/// implementations
pub struct ServerContextBuilder {
    config: Config,
    storage: Option<Arc<dyn Storage>>,
    resolver: Option<Box<dyn HostResolver>>,
    transport: Option<Arc<dyn UpstreamTransport>>,
}

impl ServerContextBuilder {
    /// Use `storage` instead of a fresh [`MemoryStorage`]
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use `resolver` instead of [`SystemResolver`]
    pub fn resolver(mut self, resolver: Box<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use `transport` instead of [`TcpUpstream`]
    pub fn transport(mut self, transport: Arc<dyn UpstreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the namespace table and start the background worker
    pub fn build(self) -> Result<Arc<ServerContext>> {
        let namespaces = NamespaceStore::from_pairs(&self.config.namespaces, &self.config.requirepass)?;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let resolver = self.resolver.unwrap_or_else(|| Box::new(SystemResolver));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(TcpUpstream::new()));

        let migration = Arc::new(MigrationCoordinator::new());
        let replication = ReplicationController::new(resolver, transport, Arc::clone(&migration));
        let jobs = JobRunner::start(Arc::clone(&storage), self.config.data_dir.clone())?;

        tracing::debug!(namespaces = namespaces.len(), "server context ready");

        Ok(Arc::new(ServerContext {
            config: RwLock::new(self.config),
            namespaces,
            registry: ConnectionRegistry::new(),
            replication,
            migration,
            storage,
            jobs,
            random_key_cursor: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
            started_at: Instant::now(),
        }))
    }
}
