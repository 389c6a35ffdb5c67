//! Cluster slot migration signalling
//!
//! The migration executor lives elsewhere; this is the pair of flags it
//! shares with the control plane.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct MigrationCoordinator {
    stop_requested: AtomicBool,
    in_progress: AtomicBool,
}

impl MigrationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stop_migration_flag(&self, stop: bool) {
        self.stop_requested.store(stop, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_migration_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Called by the migration executor as a task starts and ends
    pub fn set_in_progress(&self, running: bool) {
        self.in_progress.store(running, Ordering::SeqCst);
    }

    /// Ask a running migration to stop; used by FLUSHDB / FLUSHALL
    pub fn stop_if_running(&self) -> bool {
        if self.is_migration_in_progress() {
            self.set_stop_migration_flag(true);
            true
        } else {
            false
        }
    }
}
