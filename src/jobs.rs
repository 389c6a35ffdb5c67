//! Background Jobs
//!
//! One worker thread fed by a crossbeam channel runs the slow
//! administrative tasks; the issuing command returns once the job is queued.
//!
//! ```text
//! BGSAVE / FLUSHBACKUP / COMPACT / DBSIZE SCAN
//!              │ submit
//!              ▼
//!     ┌─────────────────┐      ┌──────────────────────┐
//!     │ channel (FIFO)  │ ───► │ harborkv-jobs thread │ ──► JobStats
//!     └─────────────────┘      └──────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Sender};
use parking_lot::{Mutex, RwLock};

use crate::clock::now_secs;
use crate::error::{Error, Result};
use crate::storage::{purge_backups, write_backup, Storage};

enum Job {
    BgSave,
    PurgeBackups,
    Compact,
    ScanDbSize { namespace: String },
    /// Acknowledged once every earlier job has finished
    Barrier(Sender<()>),
}

/// Key count of one namespace, as of the last DBSIZE SCAN
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyNumStats {
    pub n_key: u64,
    /// Unix seconds of the scan
    pub scanned_at: i64,
}

/// Results published by the worker
#[derive(Debug)]
pub struct JobStats {
    bgsave_in_progress: AtomicBool,
    /// Unix seconds, -1 before the first save
    last_bgsave_time: AtomicI64,
    last_bgsave_ok: AtomicBool,
    last_bgsave_duration_secs: AtomicI64,
    key_counts: RwLock<HashMap<String, KeyNumStats>>,
    /// Namespaces with a DBSIZE SCAN queued or running
    scanning: Mutex<HashSet<String>>,
}

impl Default for JobStats {
    fn default() -> Self {
        Self {
            bgsave_in_progress: AtomicBool::new(false),
            last_bgsave_time: AtomicI64::new(-1),
            last_bgsave_ok: AtomicBool::new(true),
            last_bgsave_duration_secs: AtomicI64::new(-1),
            key_counts: RwLock::new(HashMap::new()),
            scanning: Mutex::new(HashSet::new()),
        }
    }
}

impl JobStats {
    pub fn bgsave_in_progress(&self) -> bool {
        self.bgsave_in_progress.load(Ordering::SeqCst)
    }

    pub fn last_bgsave_time(&self) -> i64 {
        self.last_bgsave_time.load(Ordering::SeqCst)
    }

    pub fn last_bgsave_ok(&self) -> bool {
        self.last_bgsave_ok.load(Ordering::SeqCst)
    }

    pub fn last_bgsave_duration_secs(&self) -> i64 {
        self.last_bgsave_duration_secs.load(Ordering::SeqCst)
    }

    /// Latest key count of `namespace` (zero before any scan)
    pub fn key_num(&self, namespace: &str) -> KeyNumStats {
        self.key_counts
            .read()
            .get(namespace)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_scanning(&self, namespace: &str) -> bool {
        self.scanning.lock().contains(namespace)
    }
}

/// Handle to the background worker
pub struct JobRunner {
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    stats: Arc<JobStats>,
}

impl JobRunner {
    /// Spawn the worker
    pub fn start(storage: Arc<dyn Storage>, data_dir: PathBuf) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Job>();
        let stats = Arc::new(JobStats::default());

        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name("harborkv-jobs".to_string())
            .spawn(move || {
                for job in receiver {
                    run_job(job, storage.as_ref(), &data_dir, &worker_stats);
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            stats,
        })
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    /// Queue a snapshot of the whole keyspace
    pub fn bgsave(&self) -> Result<()> {
        if self.stats.bgsave_in_progress.swap(true, Ordering::SeqCst) {
            return Err(Error::exec("bgsave is already in progress"));
        }
        let queued = self.submit(Job::BgSave);
        if queued.is_err() {
            self.stats.bgsave_in_progress.store(false, Ordering::SeqCst);
        }
        queued
    }

    /// Queue removal of every snapshot
    pub fn purge_backups(&self) -> Result<()> {
        self.submit(Job::PurgeBackups)
    }

    /// Queue a purge of expired entries
    pub fn compact(&self) -> Result<()> {
        self.submit(Job::Compact)
    }

    /// Queue a key count of `namespace`
    pub fn scan_db_size(&self, namespace: &str) -> Result<()> {
        if !self.stats.scanning.lock().insert(namespace.to_string()) {
            return Err(Error::exec("scanning the db now"));
        }
        let queued = self.submit(Job::ScanDbSize {
            namespace: namespace.to_string(),
        });
        if queued.is_err() {
            self.stats.scanning.lock().remove(namespace);
        }
        queued
    }

    /// Block until every job queued so far has run
    pub fn flush(&self) {
        let (ack, done) = channel::bounded(1);
        if self.submit(Job::Barrier(ack)).is_ok() {
            let _ = done.recv();
        }
    }

    fn submit(&self, job: Job) -> Result<()> {
        self.sender
            .as_ref()
            .and_then(|s| s.send(job).ok())
            .ok_or_else(|| Error::exec("background worker is not running"))
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_job(job: Job, storage: &dyn Storage, data_dir: &std::path::Path, stats: &JobStats) {
    match job {
        Job::BgSave => {
            let started = Instant::now();
            let result = storage
                .snapshot()
                .and_then(|records| write_backup(data_dir, &records));

            match &result {
                Ok(path) => tracing::info!(path = %path.display(), "bgsave finished"),
                Err(e) => tracing::error!("bgsave failed: {}", e),
            }
            stats.last_bgsave_ok.store(result.is_ok(), Ordering::SeqCst);
            stats
                .last_bgsave_duration_secs
                .store(started.elapsed().as_secs() as i64, Ordering::SeqCst);
            stats.last_bgsave_time.store(now_secs(), Ordering::SeqCst);
            stats.bgsave_in_progress.store(false, Ordering::SeqCst);
        }
        Job::PurgeBackups => match purge_backups(data_dir) {
            Ok(removed) => tracing::info!(removed, "backups purged"),
            Err(e) => tracing::error!("failed to purge backups: {}", e),
        },
        Job::Compact => match storage.purge_expired() {
            Ok(purged) => tracing::info!(purged, "compaction finished"),
            Err(e) => tracing::error!("compaction failed: {}", e),
        },
        Job::ScanDbSize { namespace } => {
            match storage.key_count(&namespace) {
                Ok(n_key) => {
                    stats.key_counts.write().insert(
                        namespace.clone(),
                        KeyNumStats {
                            n_key,
                            scanned_at: now_secs(),
                        },
                    );
                    tracing::info!(namespace = %namespace, n_key, "dbsize scan finished");
                }
                Err(e) => tracing::error!(namespace = %namespace, "dbsize scan failed: {}", e),
            }
            stats.scanning.lock().remove(&namespace);
        }
        Job::Barrier(ack) => {
            let _ = ack.send(());
        }
    }
}
