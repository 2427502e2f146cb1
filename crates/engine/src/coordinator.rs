//! Commit coordinator for the database handle
//!
//! The CommitCoordinator wraps CommitManager and adds:
//! - Commit metrics (committed, conflicted, failed)
//! - Outcome logging under the `stratakv::db` target

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use stratakv_concurrency::{AtomicBatch, CommitManager, CommitResult};
use stratakv_core::{KvResult, Limits};
use stratakv_durability::CommitLog;
use stratakv_storage::OrderedStore;
use tracing::{debug, warn};

/// Commit coordinator for the database
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering: they are purely observational
/// and do not synchronize any other memory operations.
pub struct CommitCoordinator {
    manager: Arc<CommitManager>,
    committed: AtomicU64,
    conflicted: AtomicU64,
    failed: AtomicU64,
}

impl CommitCoordinator {
    /// Create a coordinator over `store`, continuing from its current version
    pub fn new(
        store: Arc<OrderedStore>,
        log: Option<CommitLog>,
        lock_stripes: usize,
        limits: Limits,
    ) -> Self {
        Self {
            manager: Arc::new(CommitManager::new(store, log, lock_stripes, limits)),
            committed: AtomicU64::new(0),
            conflicted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Commit a batch through the concurrency layer, recording the outcome
    pub fn commit(&self, batch: AtomicBatch) -> KvResult<CommitResult> {
        let mutations = batch.mutations.len();
        match self.manager.commit(batch) {
            Ok(CommitResult::Committed { versionstamp }) => {
                self.committed.fetch_add(1, Ordering::Relaxed);
                debug!(target: "stratakv::db", %versionstamp, mutations, "Commit succeeded");
                Ok(CommitResult::Committed { versionstamp })
            }
            Ok(CommitResult::Conflict) => {
                self.conflicted.fetch_add(1, Ordering::Relaxed);
                debug!(target: "stratakv::db", mutations, "Commit rejected by check");
                Ok(CommitResult::Conflict)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                if e.is_type_error() {
                    debug!(target: "stratakv::db", error = %e, "Commit rejected");
                } else {
                    warn!(target: "stratakv::db", error = %e, "Commit failed");
                }
                Err(e)
            }
        }
    }

    /// The underlying commit manager, shared with background tasks
    pub fn manager(&self) -> &Arc<CommitManager> {
        &self.manager
    }

    /// Version of the latest published commit
    pub fn current_version(&self) -> u64 {
        self.manager.current_version()
    }

    /// Snapshot of the commit counters
    pub fn metrics(&self) -> CommitMetrics {
        CommitMetrics {
            committed: self.committed.load(Ordering::Relaxed),
            conflicted: self.conflicted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Commit metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitMetrics {
    /// Batches applied
    pub committed: u64,
    /// Batches rejected by a failed check
    pub conflicted: u64,
    /// Batches rejected by an error
    pub failed: u64,
}

impl CommitMetrics {
    /// Total commit attempts
    pub fn total(&self) -> u64 {
        self.committed + self.conflicted + self.failed
    }

    /// Conflict rate (conflicted / total)
    pub fn conflict_rate(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.conflicted as f64 / total as f64
        } else {
            0.0
        }
    }
}
