//! Background removal of expired entries
//!
//! Expired entries read as absent immediately, but stay in the store and the
//! commit log until deleted. [`ExpirySweeper`] runs a thread that
//! periodically purges them through the normal commit path
//! ([`CommitManager::purge_expired`]), so every purge is logged and replay
//! reaches the same state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use stratakv_concurrency::CommitManager;
use stratakv_core::{now_millis, KvResult};
use tracing::{debug, warn};

/// Keys deleted per purge commit
pub const PURGE_BATCH_SIZE: usize = 1000;

/// Longest the sweeper sleeps before re-checking for shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Purge every entry whose deadline passed at `now`, one batch per commit
///
/// Returns the number of entries removed.
pub fn purge_all(manager: &CommitManager, now: u64) -> KvResult<usize> {
    let mut purged = 0;
    loop {
        let removed = manager.purge_expired(now, PURGE_BATCH_SIZE)?;
        purged += removed;
        if removed < PURGE_BATCH_SIZE {
            return Ok(purged);
        }
    }
}

/// Background expiry purge task
///
/// Stops when [`shutdown`](Self::shutdown) is called or the sweeper is
/// dropped; either waits for the thread to exit.
pub struct ExpirySweeper {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Start purging through `manager` every `interval`
    ///
    /// The first purge runs one interval after start.
    pub fn start(manager: Arc<CommitManager>, interval: Duration) -> KvResult<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("stratakv-expiry".to_string())
            .spawn(move || {
                let step = SHUTDOWN_POLL.min(interval);
                loop {
                    let mut elapsed = Duration::ZERO;
                    while elapsed < interval {
                        if flag.load(Ordering::Relaxed) {
                            return;
                        }
                        thread::sleep(step);
                        elapsed += step;
                    }
                    if flag.load(Ordering::Relaxed) {
                        return;
                    }
                    match purge_all(&manager, now_millis()) {
                        Ok(0) => {}
                        Ok(purged) => {
                            debug!(target: "stratakv::db", purged, "Expiry sweep finished")
                        }
                        Err(e) => warn!(target: "stratakv::db", error = %e, "Expiry sweep failed"),
                    }
                }
            })?;

        Ok(ExpirySweeper {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and wait for it
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(target: "stratakv::db", "Expiry sweeper thread panicked");
            }
        }
    }

    /// True until [`shutdown`](Self::shutdown) has been called
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ExpirySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("running", &self.is_running())
            .finish()
    }
}
