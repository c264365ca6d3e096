//! Health check logic.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe readiness tracking for the runtime's components: the
/// backing store, the stale-message sweeper, and the worker pools.
#[derive(Debug)]
pub struct HealthChecker {
    /// Whether the backing store is reachable.
    store_ready: Arc<AtomicBool>,

    /// Whether the stale-message sweeper's background task is running.
    sweeper_ready: Arc<AtomicBool>,

    /// Whether every registered worker pool has started.
    pools_ready: Arc<AtomicBool>,

    /// Aggregate ready-queue depth across all queues this checker watches.
    queue_depth: Arc<AtomicU64>,

    /// Readiness threshold: a queue depth at or above this is treated as
    /// backpressure, not crash-worthy but not ready for new traffic either.
    max_queue_depth: u64,
}

impl HealthChecker {
    #[must_use]
    pub fn new(max_queue_depth: u64) -> Self {
        Self {
            store_ready: Arc::new(AtomicBool::new(false)),
            sweeper_ready: Arc::new(AtomicBool::new(false)),
            pools_ready: Arc::new(AtomicBool::new(false)),
            queue_depth: Arc::new(AtomicU64::new(0)),
            max_queue_depth,
        }
    }

    pub fn set_store_ready(&self, ready: bool) {
        self.store_ready.store(ready, Ordering::Relaxed);
        tracing::debug!(ready, "store readiness updated");
    }

    pub fn set_sweeper_ready(&self, ready: bool) {
        self.sweeper_ready.store(ready, Ordering::Relaxed);
        tracing::debug!(ready, "sweeper readiness updated");
    }

    pub fn set_pools_ready(&self, ready: bool) {
        self.pools_ready.store(ready, Ordering::Relaxed);
        tracing::debug!(ready, "pool readiness updated");
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Liveness: if this can be called at all, the process is alive.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        true
    }

    /// Readiness: every tracked component is up and the queue isn't backed
    /// up past `max_queue_depth`.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let store_ok = self.store_ready.load(Ordering::Relaxed);
        let sweeper_ok = self.sweeper_ready.load(Ordering::Relaxed);
        let pools_ok = self.pools_ready.load(Ordering::Relaxed);
        let depth = self.queue_depth.load(Ordering::Relaxed);
        let depth_ok = depth < self.max_queue_depth;

        let ready = store_ok && sweeper_ok && pools_ok && depth_ok;

        if !ready {
            tracing::debug!(
                store_ready = store_ok,
                sweeper_ready = sweeper_ok,
                pools_ready = pools_ok,
                queue_depth = depth,
                max_queue_depth = self.max_queue_depth,
                "readiness check failed"
            );
        }

        ready
    }

    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            alive: self.is_alive(),
            ready: self.is_ready(),
            store_ready: self.store_ready.load(Ordering::Relaxed),
            sweeper_ready: self.sweeper_ready.load(Ordering::Relaxed),
            pools_ready: self.pools_ready.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth,
        }
    }
}

/// Detailed health status, suitable for embedding in a `/health` response
/// the caller's own HTTP layer serves.
#[derive(Debug, Clone, serde::Serialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct HealthStatus {
    pub alive: bool,
    pub ready: bool,
    pub store_ready: bool,
    pub sweeper_ready: bool,
    pub pools_ready: bool,
    pub queue_depth: u64,
    pub max_queue_depth: u64,
}
