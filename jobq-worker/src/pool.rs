//! Worker pool and pool manager (C6).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use jobq_common::message::Message;
use jobq_queue::PriorityQueue;
use jobq_store::Store;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::worker::{Worker, WorkerConfig, WorkerStatus};
use crate::Handler;

fn default_worker_count() -> usize {
    4
}

/// Per-pool tuning: worker count plus the per-worker knobs from
/// [`WorkerConfig`]. `worker_type` is the tag a [`PoolManager`] registers
/// pools under (e.g. `ingest`, `enrichment`, `ai` — the illustrative
/// defaults from `spec.md` §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub worker_type: String,
    #[serde(default = "default_worker_count")]
    pub count: usize,
    #[serde(flatten)]
    pub worker: WorkerConfig,
}

impl PoolConfig {
    #[must_use]
    pub fn new(worker_type: impl Into<String>) -> Self {
        Self {
            worker_type: worker_type.into(),
            count: default_worker_count(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Aggregated pool statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub worker_count: usize,
    pub healthy_count: usize,
    pub processed: u64,
    pub failed: u64,
}

/// Fans out `count` workers over one queue with one handler; coordinates
/// their graceful shutdown.
pub struct Pool<S: Store, M: Message, H: Handler<M>> {
    config: PoolConfig,
    workers: Vec<Arc<Worker<S, M, H>>>,
}

impl<S, M, H> Pool<S, M, H>
where
    S: Store + 'static,
    M: Message,
    H: Handler<M> + 'static,
{
    #[must_use]
    pub fn new(queue: PriorityQueue<S, M>, handler: Arc<H>, config: PoolConfig) -> Self {
        let workers = (0..config.count)
            .map(|i| {
                Arc::new(Worker::new(
                    format!("{}-{i}", config.worker_type),
                    queue.clone(),
                    Arc::clone(&handler),
                    config.worker.clone(),
                ))
            })
            .collect();
        Self { config, workers }
    }

    pub fn start(&self) {
        info!(worker_type = %self.config.worker_type, count = self.workers.len(), "starting pool");
        for worker in &self.workers {
            worker.start();
        }
    }

    /// Cancel and stop every worker in parallel, waiting for all.
    pub async fn stop(&self) {
        info!(worker_type = %self.config.worker_type, "stopping pool");
        let stops = self.workers.iter().map(|w| {
            let w = Arc::clone(w);
            async move { w.stop().await }
        });
        spawn_and_join_all(stops).await;
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let healthy_count = self
            .workers
            .iter()
            .filter(|w| w.status() == WorkerStatus::Healthy)
            .count();
        let (processed, failed) = self
            .workers
            .iter()
            .fold((0u64, 0u64), |(p, f), w| (p + w.processed(), f + w.failed()));
        if let Some(metrics) = jobq_metrics::try_metrics() {
            metrics.worker.set_healthy_workers(healthy_count as u64);
        }
        PoolStats {
            worker_count: self.workers.len(),
            healthy_count,
            processed,
            failed,
        }
    }

    #[must_use]
    pub fn worker_type(&self) -> &str {
        &self.config.worker_type
    }
}

/// Runs every future on its own `tokio` task and waits for all of them,
/// without taking a dependency on `futures` for one call site. Spawning is
/// what makes this genuinely concurrent rather than sequential — an
/// `Iterator::map` of `async` blocks polled one at a time would drive each
/// future to completion before starting the next, defeating the "wait for
/// all, run in parallel" shape `PoolManager::stop_all`/`Pool::stop` both
/// need (each worker's or pool's `stop()` can itself take up to its own
/// `shutdown_timeout`).
async fn spawn_and_join_all<F>(futures: impl Iterator<Item = F>)
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "shutdown task panicked");
        }
    }
}

/// Type-erased handle a [`PoolManager`] can hold regardless of a pool's
/// concrete `S`/`M`/`H` parameters.
#[async_trait]
pub trait PoolHandle: Send + Sync {
    fn worker_type(&self) -> &str;
    fn start(&self);
    async fn stop(&self);
    fn stats(&self) -> PoolStats;
}

#[async_trait]
impl<S, M, H> PoolHandle for Pool<S, M, H>
where
    S: Store + 'static,
    M: Message,
    H: Handler<M> + 'static,
{
    fn worker_type(&self) -> &str {
        self.worker_type()
    }

    fn start(&self) {
        Pool::start(self);
    }

    async fn stop(&self) {
        Pool::stop(self).await;
    }

    fn stats(&self) -> PoolStats {
        Pool::stats(self)
    }
}

/// Registry of pools keyed by worker-type tag, matching
/// `empath-delivery`'s per-domain `DashMap<Domain, Arc<Mutex<...>>>`
/// registries (`circuit_breaker.rs`, `rate_limiter.rs`) generalized from
/// "per domain, one breaker/limiter" to "per worker-type, one pool".
#[derive(Default)]
pub struct PoolManager {
    pools: DashMap<String, Arc<dyn PoolHandle>>,
}

impl PoolManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pools: DashMap::new(),
        }
    }

    pub fn register_pool(&self, pool: Arc<dyn PoolHandle>) {
        self.pools.insert(pool.worker_type().to_string(), pool);
    }

    pub fn start_all(&self) {
        for pool in self.pools.iter() {
            pool.start();
        }
    }

    pub async fn stop_all(&self) {
        let pools: Vec<_> = self.pools.iter().map(|entry| Arc::clone(entry.value())).collect();
        let stops = pools.into_iter().map(|p| async move { p.stop().await });
        spawn_and_join_all(stops).await;
    }

    #[must_use]
    pub fn all_stats(&self) -> Vec<(String, PoolStats)> {
        self.pools
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stats()))
            .collect()
    }

    #[must_use]
    pub fn get_pool(&self, worker_type: &str) -> Option<Arc<dyn PoolHandle>> {
        self.pools.get(worker_type).map(|entry| Arc::clone(entry.value()))
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pool_count", &self.pools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobq_common::DecodeError;
    use jobq_queue::QueueConfig;
    use jobq_store::MemoryStore;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Echo;

    impl Message for Echo {
        fn message_type(&self) -> &str {
            "echo"
        }
        fn priority(&self) -> u32 {
            0
        }
        fn to_bytes(&self) -> Vec<u8> {
            Vec::new()
        }
        fn from_bytes(_message_type: &str, _bytes: &[u8]) -> Result<Self, DecodeError> {
            Ok(Self)
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl Handler<Echo> for AlwaysOk {
        async fn handle(&self, _cancellation: tokio_util::sync::CancellationToken, _message: Echo) -> Result<(), jobq_common::ProcessingError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn pool_start_processes_enqueued_messages_then_stops_cleanly() {
        let queue = PriorityQueue::new(Arc::new(MemoryStore::new()), QueueConfig::new("pool-test"));
        for _ in 0..5 {
            queue.enqueue(&Echo).await.unwrap();
        }

        let mut config = PoolConfig::new("ingest");
        config.count = 2;
        config.worker.poll_interval = Duration::from_millis(20);
        let pool = Pool::new(queue.clone(), Arc::new(AlwaysOk), config);

        pool.start();
        tokio::time::sleep(Duration::from_millis(300)).await;
        pool.stop().await;

        let stats = pool.stats();
        assert_eq!(stats.processed, 5);
        assert_eq!(stats.failed, 0);
        assert_eq!(queue.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pool_manager_registers_and_aggregates_stats() {
        let queue = PriorityQueue::new(Arc::new(MemoryStore::new()), QueueConfig::new("manager-test"));
        let mut config = PoolConfig::new("enrichment");
        config.count = 1;
        let pool: Arc<dyn PoolHandle> = Arc::new(Pool::new(queue, Arc::new(AlwaysOk), config));

        let manager = PoolManager::new();
        manager.register_pool(Arc::clone(&pool));
        assert!(manager.get_pool("enrichment").is_some());

        let stats = manager.all_stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].0, "enrichment");

        manager.stop_all().await;
    }
}
