//! End-to-end tests covering the six concrete scenarios named by the
//! enrichment-pipeline job-queue runtime's testable-properties section.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jobq_common::{DecodeError, Message, ProcessingError};
use jobq_queue::{PriorityQueue, QueueConfig};
use jobq_store::MemoryStore;
use jobq_worker::{Handler, Pool, PoolConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Job {
    label: String,
    priority: u32,
}

impl Message for Job {
    fn message_type(&self) -> &str {
        "job"
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn to_bytes(&self) -> Vec<u8> {
        self.label.clone().into_bytes()
    }

    fn from_bytes(_message_type: &str, bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            label: String::from_utf8_lossy(bytes).into_owned(),
            priority: 0,
        })
    }
}

struct AlwaysSucceeds;

#[async_trait]
impl Handler<Job> for AlwaysSucceeds {
    async fn handle(&self, _cancellation: tokio_util::sync::CancellationToken, _message: Job) -> Result<(), ProcessingError> {
        Ok(())
    }
}

#[tokio::test]
async fn scenario_1_simple_round_trip() {
    let queue = PriorityQueue::new(Arc::new(MemoryStore::new()), QueueConfig::new("rt"));
    queue
        .enqueue(&Job { label: "a".into(), priority: 0 })
        .await
        .unwrap();
    assert_eq!(queue.depth().await.unwrap(), 1);

    let mut config = PoolConfig::new("ingest");
    config.count = 1;
    config.worker.poll_interval = Duration::from_millis(20);
    let pool = Pool::new(queue.clone(), Arc::new(AlwaysSucceeds), config);

    pool.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    pool.stop().await;

    assert_eq!(queue.depth().await.unwrap(), 0);
    let stats = pool.stats();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn scenario_2_priority_ordering() {
    let queue = PriorityQueue::new(Arc::new(MemoryStore::new()), QueueConfig::new("prio"));

    queue.enqueue(&Job { label: "A".into(), priority: 1 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    queue.enqueue(&Job { label: "B".into(), priority: 5 }).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    queue.enqueue(&Job { label: "C".into(), priority: 5 }).await.unwrap();

    let batch = queue.dequeue(3, Duration::from_millis(200)).await.unwrap();
    let labels: Vec<_> = batch
        .iter()
        .map(|e| String::from_utf8_lossy(&e.payload_bytes).into_owned())
        .collect();
    assert_eq!(labels, vec!["B", "C", "A"]);
}

struct FailsOnceThenSucceeds {
    attempts: AtomicUsize,
    attempt_times: std::sync::Mutex<Vec<std::time::Instant>>,
}

#[async_trait]
impl Handler<Job> for FailsOnceThenSucceeds {
    async fn handle(&self, _cancellation: tokio_util::sync::CancellationToken, _message: Job) -> Result<(), ProcessingError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().unwrap().push(std::time::Instant::now());
        if attempt < 1 {
            Err(ProcessingError::transient("TIMEOUT", "simulated timeout"))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn scenario_3_retry_then_succeed() {
    let queue = PriorityQueue::new(
        Arc::new(MemoryStore::new()),
        QueueConfig::new("retry").with_max_retries(5),
    );
    queue.enqueue(&Job { label: "m".into(), priority: 0 }).await.unwrap();

    // First attempt fails transiently; the 1s-then-capped backoff means the
    // retry becomes ready again after `nack_backoff(1) == 2s`.
    let handler = Arc::new(FailsOnceThenSucceeds {
        attempts: AtomicUsize::new(0),
        attempt_times: std::sync::Mutex::new(Vec::new()),
    });
    let mut config = PoolConfig::new("enrichment");
    config.count = 1;
    config.worker.poll_interval = Duration::from_millis(20);
    let pool = Pool::new(queue.clone(), handler.clone(), config);

    pool.start();
    tokio::time::sleep(Duration::from_secs(3)).await;
    pool.stop().await;

    assert_eq!(queue.depth().await.unwrap(), 0);
    let stats = pool.stats();
    assert_eq!(stats.processed, 1);

    // The backoff must actually delay redelivery, not just count retries:
    // the second attempt should land roughly `nack_backoff(1) == 2s` after
    // the first, well clear of the 20ms poll interval.
    let times = handler.attempt_times.lock().unwrap();
    assert_eq!(times.len(), 2);
    let gap = times[1].duration_since(times[0]);
    assert!(gap >= Duration::from_millis(1800), "redelivery gap {gap:?} too short for a 2s backoff");
    assert!(gap < Duration::from_millis(2800), "redelivery gap {gap:?} too long, backoff over-delayed");
}

struct AlwaysPermanentlyFails;

#[async_trait]
impl Handler<Job> for AlwaysPermanentlyFails {
    async fn handle(&self, _cancellation: tokio_util::sync::CancellationToken, _message: Job) -> Result<(), ProcessingError> {
        Err(ProcessingError::permanent("INVALID_INPUT", "bad payload"))
    }
}

#[tokio::test]
async fn scenario_4_permanent_failure_goes_straight_to_dead_letter() {
    let store = Arc::new(MemoryStore::new());
    let queue = PriorityQueue::new(store.clone(), QueueConfig::new("permfail"));
    queue.enqueue(&Job { label: "m".into(), priority: 0 }).await.unwrap();

    let mut config = PoolConfig::new("ai");
    config.count = 1;
    config.worker.poll_interval = Duration::from_millis(20);
    let pool = Pool::new(queue.clone(), Arc::new(AlwaysPermanentlyFails), config);

    pool.start();
    tokio::time::sleep(Duration::from_millis(200)).await;
    pool.stop().await;

    let stats = pool.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.processed, 0);
    assert_eq!(
        jobq_store::Store::zcard(store.as_ref(), "dlq:permfail").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn scenario_5_visibility_reclaim() {
    let queue = PriorityQueue::new(
        Arc::new(MemoryStore::new()),
        QueueConfig::new("reclaim").with_visibility_timeout(Duration::from_millis(50)),
    );
    queue.enqueue(&Job { label: "m".into(), priority: 0 }).await.unwrap();

    let first = queue.dequeue(1, Duration::from_millis(200)).await.unwrap();
    assert_eq!(first.len(), 1);
    let original_id = first[0].id;

    tokio::time::sleep(Duration::from_millis(100)).await;
    let recovered = queue.recover_stale_messages().await.unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(queue.depth().await.unwrap(), 1);

    let second = queue.dequeue(1, Duration::from_millis(200)).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, original_id, "recovery preserves the envelope's identity");
    assert!(second[0].retry_count >= 1);

    queue.ack(second[0].id).await.unwrap();
    assert_eq!(queue.depth().await.unwrap(), 0);
}

struct SlowHandler;

#[async_trait]
impl Handler<Job> for SlowHandler {
    async fn handle(&self, _cancellation: tokio_util::sync::CancellationToken, _message: Job) -> Result<(), ProcessingError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(())
    }
}

#[tokio::test]
async fn scenario_6_shutdown_under_load() {
    let store = Arc::new(MemoryStore::new());
    let queue = PriorityQueue::new(
        store.clone(),
        QueueConfig::new("shutdown").with_visibility_timeout(Duration::from_secs(30)),
    );
    for i in 0..100 {
        queue
            .enqueue(&Job { label: format!("m{i}"), priority: 0 })
            .await
            .unwrap();
    }

    let mut config = PoolConfig::new("ingest");
    config.count = 4;
    config.worker.batch_size = 1;
    config.worker.poll_interval = Duration::from_millis(50);
    config.worker.shutdown_timeout = Duration::from_secs(2);
    let pool = Pool::new(queue.clone(), Arc::new(SlowHandler), config);

    pool.start();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = std::time::Instant::now();
    pool.stop().await;
    assert!(start.elapsed() <= Duration::from_secs(3));

    let stats = pool.stats();
    let ready = queue.depth().await.unwrap();
    let in_flight = jobq_store::Store::zcard(store.as_ref(), "processing:shutdown").await.unwrap();

    // Every enqueued message is accounted for: either processed, or still
    // sitting in `ready` waiting for a worker that never got to it before
    // the shutdown deadline. `stop()` joins each worker's task, so any
    // handler that was mid-flight when cancellation fired still runs to
    // completion (and is acked) before this point — nothing is left
    // checked out in `in_flight`.
    assert_eq!(stats.processed + ready + in_flight, 100);
    assert_eq!(in_flight, 0);
    assert!(stats.processed > 0, "some messages should complete before the shutdown deadline");
    assert!(ready > 0, "not every message should be processed before stop() is called");
}
