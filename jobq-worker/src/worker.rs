//! A single worker: polls one queue, invokes a handler, routes the outcome
//! to Ack/Nack/DLQ (C5).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobq_common::message::Message;
use jobq_queue::{PriorityQueue, QueueError};
use jobq_store::Store;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::handler::Handler;

/// Safety margin subtracted from `visibility_timeout` to get the per-
/// handler context timeout, so Ack/Nack always completes before the
/// visibility deadline (`spec.md` §4.5/§6).
pub const HANDLER_TIMEOUT_SAFETY_MARGIN: Duration = Duration::from_secs(10);

/// Interval the empty-queue poll sleeps, also used as the `Dequeue` wait
/// argument each iteration.
fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_batch_size() -> usize {
    1
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Cadence `Worker::stop`'s shutdown wait polls the processing flag at.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-worker tuning (`spec.md` §3 "Worker-pool configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_interval", with = "crate::duration_secs")]
    pub poll_interval: Duration,
    #[serde(default = "default_shutdown_timeout", with = "crate::duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval: default_poll_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Observable worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Starting,
    Healthy,
    Unhealthy,
    Draining,
    Stopped,
}

impl WorkerStatus {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Healthy => 1,
            Self::Unhealthy => 2,
            Self::Draining => 3,
            Self::Stopped => 4,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Healthy,
            2 => Self::Unhealthy,
            3 => Self::Draining,
            4 => Self::Stopped,
            _ => Self::Starting,
        }
    }
}

/// Polls one queue, invokes a handler with a per-message context, routes
/// the result to Ack/Nack/DLQ, and exposes atomic counters.
///
/// Single-threaded with respect to its own envelopes: at most one handler
/// is in flight per worker, which is what lets it rely on
/// `visibility_timeout` as the maximum time it owns an in-flight envelope.
pub struct Worker<S: Store, M: Message, H: Handler<M>> {
    id: String,
    queue: PriorityQueue<S, M>,
    handler: Arc<H>,
    config: WorkerConfig,
    status: Arc<AtomicU8>,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    /// Set while a handler invocation is in flight, so `stop` knows when
    /// it's safe to stop waiting.
    processing: Arc<AtomicBool>,
    cancellation: CancellationToken,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<S, M, H> Worker<S, M, H>
where
    S: Store + 'static,
    M: Message,
    H: Handler<M> + 'static,
{
    #[must_use]
    pub fn new(id: impl Into<String>, queue: PriorityQueue<S, M>, handler: Arc<H>, config: WorkerConfig) -> Self {
        let cancellation = queue.child_token();
        Self {
            id: id.into(),
            queue,
            handler,
            config,
            status: Arc::new(AtomicU8::new(WorkerStatus::Starting.to_u8())),
            processed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            processing: Arc::new(AtomicBool::new(false)),
            cancellation,
            join_handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    fn set_status(&self, status: WorkerStatus) {
        self.status.store(status.to_u8(), Ordering::SeqCst);
    }

    /// Transition to `healthy` and spawn the cooperative `process_loop`.
    pub fn start(self: &Arc<Self>) {
        self.set_status(WorkerStatus::Healthy);
        let worker = Arc::clone(self);
        let handle = tokio::spawn(async move { worker.process_loop().await });
        *self.join_handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);
    }

    /// Signal cancellation, then wait up to `shutdown_timeout` for any
    /// in-flight handler to finish via a bounded polling loop on the
    /// `processing` flag, and mark `stopped` regardless (forced if the
    /// deadline is exceeded). Cancel-first-then-join, per `spec.md`'s
    /// shutdown-ordering design note — reclaim correctness then rests on
    /// the stale sweeper, not on a clean exit.
    pub async fn stop(&self) {
        self.set_status(WorkerStatus::Draining);
        self.cancellation.cancel();

        let start = tokio::time::Instant::now();
        while self.processing.load(Ordering::SeqCst) {
            if start.elapsed() >= self.config.shutdown_timeout {
                warn!(worker_id = %self.id, "shutdown timeout exceeded, in-flight envelope will be reclaimed by the stale sweeper");
                break;
            }
            debug!(worker_id = %self.id, elapsed_secs = start.elapsed().as_secs_f64(), "waiting for in-flight envelope to complete");
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }

        let handle = self
            .join_handle
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(worker_id = %self.id, error = %e, "worker task panicked");
            }
        }

        self.set_status(WorkerStatus::Stopped);
    }

    async fn process_loop(&self) {
        while !self.cancellation.is_cancelled() {
            let envelopes = match self.queue.dequeue(self.config.batch_size, self.config.poll_interval).await {
                Ok(envelopes) => envelopes,
                Err(QueueError::Cancelled) => break,
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "dequeue failed, backing off");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = self.cancellation.cancelled() => break,
                    }
                    continue;
                }
            };

            for envelope in envelopes {
                self.process_one(envelope).await;
            }
        }
    }

    async fn process_one(&self, envelope: jobq_queue::Envelope) {
        let id = envelope.id;
        let message = match M::from_bytes(&envelope.message_type, &envelope.payload_bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!(worker_id = %self.id, envelope_id = %id, error = %e, "parse failure, moving to dead letter");
                if let Err(e) = self.queue.move_to_dead_letter(id, format!("parse error: {e}")).await {
                    error!(worker_id = %self.id, envelope_id = %id, error = %e, "failed to move unparseable envelope to dead letter");
                }
                self.failed.fetch_add(1, Ordering::SeqCst);
                return;
            }
        };

        let handler_timeout = self
            .queue
            .config()
            .visibility_timeout
            .saturating_sub(HANDLER_TIMEOUT_SAFETY_MARGIN);
        let handler_token = self.cancellation.child_token();
        self.processing.store(true, Ordering::SeqCst);
        let outcome = tokio::select! {
            result = self.handler.handle(handler_token.clone(), message) => Outcome::Completed(result),
            () = tokio::time::sleep(handler_timeout) => Outcome::TimedOut,
            () = handler_token.cancelled() => Outcome::Cancelled,
        };
        self.processing.store(false, Ordering::SeqCst);

        match outcome {
            Outcome::Completed(Ok(())) => {
                if let Err(e) = self.queue.ack(id).await {
                    error!(worker_id = %self.id, envelope_id = %id, error = %e, "ack failed");
                }
                self.processed.fetch_add(1, Ordering::SeqCst);
                if let Some(metrics) = jobq_metrics::try_metrics() {
                    metrics.worker.record_processed(&self.id);
                }
            }
            Outcome::Completed(Err(err)) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                if let Some(metrics) = jobq_metrics::try_metrics() {
                    metrics.worker.record_failed(&self.id);
                }
                if err.is_retryable() {
                    if let Err(e) = self.queue.nack(id).await {
                        error!(worker_id = %self.id, envelope_id = %id, error = %e, "nack failed");
                    }
                } else if let Err(e) = self.queue.move_to_dead_letter(id, err.to_string()).await {
                    error!(worker_id = %self.id, envelope_id = %id, error = %e, "dead-letter move failed");
                }
            }
            Outcome::TimedOut | Outcome::Cancelled => {
                // Treated as an unknown/transient failure: the handler
                // neither succeeded nor raised a classified error, so
                // requeue with backoff rather than DLQ it outright.
                self.failed.fetch_add(1, Ordering::SeqCst);
                if let Some(metrics) = jobq_metrics::try_metrics() {
                    metrics.worker.record_failed(&self.id);
                    metrics.worker.record_timed_out(&self.id);
                }
                if let Err(e) = self.queue.nack(id).await {
                    error!(worker_id = %self.id, envelope_id = %id, error = %e, "nack after timeout/cancel failed");
                }
            }
        }
    }
}

enum Outcome<T> {
    Completed(Result<(), T>),
    TimedOut,
    Cancelled,
}

impl<S, M, H> std::fmt::Debug for Worker<S, M, H>
where
    S: Store,
    M: Message,
    H: Handler<M>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("processed", &self.processed())
            .field("failed", &self.failed())
            .finish()
    }
}
