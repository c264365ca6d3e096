//! Priority-ordered, FIFO-within-priority queue with in-flight tracking and
//! DLQ (C4) — the core of the system.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use jobq_common::message::Message;
use jobq_common::time::{nanos_to_system_time, now_nanos, ready_score, system_time_to_nanos};
use jobq_store::{Store, StoreOp};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::dlq::DlqRecord;
use crate::envelope::{Envelope, EnvelopeId};
use crate::error::QueueError;

/// How long `dequeue` sleeps between empty `ZPOPMAX` polls.
const EMPTY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cap applied to the stale-sweep `ZRANGEBYSCORE` call per invocation.
const SWEEP_BATCH_LIMIT: usize = 100;

/// Base delay for the Nack backoff formula.
const BACKOFF_BASE_SECS: u64 = 1;

/// Cap for the Nack backoff formula.
const BACKOFF_MAX_SECS: u64 = 300;

/// `min(base * 2^retry_count, 5 min)` with `base = 1 s`. Saturating so a
/// pathologically large `retry_count` can never panic or overflow. No
/// jitter: Nack's retry scheduling is meant to be reproducible.
fn nack_backoff(retry_count: u32) -> Duration {
    let delay = if retry_count >= 63 {
        BACKOFF_MAX_SECS
    } else {
        BACKOFF_BASE_SECS
            .saturating_mul(1u64 << retry_count)
            .min(BACKOFF_MAX_SECS)
    };
    Duration::from_secs(delay)
}

/// Priority queue over a shared [`Store`], generic over the producer's
/// [`Message`] type `M`.
#[derive(Debug)]
pub struct PriorityQueue<S: Store, M: Message> {
    store: Arc<S>,
    config: QueueConfig,
    cancellation: CancellationToken,
    _message: PhantomData<fn() -> M>,
}

impl<S: Store, M: Message> Clone for PriorityQueue<S, M> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            cancellation: self.cancellation.clone(),
            _message: PhantomData,
        }
    }
}

impl<S: Store, M: Message> PriorityQueue<S, M> {
    #[must_use]
    pub fn new(store: Arc<S>, config: QueueConfig) -> Self {
        Self {
            store,
            config,
            cancellation: CancellationToken::new(),
            _message: PhantomData,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// A cancellation token child of this queue's own — workers driven by
    /// this queue should hold a child of this child, so a queue-level
    /// `close()` cancels every worker transitively.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancellation.child_token()
    }

    /// Cancel outstanding operations this queue initiated. Does not wait
    /// for in-flight handlers to finish — draining is `Pool::stop`'s job.
    pub fn close(&self) {
        self.cancellation.cancel();
    }

    pub async fn enqueue(&self, message: &M) -> Result<EnvelopeId, QueueError> {
        let id = EnvelopeId::generate();
        let envelope = Envelope::new(id, message.message_type().to_string(), message.priority(), message.to_bytes());
        self.put_ready(&envelope).await?;
        if let Some(metrics) = jobq_metrics::try_metrics() {
            metrics.queue.record_enqueue(self.name());
        }
        Ok(id)
    }

    /// All-or-nothing: every message in `messages` is enqueued in a single
    /// pipeline, or none are.
    pub async fn enqueue_batch(&self, messages: &[M]) -> Result<Vec<EnvelopeId>, QueueError> {
        let mut ops = Vec::with_capacity(messages.len() * 2);
        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            let id = EnvelopeId::generate();
            let envelope = Envelope::new(id, message.message_type().to_string(), message.priority(), message.to_bytes());
            let score = ready_score(envelope.priority, system_time_to_nanos(envelope.enqueued_at));
            ops.push(StoreOp::Put {
                key: self.config.payload_key(&id),
                bytes: envelope.encode(),
                ttl: self.config.retention_period,
            });
            ops.push(StoreOp::Zadd {
                set: self.config.ready_key(),
                member: id.to_string(),
                score,
            });
            ids.push(id);
        }
        self.store.pipeline(ops).await?;
        if let Some(metrics) = jobq_metrics::try_metrics() {
            for _ in 0..ids.len() {
                metrics.queue.record_enqueue(self.name());
            }
        }
        Ok(ids)
    }

    async fn put_ready(&self, envelope: &Envelope) -> Result<(), QueueError> {
        let score = ready_score(envelope.priority, system_time_to_nanos(envelope.enqueued_at));
        self.store
            .pipeline(vec![
                StoreOp::Put {
                    key: self.config.payload_key(&envelope.id),
                    bytes: envelope.encode(),
                    ttl: self.config.retention_period,
                },
                StoreOp::Zadd {
                    set: self.config.ready_key(),
                    member: envelope.id.to_string(),
                    score,
                },
            ])
            .await?;
        Ok(())
    }

    /// Pop up to `max_messages` envelopes, waiting up to `wait` for them to
    /// become available.
    ///
    /// On a store error mid-batch, the envelopes already moved to
    /// `in_flight` are returned as `Ok` (they must still be Ack/Nack'd by
    /// the caller); only a failure before any success propagates as `Err`
    /// — the Open Question resolution `SPEC_FULL.md` §9 records. The same
    /// partial-vs-propagated split applies to cancellation: if the queue is
    /// closed while envelopes are already accumulated, they are returned as
    /// `Ok` (still in-flight, still the caller's to Ack/Nack); only
    /// cancellation observed before anything was popped propagates as
    /// `Err(QueueError::Cancelled)`, per `spec.md` §4.4 ("propagate the
    /// cancellation cause as the error when applicable").
    pub async fn dequeue(&self, max_messages: usize, wait: Duration) -> Result<Vec<Envelope>, QueueError> {
        let deadline = tokio::time::Instant::now() + wait;
        let mut results = Vec::with_capacity(max_messages);
        let mut cancelled = false;

        while results.len() < max_messages {
            if self.cancellation.is_cancelled() {
                cancelled = true;
                break;
            }

            match self.pop_one().await {
                Ok(Some(envelope)) => results.push(envelope),
                Ok(None) => {
                    if tokio::time::Instant::now() >= deadline {
                        break;
                    }
                    tokio::select! {
                        () = tokio::time::sleep(EMPTY_POLL_INTERVAL) => {}
                        () = self.cancellation.cancelled() => cancelled = true,
                    }
                    if cancelled || tokio::time::Instant::now() >= deadline {
                        break;
                    }
                }
                Err(e) => {
                    if results.is_empty() {
                        return Err(e);
                    }
                    warn!(error = %e, queue = self.name(), "dequeue pipeline failed mid-batch, returning partial batch");
                    break;
                }
            }

            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }

        if cancelled && results.is_empty() {
            return Err(QueueError::Cancelled);
        }

        Ok(results)
    }

    /// Pop a single envelope off `ready` into `in_flight`, or `None` if the
    /// ready set was empty, its popped payload had already expired, or it
    /// was popped ahead of its delayed `visible_after` (put back untouched).
    async fn pop_one(&self) -> Result<Option<Envelope>, QueueError> {
        let Some((member, score)) = self.store.zpopmax(&self.config.ready_key()).await? else {
            return Ok(None);
        };

        let payload_key = format!("msg:{}:{member}", self.config.name);
        let Some(bytes) = self.store.get(&payload_key).await? else {
            // Payload expired while queued; the popped ready-set member is
            // already gone, nothing further to clean up.
            return Ok(None);
        };

        let mut envelope = Envelope::decode(&bytes).map_err(|e| QueueError::Serialization(e.to_string()))?;

        if envelope.visible_after > std::time::SystemTime::now() {
            // Backoff/sweep delay hasn't elapsed yet. The priority-band
            // score encoding only ranks this behind fresher same-priority
            // entries; it doesn't stop `ZPOPMAX` from returning it when
            // nothing fresher is left. Restore it unchanged and let the
            // poll loop retry.
            self.store.zadd(&self.config.ready_key(), &member, score).await?;
            return Ok(None);
        }

        let visible_after = std::time::SystemTime::now() + self.config.visibility_timeout;
        envelope.visible_after = visible_after;

        self.store
            .pipeline(vec![
                StoreOp::Put {
                    key: payload_key,
                    bytes: envelope.encode(),
                    ttl: self.config.retention_period,
                },
                StoreOp::Zadd {
                    set: self.config.in_flight_key(),
                    member: envelope.id.to_string(),
                    score: system_time_to_nanos(visible_after),
                },
            ])
            .await?;

        Ok(Some(envelope))
    }

    /// Acknowledge successful processing. Idempotent: acking an id with no
    /// corresponding payload is not an error.
    pub async fn ack(&self, id: EnvelopeId) -> Result<(), QueueError> {
        self.store
            .pipeline(vec![
                StoreOp::Zrem {
                    set: self.config.in_flight_key(),
                    member: id.to_string(),
                },
                StoreOp::Del {
                    key: self.config.payload_key(&id),
                },
            ])
            .await?;
        if let Some(metrics) = jobq_metrics::try_metrics() {
            metrics.queue.record_ack(self.name());
        }
        Ok(())
    }

    /// Requeue with backoff, or move to the dead-letter queue if
    /// `retry_count` has reached `max_retries`.
    pub async fn nack(&self, id: EnvelopeId) -> Result<(), QueueError> {
        let payload_key = self.config.payload_key(&id);
        let Some(bytes) = self.store.get(&payload_key).await? else {
            return Err(QueueError::NotFound(id.to_string()));
        };
        let mut envelope = Envelope::decode(&bytes).map_err(|e| QueueError::Serialization(e.to_string()))?;
        envelope.retry_count += 1;

        if envelope.retry_count >= self.config.max_retries {
            return self.move_to_dead_letter(id, "max retries exceeded").await;
        }

        let backoff = nack_backoff(envelope.retry_count);
        let visible_after = std::time::SystemTime::now() + backoff;
        envelope.visible_after = visible_after;
        debug!(envelope_id = %id, retry_count = envelope.retry_count, backoff_secs = backoff.as_secs(), "nacking envelope");

        let score = ready_score(envelope.priority, system_time_to_nanos(visible_after));
        self.store
            .pipeline(vec![
                StoreOp::Zrem {
                    set: self.config.in_flight_key(),
                    member: id.to_string(),
                },
                StoreOp::Put {
                    key: payload_key,
                    bytes: envelope.encode(),
                    ttl: self.config.retention_period,
                },
                StoreOp::Zadd {
                    set: self.config.ready_key(),
                    member: id.to_string(),
                    score,
                },
            ])
            .await?;
        if let Some(metrics) = jobq_metrics::try_metrics() {
            metrics.queue.record_nack(self.name());
        }
        Ok(())
    }

    /// Move an envelope directly to the dead-letter queue.
    pub async fn move_to_dead_letter(&self, id: EnvelopeId, reason: impl Into<String>) -> Result<(), QueueError> {
        let payload_key = self.config.payload_key(&id);
        let Some(bytes) = self.store.get(&payload_key).await? else {
            return Err(QueueError::NotFound(id.to_string()));
        };
        let envelope = Envelope::decode(&bytes).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let record = DlqRecord::new(envelope, reason, &self.config.name);
        let moved_at_ns = system_time_to_nanos(record.moved_at);

        self.store
            .pipeline(vec![
                StoreOp::Zrem {
                    set: self.config.in_flight_key(),
                    member: id.to_string(),
                },
                StoreOp::Del { key: payload_key },
                StoreOp::Zadd {
                    set: self.config.dlq_key(),
                    member: id.to_string(),
                    score: moved_at_ns,
                },
                StoreOp::Put {
                    key: format!("dlq-record:{}:{id}", self.config.name),
                    bytes: record.encode(),
                    ttl: Duration::ZERO,
                },
            ])
            .await?;
        if let Some(metrics) = jobq_metrics::try_metrics() {
            metrics.queue.record_dead_letter(self.name());
        }
        Ok(())
    }

    pub async fn depth(&self) -> Result<u64, QueueError> {
        let depth = self.store.zcard(&self.config.ready_key()).await?;
        if let Some(metrics) = jobq_metrics::try_metrics() {
            metrics.queue.set_ready_depth(depth);
        }
        Ok(depth)
    }

    /// Sweep `in_flight` for envelopes whose visibility has expired,
    /// returning them to `ready` (or the DLQ if out of retries). Invoked by
    /// an external driver — see [`crate::sweeper::StaleSweeper`] — not
    /// spawned by the queue itself (C7).
    pub async fn recover_stale_messages(&self) -> Result<usize, QueueError> {
        let now_ns = now_nanos();
        let expired = self
            .store
            .zrangebyscore(&self.config.in_flight_key(), i128::MIN, now_ns, SWEEP_BATCH_LIMIT)
            .await?;

        let mut recovered = 0usize;
        for (member, _score) in expired {
            let Ok(id) = member.parse::<EnvelopeId>() else {
                continue;
            };
            let payload_key = self.config.payload_key(&id);
            let Some(bytes) = self.store.get(&payload_key).await? else {
                // Payload already gone; just drop the stale index entry.
                self.store.zrem(&self.config.in_flight_key(), &member).await?;
                continue;
            };
            let mut envelope = match Envelope::decode(&bytes) {
                Ok(e) => e,
                Err(_) => {
                    self.store.zrem(&self.config.in_flight_key(), &member).await?;
                    continue;
                }
            };
            envelope.retry_count += 1;

            if envelope.retry_count >= self.config.max_retries {
                self.move_to_dead_letter(id, "visibility timeout exceeded").await?;
                recovered += 1;
                continue;
            }

            envelope.visible_after = nanos_to_system_time(now_ns);
            let score = ready_score(envelope.priority, now_ns);
            self.store
                .pipeline(vec![
                    StoreOp::Zrem {
                        set: self.config.in_flight_key(),
                        member: member.clone(),
                    },
                    StoreOp::Put {
                        key: payload_key,
                        bytes: envelope.encode(),
                        ttl: self.config.retention_period,
                    },
                    StoreOp::Zadd {
                        set: self.config.ready_key(),
                        member,
                        score,
                    },
                ])
                .await?;
            recovered += 1;
        }

        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobq_common::DecodeError;
    use jobq_store::MemoryStore;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestMessage {
        kind: &'static str,
        priority: u32,
        body: Vec<u8>,
    }

    impl Message for TestMessage {
        fn message_type(&self) -> &str {
            self.kind
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn to_bytes(&self) -> Vec<u8> {
            self.body.clone()
        }

        fn from_bytes(_message_type: &str, bytes: &[u8]) -> Result<Self, DecodeError> {
            Ok(Self {
                kind: "test",
                priority: 0,
                body: bytes.to_vec(),
            })
        }
    }

    fn queue(name: &str) -> PriorityQueue<MemoryStore, TestMessage> {
        PriorityQueue::new(Arc::new(MemoryStore::new()), QueueConfig::new(name))
    }

    #[tokio::test]
    async fn simple_round_trip() {
        let q = queue("rt");
        let msg = TestMessage { kind: "t", priority: 0, body: b"hi".to_vec() };
        q.enqueue(&msg).await.unwrap();
        assert_eq!(q.depth().await.unwrap(), 1);

        let batch = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(q.depth().await.unwrap(), 0);

        q.ack(batch[0].id).await.unwrap();
        assert_eq!(q.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn priority_ordering() {
        let q = queue("prio");
        let a = TestMessage { kind: "a", priority: 1, body: b"A".to_vec() };
        q.enqueue(&a).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let b = TestMessage { kind: "b", priority: 5, body: b"B".to_vec() };
        q.enqueue(&b).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let c = TestMessage { kind: "c", priority: 5, body: b"C".to_vec() };
        q.enqueue(&c).await.unwrap();

        let batch = q.dequeue(3, Duration::from_millis(200)).await.unwrap();
        let order: Vec<_> = batch.iter().map(|e| e.payload_bytes.clone()).collect();
        assert_eq!(order, vec![b"B".to_vec(), b"C".to_vec(), b"A".to_vec()]);
    }

    #[tokio::test]
    async fn nack_requeues_with_incremented_retry_count() {
        let q = queue("nack");
        let msg = TestMessage { kind: "t", priority: 0, body: b"hi".to_vec() };
        q.enqueue(&msg).await.unwrap();
        let batch = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        let id = batch[0].id;

        q.nack(id).await.unwrap();
        assert_eq!(q.depth().await.unwrap(), 1);

        let batch = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(batch[0].retry_count, 1);
    }

    #[tokio::test]
    async fn nack_backoff_postpones_redelivery_even_when_its_the_only_ready_entry() {
        let q = queue("nack-delay");
        let msg = TestMessage { kind: "t", priority: 0, body: b"hi".to_vec() };
        q.enqueue(&msg).await.unwrap();
        let batch = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        let id = batch[0].id;

        // nack_backoff(1) == 2s; the envelope is the only ready entry, so
        // without a `visible_after` gate `ZPOPMAX` would hand it straight
        // back out despite the delay.
        q.nack(id).await.unwrap();
        let too_soon = q.dequeue(1, Duration::from_millis(100)).await.unwrap();
        assert!(too_soon.is_empty(), "backoff-delayed envelope was redelivered before its delay elapsed");

        tokio::time::sleep(Duration::from_millis(2100)).await;
        let batch2 = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(batch2.len(), 1);
        assert_eq!(batch2[0].retry_count, 1);
    }

    #[tokio::test]
    async fn nack_past_max_retries_moves_to_dead_letter() {
        let q = PriorityQueue::new(
            Arc::new(MemoryStore::new()),
            QueueConfig::new("dlq").with_max_retries(1),
        );
        let msg = TestMessage { kind: "t", priority: 0, body: b"hi".to_vec() };
        q.enqueue(&msg).await.unwrap();
        let batch = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        let id = batch[0].id;

        q.nack(id).await.unwrap();

        assert_eq!(q.depth().await.unwrap(), 0);
        let dlq_depth = q.store.zcard(&q.config.dlq_key()).await.unwrap();
        assert_eq!(dlq_depth, 1);
    }

    #[tokio::test]
    async fn ack_is_idempotent() {
        let q = queue("idem");
        let msg = TestMessage { kind: "t", priority: 0, body: b"hi".to_vec() };
        q.enqueue(&msg).await.unwrap();
        let batch = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        let id = batch[0].id;

        q.ack(id).await.unwrap();
        q.ack(id).await.unwrap();
        assert_eq!(q.depth().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dequeue_returns_empty_on_timeout_with_no_messages() {
        let q = queue("empty");
        let batch = q.dequeue(1, Duration::from_millis(50)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn visibility_reclaim_requeues_expired_in_flight_entries() {
        let q = PriorityQueue::new(
            Arc::new(MemoryStore::new()),
            QueueConfig::new("sweep").with_visibility_timeout(Duration::from_millis(10)),
        );
        let msg = TestMessage { kind: "t", priority: 0, body: b"hi".to_vec() };
        q.enqueue(&msg).await.unwrap();
        let batch = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(q.depth().await.unwrap(), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let recovered = q.recover_stale_messages().await.unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(q.depth().await.unwrap(), 1);

        let batch2 = q.dequeue(1, Duration::from_millis(200)).await.unwrap();
        assert_eq!(batch2[0].retry_count, 1);
    }

    #[tokio::test]
    async fn backoff_is_nondecreasing_and_capped() {
        assert_eq!(nack_backoff(0), Duration::from_secs(1));
        assert_eq!(nack_backoff(1), Duration::from_secs(2));
        assert_eq!(nack_backoff(2), Duration::from_secs(4));
        assert_eq!(nack_backoff(100), Duration::from_secs(300));
    }
}
