//! Convenience driver for `RecoverStaleMessages` (C7).
//!
//! The queue exposes `recover_stale_messages` as a plain method to be
//! called by a separate loop, so the queue has no hidden background task.
//! `StaleSweeper` is that loop: a thin `tokio::time::interval` wrapper
//! driven by a `tokio::select!` against a shared cancellation token, run
//! once per registered queue each tick.

use std::sync::Arc;
use std::time::Duration;

use jobq_common::message::Message;
use jobq_store::Store;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::PriorityQueue;

/// Periodically sweeps a set of queues for expired in-flight envelopes.
///
/// Recommended cadence: `min(visibility_timeout / 4, 30 s)`. This sweeper
/// does not compute that for you — pass whatever `interval` fits the
/// shortest `visibility_timeout` among the queues it watches.
pub struct StaleSweeper<S: Store, M: Message> {
    queues: Vec<PriorityQueue<S, M>>,
    interval: Duration,
}

impl<S: Store + 'static, M: Message> StaleSweeper<S, M> {
    #[must_use]
    pub fn new(queues: Vec<PriorityQueue<S, M>>, interval: Duration) -> Self {
        Self { queues, interval }
    }

    /// Run until `cancellation` fires, sweeping every watched queue once
    /// per tick. A single queue's sweep failure is logged and does not
    /// interrupt the others — the sweeper is re-entrant by construction,
    /// each reclaim is its own pipelined operation.
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
                () = cancellation.cancelled() => {
                    info!("stale sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Sweep every watched queue a single time. Exposed directly for
    /// callers that want to drive the cadence themselves rather than use
    /// `run`.
    pub async fn sweep_once(&self) {
        for queue in &self.queues {
            match queue.recover_stale_messages().await {
                Ok(count) if count > 0 => {
                    info!(queue = queue.name(), recovered = count, "swept stale in-flight envelopes");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(queue = queue.name(), error = %e, "stale sweep failed");
                }
            }
        }
    }
}

impl<S: Store, M: Message> std::fmt::Debug for StaleSweeper<S, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleSweeper")
            .field("queue_count", &self.queues.len())
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobq_common::DecodeError;
    use jobq_store::MemoryStore;

    use crate::config::QueueConfig;

    #[derive(Debug, Clone)]
    struct Noop;

    impl Message for Noop {
        fn message_type(&self) -> &str {
            "noop"
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

    #[tokio::test]
    async fn sweep_once_recovers_expired_entries() {
        let store = Arc::new(MemoryStore::new());
        let queue = PriorityQueue::<MemoryStore, Noop>::new(
            store,
            QueueConfig::new("swept").with_visibility_timeout(Duration::from_millis(5)),
        );
        queue.enqueue(&Noop).await.unwrap();
        queue.dequeue(1, Duration::from_millis(200)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let sweeper = StaleSweeper::new(vec![queue.clone()], Duration::from_millis(10));
        sweeper.sweep_once().await;

        assert_eq!(queue.depth().await.unwrap(), 1);
    }
}
