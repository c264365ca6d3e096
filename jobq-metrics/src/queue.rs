//! Queue metrics: depth, in-flight count, dead-letter rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

/// Per-queue-name metrics collector.
///
/// Depth/in-flight/dead-letter counts are maintained as fast atomics on the
/// hot path and mirrored into observable gauges via a callback, the same
/// split `DeliveryMetrics` uses for its queue-size instruments.
#[derive(Debug)]
pub struct QueueMetrics {
    enqueued_total: Counter<u64>,
    acked_total: Counter<u64>,
    nacked_total: Counter<u64>,
    dead_lettered_total: Counter<u64>,

    ready_depth: Arc<AtomicU64>,
    in_flight_depth: Arc<AtomicU64>,
    dead_letter_depth: Arc<AtomicU64>,
}

impl QueueMetrics {
    /// # Errors
    ///
    /// Never currently fails; returns `Result` to match the shape of other
    /// instrument constructors and leave room for fallible instrument setup.
    #[allow(clippy::unnecessary_wraps)]
    pub fn new() -> Result<Self, crate::MetricsError> {
        let meter = meter();

        let enqueued_total = meter
            .u64_counter("jobq.queue.enqueued.total")
            .with_description("Total number of messages enqueued")
            .build();
        let acked_total = meter
            .u64_counter("jobq.queue.acked.total")
            .with_description("Total number of messages acknowledged")
            .build();
        let nacked_total = meter
            .u64_counter("jobq.queue.nacked.total")
            .with_description("Total number of messages nacked and requeued")
            .build();
        let dead_lettered_total = meter
            .u64_counter("jobq.queue.dead_lettered.total")
            .with_description("Total number of messages moved to the dead-letter queue")
            .build();

        let ready_depth = Arc::new(AtomicU64::new(0));
        let in_flight_depth = Arc::new(AtomicU64::new(0));
        let dead_letter_depth = Arc::new(AtomicU64::new(0));

        let ready = ready_depth.clone();
        let in_flight = in_flight_depth.clone();
        let dlq = dead_letter_depth.clone();
        meter
            .u64_observable_gauge("jobq.queue.depth")
            .with_description("Current queue depth by state")
            .with_callback(move |observer| {
                observer.observe(ready.load(Ordering::Relaxed), &[KeyValue::new("state", "ready")]);
                observer.observe(in_flight.load(Ordering::Relaxed), &[KeyValue::new("state", "in_flight")]);
                observer.observe(dlq.load(Ordering::Relaxed), &[KeyValue::new("state", "dead_letter")]);
            })
            .build();

        Ok(Self {
            enqueued_total,
            acked_total,
            nacked_total,
            dead_lettered_total,
            ready_depth,
            in_flight_depth,
            dead_letter_depth,
        })
    }

    pub fn record_enqueue(&self, queue_name: &str) {
        self.enqueued_total.add(1, &[KeyValue::new("queue", queue_name.to_string())]);
    }

    pub fn record_ack(&self, queue_name: &str) {
        self.acked_total.add(1, &[KeyValue::new("queue", queue_name.to_string())]);
    }

    pub fn record_nack(&self, queue_name: &str) {
        self.nacked_total.add(1, &[KeyValue::new("queue", queue_name.to_string())]);
    }

    pub fn record_dead_letter(&self, queue_name: &str) {
        self.dead_lettered_total.add(1, &[KeyValue::new("queue", queue_name.to_string())]);
    }

    pub fn set_ready_depth(&self, depth: u64) {
        self.ready_depth.store(depth, Ordering::Relaxed);
    }

    pub fn set_in_flight_depth(&self, depth: u64) {
        self.in_flight_depth.store(depth, Ordering::Relaxed);
    }

    pub fn set_dead_letter_depth(&self, depth: u64) {
        self.dead_letter_depth.store(depth, Ordering::Relaxed);
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("jobq.queue")
}
