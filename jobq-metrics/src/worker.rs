//! Worker and pool metrics: processed/failed counters, pool health.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opentelemetry::metrics::{Counter, Meter};
use opentelemetry::KeyValue;

/// Worker-pool metrics collector, one per process.
#[derive(Debug)]
pub struct WorkerMetrics {
    processed_total: Counter<u64>,
    failed_total: Counter<u64>,
    timed_out_total: Counter<u64>,

    healthy_workers: Arc<AtomicU64>,
}

impl WorkerMetrics {
    #[allow(clippy::unnecessary_wraps)]
    pub fn new() -> Result<Self, crate::MetricsError> {
        let meter = meter();

        let processed_total = meter
            .u64_counter("jobq.worker.processed.total")
            .with_description("Total number of messages processed successfully")
            .build();
        let failed_total = meter
            .u64_counter("jobq.worker.failed.total")
            .with_description("Total number of handler invocations that returned an error")
            .build();
        let timed_out_total = meter
            .u64_counter("jobq.worker.timed_out.total")
            .with_description("Total number of handler invocations that exceeded their timeout")
            .build();

        let healthy_workers = Arc::new(AtomicU64::new(0));
        let healthy = healthy_workers.clone();
        meter
            .u64_observable_gauge("jobq.worker.healthy")
            .with_description("Number of currently healthy workers across all pools")
            .with_callback(move |observer| {
                observer.observe(healthy.load(Ordering::Relaxed), &[]);
            })
            .build();

        Ok(Self {
            processed_total,
            failed_total,
            timed_out_total,
            healthy_workers,
        })
    }

    pub fn record_processed(&self, worker_type: &str) {
        self.processed_total.add(1, &[KeyValue::new("worker_type", worker_type.to_string())]);
    }

    pub fn record_failed(&self, worker_type: &str) {
        self.failed_total.add(1, &[KeyValue::new("worker_type", worker_type.to_string())]);
    }

    pub fn record_timed_out(&self, worker_type: &str) {
        self.timed_out_total.add(1, &[KeyValue::new("worker_type", worker_type.to_string())]);
    }

    pub fn set_healthy_workers(&self, count: u64) {
        self.healthy_workers.store(count, Ordering::Relaxed);
    }
}

fn meter() -> Meter {
    opentelemetry::global::meter("jobq.worker")
}
