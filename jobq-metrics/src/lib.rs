//! OpenTelemetry metrics for the jobq runtime (C8, ambient observability).
//!
//! Exports queue depth, throughput, and worker-pool health via OTLP to an
//! OpenTelemetry Collector.

mod config;
mod error;
mod exporter;
mod queue;
mod worker;

pub use config::MetricsConfig;
pub use error::MetricsError;
pub use queue::QueueMetrics;
pub use worker::WorkerMetrics;

use once_cell::sync::OnceCell;

static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container.
#[derive(Debug)]
pub struct Metrics {
    pub queue: QueueMetrics,
    pub worker: WorkerMetrics,
}

/// Initialize the metrics system. Must be called once at startup before any
/// metrics are recorded. A no-op if `config.enabled` is false.
///
/// # Errors
///
/// Returns an error if the OTLP exporter cannot be built or if called more
/// than once.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("metrics collection is disabled");
        return Ok(());
    }

    tracing::info!(endpoint = %config.endpoint, "initializing OpenTelemetry metrics");

    let provider = exporter::init_otlp_exporter(&config.endpoint)?;
    opentelemetry::global::set_meter_provider(provider);

    let metrics = Metrics {
        queue: QueueMetrics::new()?,
        worker: WorkerMetrics::new()?,
    };

    METRICS_INSTANCE.set(metrics).map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("metrics collection initialized");
    Ok(())
}

/// Get a reference to the global metrics instance.
///
/// # Panics
///
/// Panics if metrics have not been initialized via [`init_metrics`].
#[must_use]
pub fn metrics() -> &'static Metrics {
    METRICS_INSTANCE.get().expect("metrics not initialized. Call init_metrics() first.")
}

#[must_use]
pub fn is_enabled() -> bool {
    METRICS_INSTANCE.get().is_some()
}

/// Get the global metrics instance if it has been initialized, without
/// panicking. This is the call site callers outside this crate should use —
/// `jobq-queue` and `jobq-worker` record through it so metrics stay
/// optional for embedders that never call [`init_metrics`].
#[must_use]
pub fn try_metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}
