//! OTLP metrics exporter.

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

use crate::MetricsError;

/// Build an `SdkMeterProvider` that pushes to `endpoint` over OTLP/HTTP,
/// typically an OpenTelemetry Collector in front of Prometheus.
pub fn init_otlp_exporter(endpoint: &str) -> Result<SdkMeterProvider, MetricsError> {
    tracing::info!(endpoint = %endpoint, "configuring OTLP metrics exporter");

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| {
            tracing::error!(endpoint = %endpoint, error = %e, "failed to build OTLP exporter");
            MetricsError::OpenTelemetry(e.to_string())
        })?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(exporter).build();
    Ok(SdkMeterProvider::builder().with_reader(reader).build())
}
