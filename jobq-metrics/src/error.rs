//! Errors raised while initializing the metrics system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("metrics system already initialized")]
    AlreadyInitialized,

    #[error("OpenTelemetry error: {0}")]
    OpenTelemetry(String),
}
