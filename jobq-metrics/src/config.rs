//! Metrics configuration.

use serde::Deserialize;

/// Configuration for metrics collection and export.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// When disabled, `init_metrics` is a no-op and `is_enabled()` stays false.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// OTLP/HTTP endpoint metrics are pushed to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

const fn default_enabled() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/metrics".to_string()
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            endpoint: default_endpoint(),
        }
    }
}
