//! Queue configuration (`spec.md` §3, fixed at construction).

use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_visibility_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_retention_period() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

const fn default_max_retries() -> u32 {
    5
}

/// Fixed, per-queue-instance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Identifies the ready index, the in-flight index, the DLQ index, and
    /// the payload key namespace.
    pub name: String,

    /// TTL applied to every payload write.
    #[serde(default = "default_retention_period", with = "humantime_duration")]
    pub retention_period: Duration,

    /// How long an in-flight envelope is hidden from other workers.
    #[serde(default = "default_visibility_timeout", with = "humantime_duration")]
    pub visibility_timeout: Duration,

    /// Envelopes with `retry_count >= max_retries` at failure time go to
    /// the dead-letter queue.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl QueueConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            retention_period: default_retention_period(),
            visibility_timeout: default_visibility_timeout(),
            max_retries: default_max_retries(),
        }
    }

    #[must_use]
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retention_period(mut self, period: Duration) -> Self {
        self.retention_period = period;
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub(crate) fn ready_key(&self) -> String {
        format!("queue:{}", self.name)
    }

    pub(crate) fn in_flight_key(&self) -> String {
        format!("processing:{}", self.name)
    }

    pub(crate) fn dlq_key(&self) -> String {
        format!("dlq:{}", self.name)
    }

    pub(crate) fn payload_key(&self, id: &crate::envelope::EnvelopeId) -> String {
        format!("msg:{}:{id}", self.name)
    }
}

/// `serde_with`-style (de)serialization of `Duration` as a humantime-like
/// string, so configuration files can write `"60s"` instead of a
/// nanosecond-count struct. Kept minimal: only the whole-seconds form is
/// supported, which is all queue/pool tuning ever needs.
mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        format!("{}s", duration.as_secs()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let secs = raw
            .trim_end_matches('s')
            .parse::<u64>()
            .map_err(serde::de::Error::custom)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_illustrative_values() {
        let config = QueueConfig::new("ingest");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.visibility_timeout, Duration::from_secs(60));
    }

    #[test]
    fn key_namespaces_are_derived_from_name() {
        let config = QueueConfig::new("ingest");
        assert_eq!(config.ready_key(), "queue:ingest");
        assert_eq!(config.in_flight_key(), "processing:ingest");
        assert_eq!(config.dlq_key(), "dlq:ingest");
    }
}
