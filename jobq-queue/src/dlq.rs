//! Dead-letter queue record format.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// One entry in a queue's dead-letter index: a terminally failed envelope
/// plus the reason it died, for operator inspection. The core never
/// expires DLQ entries; retention is the operator's responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    pub envelope: Envelope,
    pub reason: String,
    pub moved_at: SystemTime,
    pub queue_name: String,
}

impl DlqRecord {
    pub(crate) fn new(envelope: Envelope, reason: impl Into<String>, queue_name: &str) -> Self {
        Self {
            envelope,
            reason: reason.into(),
            moved_at: SystemTime::now(),
            queue_name: queue_name.to_string(),
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .expect("DlqRecord encoding is infallible for in-memory types")
    }

    #[must_use]
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map(|(v, _)| v)
    }
}
