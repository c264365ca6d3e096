//! Envelope and envelope identifier (C2/C4).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned to an envelope at enqueue time.
///
/// A ULID, matching `empath_spool::SpooledMessageId`'s ULID-wrapper shape:
/// lexicographically sortable by creation time, which is a useful
/// secondary property even though dequeue order is driven entirely by the
/// ready-set score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvelopeId(ulid::Ulid);

impl EnvelopeId {
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new())
    }

    #[must_use]
    pub const fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.0
    }
}

impl std::fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EnvelopeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(Self)
    }
}

impl Serialize for EnvelopeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for EnvelopeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ulid::Ulid::from_string(&s)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

/// What the queue stores per message (`spec.md` §3).
///
/// Envelope state is exactly one of `{ready, in_flight, dead}`; this struct
/// is the record shared by all three — which index it currently lives in is
/// not part of the struct itself, it's the queue's bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: EnvelopeId,
    pub payload_bytes: Vec<u8>,
    pub message_type: String,
    pub priority: u32,
    pub retry_count: u32,
    pub enqueued_at: SystemTime,
    pub visible_after: SystemTime,
}

impl Envelope {
    pub(crate) fn new(id: EnvelopeId, message_type: String, priority: u32, payload_bytes: Vec<u8>) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            payload_bytes,
            message_type,
            priority,
            retry_count: 0,
            enqueued_at: now,
            visible_after: now,
        }
    }

    pub(crate) fn encode(&self) -> Vec<u8> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .expect("Envelope encoding is infallible for in-memory types")
    }

    pub(crate) fn decode(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard()).map(|(v, _)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_ids_are_sortable_by_creation_time() {
        let a = EnvelopeId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = EnvelopeId::generate();
        assert!(a < b);
    }

    #[test]
    fn envelope_id_round_trips_through_display_and_from_str() {
        let id = EnvelopeId::generate();
        let parsed: EnvelopeId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn envelope_round_trips_through_bincode() {
        let env = Envelope::new(EnvelopeId::generate(), "ping".into(), 3, b"hi".to_vec());
        let bytes = env.encode();
        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(env.id, decoded.id);
        assert_eq!(env.message_type, decoded.message_type);
        assert_eq!(env.priority, decoded.priority);
        assert_eq!(env.payload_bytes, decoded.payload_bytes);
    }
}
