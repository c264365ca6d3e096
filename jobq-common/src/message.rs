//! The producer-supplied message contract (C2).
//!
//! A message is any value that can describe its own type tag and priority,
//! serialize itself to bytes, and rebuild itself from `(type, bytes)`. The
//! queue never inspects the payload beyond these three accessors — it only
//! stores and orders bytes.

use std::fmt;

/// Implemented by the producer's payload type.
///
/// `from_bytes` doubles as the "registry (or factory)" the distilled
/// specification gestures at: a type that covers several logical message
/// kinds can dispatch on `message_type` from within its own `from_bytes`,
/// so no separate runtime registry is needed.
pub trait Message: Send + Sync + Sized + 'static {
    /// Short stable tag identifying this message's logical kind.
    fn message_type(&self) -> &str;

    /// Non-negative priority; larger means more urgent.
    fn priority(&self) -> u32;

    /// Serialize the payload. Infallible by convention: a `Message`
    /// implementor that can fail to encode itself should panic or encode a
    /// sentinel, since the queue has nothing sensible to do with a failed
    /// enqueue-time encode beyond surfacing it as a bug.
    fn to_bytes(&self) -> Vec<u8>;

    /// Rebuild a message from its type tag and encoded bytes.
    ///
    /// Returning `Err` here is not a handler failure: the caller moves the
    /// envelope directly to the dead-letter queue with reason
    /// `parse error: <detail>`.
    fn from_bytes(message_type: &str, bytes: &[u8]) -> Result<Self, DecodeError>;
}

/// Failure to rebuild a [`Message`] from its stored bytes.
#[derive(Debug)]
pub struct DecodeError {
    detail: String,
}

impl DecodeError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.detail)
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Ping(u32);

    impl Message for Ping {
        fn message_type(&self) -> &str {
            "ping"
        }

        fn priority(&self) -> u32 {
            self.0
        }

        fn to_bytes(&self) -> Vec<u8> {
            self.0.to_le_bytes().to_vec()
        }

        fn from_bytes(message_type: &str, bytes: &[u8]) -> Result<Self, DecodeError> {
            if message_type != "ping" {
                return Err(DecodeError::new(format!("unknown type {message_type}")));
            }
            let arr: [u8; 4] = bytes
                .try_into()
                .map_err(|_| DecodeError::new("expected 4 bytes"))?;
            Ok(Self(u32::from_le_bytes(arr)))
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let msg = Ping(7);
        let bytes = msg.to_bytes();
        let decoded = Ping::from_bytes("ping", &bytes).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn unknown_type_is_a_decode_error_not_a_panic() {
        let err = Ping::from_bytes("pong", &[0, 0, 0, 0]).unwrap_err();
        assert!(err.to_string().starts_with("parse error:"));
    }
}
