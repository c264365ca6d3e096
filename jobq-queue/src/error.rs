//! Errors raised by [`crate::PriorityQueue`] operations.

use thiserror::Error;

use jobq_store::StoreError;

/// Error surfaced by a `PriorityQueue` method.
///
/// Store-level failures are wrapped with queue-specific context via
/// `#[from]` rather than re-thrown bare.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The underlying store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The referenced envelope id has no corresponding payload. For `Ack`
    /// this is not actually surfaced as an error (Ack is idempotent); for
    /// `Nack`/`MoveToDeadLetter` it is.
    #[error("envelope not found: {0}")]
    NotFound(String),

    /// The stored envelope bytes could not be decoded.
    #[error("envelope serialization error: {0}")]
    Serialization(String),

    /// The operation was abandoned because the queue's cancellation token
    /// fired.
    #[error("queue operation cancelled")]
    Cancelled,
}
