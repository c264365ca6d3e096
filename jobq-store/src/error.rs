//! Errors raised by a [`crate::Store`] implementation.

use thiserror::Error;

/// Store-level error (C3). Separate from the handler-facing
/// `jobq_common::ProcessingError` — a store error is surfaced to the queue
/// caller with context, never auto-retried inside the store itself.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend connection or transport failed.
    #[error("store connection error: {0}")]
    Connection(String),

    /// A pipelined batch of operations could not be executed atomically.
    #[error("pipeline execution failed: {0}")]
    Pipeline(String),

    /// The backend rejected a value it cannot represent (e.g. a score
    /// outside `f64`'s safe integer range on a backend using IEEE-754
    /// doubles for ordered-set scores).
    #[error("unsupported value: {0}")]
    Unsupported(String),

    /// Catch-all for backend-reported errors that don't fit the above.
    #[error("store error: {0}")]
    Backend(String),
}
