//! Handler-facing error taxonomy.
//!
//! This provides the categorization a worker needs to decide whether a failed
//! handler invocation should be retried, routed straight to the dead-letter
//! queue, or treated as unknown (and retried anyway).

use std::borrow::Cow;

use thiserror::Error;

/// Error produced by a [`Handler`](crate::Handler) implementation.
///
/// Each variant carries a short stable `code` (e.g. `TIMEOUT`,
/// `RATE_LIMITED`, `INVALID_INPUT`), a human-readable `message`, and an
/// optional wrapped cause, modeled on `empath-delivery::error::DeliveryError`'s
/// Permanent/Temporary/System split.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Temporary failure: timeout, overload, throttle. Safe to retry.
    #[error("transient [{code}]: {message}")]
    Transient {
        code: Cow<'static, str>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// A downstream dependency is unavailable. Safe to retry.
    #[error("dependency [{code}]: {message}")]
    Dependency {
        code: Cow<'static, str>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// The request itself is invalid; no retry can help.
    #[error("permanent [{code}]: {message}")]
    Permanent {
        code: Cow<'static, str>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
    /// Some sub-tasks succeeded and some failed; caller handles the
    /// residual. Not retried by the worker.
    #[error("partial [{code}]: {message}")]
    Partial {
        code: Cow<'static, str>,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ProcessingError {
    /// Build a [`ProcessingError::Transient`] with no wrapped cause.
    pub fn transient(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::Transient { code: code.into(), message: message.into(), source: None }
    }

    /// Build a [`ProcessingError::Dependency`] with no wrapped cause.
    pub fn dependency(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::Dependency { code: code.into(), message: message.into(), source: None }
    }

    /// Build a [`ProcessingError::Permanent`] with no wrapped cause.
    pub fn permanent(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::Permanent { code: code.into(), message: message.into(), source: None }
    }

    /// Build a [`ProcessingError::Partial`] with no wrapped cause.
    pub fn partial(code: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::Partial { code: code.into(), message: message.into(), source: None }
    }

    /// Attach a wrapped cause to this error.
    #[must_use]
    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        let slot = match &mut self {
            Self::Transient { source, .. }
            | Self::Dependency { source, .. }
            | Self::Permanent { source, .. }
            | Self::Partial { source, .. } => source,
        };
        *slot = Some(source.into());
        self
    }

    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Transient { code, .. }
            | Self::Dependency { code, .. }
            | Self::Permanent { code, .. }
            | Self::Partial { code, .. } => code,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Transient { message, .. }
            | Self::Dependency { message, .. }
            | Self::Permanent { message, .. }
            | Self::Partial { message, .. } => message,
        }
    }

    /// `true` for `transient` and `dependency`, the two categories a worker
    /// should Nack rather than route straight to the dead-letter queue.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Dependency { .. })
    }
}

/// Cooperative shutdown signal broadcast to workers and pools.
///
/// `Shutdown` requests a graceful stop; `Finalised` is published once every
/// pool has confirmed its workers have exited (forced or clean).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_dependency_are_retryable() {
        assert!(ProcessingError::transient("TIMEOUT", "deadline exceeded").is_retryable());
        assert!(ProcessingError::dependency("SERVICE_UNAVAILABLE", "downstream down").is_retryable());
    }

    #[test]
    fn permanent_and_partial_are_not_retryable() {
        assert!(!ProcessingError::permanent("INVALID_INPUT", "bad payload").is_retryable());
        assert!(!ProcessingError::partial("PARTIAL", "half done").is_retryable());
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = ProcessingError::transient("TIMEOUT", "deadline exceeded");
        assert_eq!(err.to_string(), "transient [TIMEOUT]: deadline exceeded");
    }

    #[test]
    fn with_source_is_reachable_via_error_source() {
        let cause = std::io::Error::other("boom");
        let err = ProcessingError::dependency("EXTERNAL_API_ERROR", "call failed").with_source(cause);
        assert!(std::error::Error::source(&err).is_some());
    }
}
