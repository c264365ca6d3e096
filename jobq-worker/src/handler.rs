//! The application-supplied handler interface (`spec.md` §6).

use async_trait::async_trait;
use jobq_common::{Message, ProcessingError};

/// Invoked by a worker to process a single decoded message.
///
/// `#[async_trait]` rather than a raw `async fn` in a trait, since handlers
/// are stored as trait objects inside a pool.
///
/// The handler MUST respect the passed [`tokio_util::sync::CancellationToken`]
/// — it is cancelled `visibility_timeout - 10s` after dequeue, matching the
/// handler-timeout safety margin `spec.md` §4.5 specifies.
#[async_trait]
pub trait Handler<M: Message>: Send + Sync {
    async fn handle(
        &self,
        cancellation: tokio_util::sync::CancellationToken,
        message: M,
    ) -> Result<(), ProcessingError>;
}

#[async_trait]
impl<M, F, Fut> Handler<M> for F
where
    M: Message,
    F: Fn(tokio_util::sync::CancellationToken, M) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), ProcessingError>> + Send,
{
    async fn handle(&self, cancellation: tokio_util::sync::CancellationToken, message: M) -> Result<(), ProcessingError> {
        self(cancellation, message).await
    }
}
