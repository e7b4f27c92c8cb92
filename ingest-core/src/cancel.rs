//! Cancellation-aware error wrapping.
//!
//! Every long-lived async operation in this engine accepts a
//! [`tokio_util::sync::CancellationToken`](https://docs.rs/tokio-util) and
//! must surface cancellation as a signal distinct from failure, not as one
//! more error variant a caller could accidentally match against a normal
//! failure path. [`Cancellable`] wraps an operation's own error type and adds
//! exactly one more outcome: cancelled.

use ingest_types::IngestError;

/// An operation's result, explicit about whether it failed or was cancelled.
#[derive(Debug, thiserror::Error)]
pub enum Cancellable<E = IngestError> {
    /// The cancellation token was observed tripped before or during the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation ran to completion and failed on its own terms.
    #[error(transparent)]
    Failed(#[from] E),
}

impl<E> Cancellable<E> {
    /// True if this outcome represents cancellation rather than failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Race a future against a cancellation token, mapping a trip to
/// [`Cancellable::Cancelled`] and a completed `Err` to [`Cancellable::Failed`].
pub async fn run_cancellable<T, E, Fut>(
    token: &tokio_util::sync::CancellationToken,
    fut: Fut,
) -> Result<T, Cancellable<E>>
where
    Fut: std::future::Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        () = token.cancelled() => Err(Cancellable::Cancelled),
        res = fut => res.map_err(Cancellable::Failed),
    }
}
