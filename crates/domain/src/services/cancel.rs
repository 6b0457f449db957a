//! Cancellation of in-flight queries.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::error::DomainError;

/// Runs `fut` until it completes or `token` is cancelled.
///
/// A cancelled query returns [`DomainError::Cancelled`] and its partial
/// work is dropped.
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    if token.is_cancelled() {
        return Err(DomainError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(DomainError::Cancelled),
        result = fut => result,
    }
}
