//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ColloquyError;

/// Wrap a future with a timeout, mapping expiry to [`ColloquyError::Timeout`].
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, ColloquyError>>,
) -> Result<T, ColloquyError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ColloquyError::Timeout(duration.as_millis() as u64)),
    }
}
