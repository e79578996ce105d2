//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::{DeskError, TransportFailure};

/// Wrap a future with a timeout; expiry is a transport failure.
pub async fn with_timeout<T>(
    duration: Duration,
    future: impl Future<Output = Result<T, DeskError>>,
) -> Result<T, DeskError> {
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TransportFailure::Timeout(duration.as_millis() as u64).into()),
    }
}
