use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::calendar::TimePayload;
use crate::error::{FetchError, FetchResult};

/// The two network calls a sync needs. Implementations only move bytes;
/// interpreting the time payload is left to the core.
#[async_trait]
pub trait ClockFetcher: Send + Sync {
    /// Returns the device's public identity, usually its IP address.
    async fn fetch_identity(&self) -> FetchResult<String>;

    /// Returns the authoritative local time for `identity`.
    async fn fetch_time(&self, identity: &str) -> FetchResult<TimePayload>;
}

/// Runs a fetch with an upper bound on how long it may take. Running out
/// of time is just another fetch failure.
pub async fn with_timeout<T, F>(timeout: Duration, fetch: F) -> FetchResult<T>
where
    F: Future<Output = FetchResult<T>>,
{
    tokio::time::timeout(timeout, fetch)
        .await
        .unwrap_or(Err(FetchError::Timeout(timeout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_a_fetch_error() {
        let result: FetchResult<String> =
            with_timeout(Duration::from_secs(3), std::future::pending()).await;
        assert_eq!(result, Err(FetchError::Timeout(Duration::from_secs(3))));
    }

    #[tokio::test]
    async fn test_fast_fetch_passes_through() {
        let result = with_timeout(Duration::from_secs(3), async { Ok("198.51.100.7".to_string()) }).await;
        assert_eq!(result, Ok("198.51.100.7".to_string()));

        let result: FetchResult<String> = with_timeout(Duration::from_secs(3), async {
            Err(FetchError::transport("connection reset"))
        })
        .await;
        assert_eq!(result, Err(FetchError::transport("connection reset")));
    }
}
