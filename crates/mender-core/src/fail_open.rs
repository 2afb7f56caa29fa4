//! Fail-open utilities for graceful degradation
//!
//! Backend calls, auxiliary search, finance checks and compose bootstrap must
//! never take the pipeline down. Wrap them here so a failure is logged and
//! turned into an empty result.
//!
//! DO NOT use fail-open for:
//! - Patch application (its outcome is reported, not hidden)
//! - Configuration loading (misconfiguration is fatal)

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::{MenderError, Result};

/// Execute an operation that should fail open
///
/// Logs the error via `tracing::warn!` on failure and returns `None`.
///
/// # Usage
///
/// ```no_run
/// use mender_core::fail_open::fail_open;
/// use mender_core::Result;
///
/// async fn check_wallet() -> Result<f64> {
///     Ok(1.5)
/// }
///
/// async fn example() {
///     let balance = fail_open("finance", check_wallet()).await;
///     // balance is None if check_wallet() failed
/// }
/// ```
pub async fn fail_open<Fut, T>(operation_name: &str, fut: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T>>,
{
    match fut.await {
        Ok(val) => Some(val),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}

/// Like `fail_open` but falls back to `T::default()`
pub async fn fail_open_or_default<Fut, T>(operation_name: &str, fut: Fut) -> T
where
    Fut: Future<Output = Result<T>>,
    T: Default,
{
    fail_open(operation_name, fut).await.unwrap_or_default()
}

/// Bound an operation by `timeout`, reporting expiry as `MenderError::BackendTimeout`
pub async fn with_deadline<Fut, T>(timeout: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MenderError::BackendTimeout(timeout.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fail_open_success() {
        let result = fail_open("test_op", async { Ok::<_, MenderError>(42) }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_fail_open_failure() {
        let result = fail_open("test_op", async {
            Err::<i32, _>(MenderError::Other("boom".to_string()))
        })
        .await;
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_fail_open_or_default() {
        let text: String = fail_open_or_default("backend", async {
            Err(MenderError::Backend("503".to_string()))
        })
        .await;
        assert!(text.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_deadline_expires() {
        let result = with_deadline(Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, MenderError>("late")
        })
        .await;
        assert!(matches!(result, Err(MenderError::BackendTimeout(30))));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok::<_, MenderError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
