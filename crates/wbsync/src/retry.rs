//! Retry utilities for transient marketplace failures.
//!
//! The listing pager retries dropped connections a fixed number of times
//! with a constant delay. Cancellation preempts both the request and the
//! delay between attempts.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError, short_error_message};
use crate::sync::{ProgressCallback, SyncProgress, emit};

/// Maximum retries for a listing page after a dropped connection.
pub const LISTING_MAX_RETRIES: usize = 3;

/// Delay between listing page retries.
pub const LISTING_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Configuration for retry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Delay between attempts.
    pub delay: Duration,
    /// Maximum number of retry attempts after the first call.
    pub max_retries: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            delay: LISTING_RETRY_DELAY,
            max_retries: LISTING_MAX_RETRIES,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(delay: Duration, max_retries: usize) -> Self {
        Self { delay, max_retries }
    }

    /// Build a constant backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ConstantBuilder {
        ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_retries)
    }
}

/// Execute an operation, retrying errors classified as retryable.
///
/// - Only [`SyncError::is_retryable`] errors are retried
/// - Each retry is reported via `SyncProgress::PageFetchRetry`
/// - Cancellation returns [`SyncError::Cancelled`] immediately, including
///   while sleeping between attempts
///
/// # Example
///
/// ```ignore
/// use wbsync::retry::{RetryConfig, with_retry};
///
/// let page = with_retry(
///     || async { client.fetch_page(&settings, &cursor).await },
///     RetryConfig::default(),
///     &cancel,
///     None,
/// )
/// .await?;
/// ```
pub async fn with_retry<T, F, Fut>(
    mut operation: F,
    config: RetryConfig,
    cancel: &CancellationToken,
    on_progress: Option<&ProgressCallback>,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // Track attempt number for progress reporting
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    let retrying = retry_op
        .retry(config.into_backoff())
        .notify(|err: &SyncError, dur: Duration| {
            let current_attempt = attempt.load(Ordering::SeqCst);
            emit(
                on_progress,
                SyncProgress::PageFetchRetry {
                    retry_after_ms: dur.as_millis() as u64,
                    attempt: current_attempt,
                    error: short_error_message(err),
                },
            );
            tracing::debug!(
                attempt = current_attempt,
                retry_after_ms = dur.as_millis() as u64,
                error = %short_error_message(err),
                "Transient failure, retrying"
            );
        })
        .when(SyncError::is_retryable);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = retrying => result,
    }
}
