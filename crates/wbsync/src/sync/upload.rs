//! Upload worker: sends batches to the marketplace write endpoints.
//!
//! A bulk upload that the marketplace rejects is inspected for the list of
//! banned articles. Those entries are dropped and the rest of the batch is
//! sent again until it is either accepted or nothing is left to send.
//!
//! ```text
//! process workers → Batcher → batch channel → upload task → marketplace
//! ```
//!
//! The upload task is the only consumer of the batch channel. It exits when
//! the channel closes or the sync is cancelled, and reports what it managed
//! to upload through [`UploadTaskResult`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::batcher::Batch;
use super::builder::CardPayload;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::MAX_BATCH_BYTES;
use crate::error::{Result, SyncError, short_error_message};
use crate::marketplace::{MarketplaceClient, UploadEndpoint};
use crate::metrics::SyncMetrics;
use crate::rate_limit::ApiRateLimiter;

/// Key of the banned article list inside `additionalErrors`, compared
/// case-insensitively.
const BANNED_ARTICLES_KEY: &str = "забаненные артикулы wb";

/// Maximum time to wait for the upload task once every batch sender is gone.
///
/// The remaining batches may still need rate-limited requests and banned
/// article retries, each bounded by the upload request timeout.
pub const UPLOAD_TASK_TIMEOUT: Duration = Duration::from_secs(600);

/// Extract banned article keys from a rejection body.
///
/// Returns `None` when the body is not the expected error document.
pub fn banned_articles(body: &[u8]) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let additional = value.get("additionalErrors")?.as_object()?;
    let list = additional
        .iter()
        .find(|(key, _)| key.to_lowercase() == BANNED_ARTICLES_KEY)?
        .1
        .as_str()?;

    Some(
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

/// Sends batches under the upload rate limit and keeps the updated and
/// errored counters.
#[derive(Clone)]
pub struct Uploader {
    client: MarketplaceClient,
    limiter: ApiRateLimiter,
    metrics: Arc<SyncMetrics>,
    dry_run: bool,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl Uploader {
    pub fn new(client: MarketplaceClient, limiter: ApiRateLimiter, metrics: Arc<SyncMetrics>) -> Self {
        Self {
            client,
            limiter,
            metrics,
            dry_run: false,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<Arc<ProgressCallback>>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// Upload one batch and return how many entries the marketplace accepted.
    ///
    /// Every entry ends up in exactly one of the updated or errored counters,
    /// unless the upload is cancelled.
    #[tracing::instrument(skip(self, payloads, cancel), fields(endpoint = endpoint.path(), batch_size = payloads.len()))]
    pub async fn upload(
        &self,
        endpoint: UploadEndpoint,
        payloads: Vec<CardPayload>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if payloads.is_empty() {
            return Ok(0);
        }

        if self.dry_run {
            let count = payloads.len();
            tracing::info!(endpoint = endpoint.path(), count, "Dry run: skipping upload");
            self.metrics.record_updated(count as u64);
            emit(self.on_progress.as_deref(), SyncProgress::Uploaded { count });
            return Ok(count);
        }

        match endpoint {
            UploadEndpoint::Media => self.upload_each(endpoint, payloads, cancel).await,
            UploadEndpoint::Update | UploadEndpoint::Create => {
                self.upload_stripping_banned(endpoint, payloads, cancel).await
            }
        }
    }

    async fn upload_stripping_banned(
        &self,
        endpoint: UploadEndpoint,
        mut payloads: Vec<CardPayload>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        loop {
            let body = serde_json::to_vec(&payloads)?;
            if body.len() > MAX_BATCH_BYTES {
                tracing::warn!(
                    bytes = body.len(),
                    batch_size = payloads.len(),
                    "Upload body exceeds the batch size bound"
                );
            }

            self.limiter.acquire(cancel).await?;
            let response = match self.client.post(endpoint, body, cancel).await {
                Ok(response) => response,
                Err(e) => {
                    if !e.is_cancelled() {
                        self.metrics.record_errored(payloads.len() as u64);
                    }
                    return Err(e);
                }
            };

            if response.status == 200 {
                let count = payloads.len();
                self.metrics.record_updated(count as u64);
                emit(self.on_progress.as_deref(), SyncProgress::Uploaded { count });
                tracing::debug!(count, "Batch accepted");
                return Ok(count);
            }

            let body = response.body_text();
            let Some(banned) = banned_articles(&response.body) else {
                self.metrics.record_errored(payloads.len() as u64);
                return Err(SyncError::UploadRejected { body });
            };

            let before = payloads.len();
            payloads.retain(|payload| !banned.contains(&payload.article_key()));
            let stripped = before - payloads.len();

            if stripped == 0 {
                self.metrics.record_errored(before as u64);
                return Err(SyncError::UploadRejected { body });
            }

            self.metrics.record_errored(stripped as u64);
            tracing::warn!(
                status = response.status,
                stripped,
                remaining = payloads.len(),
                "Marketplace rejected banned articles"
            );
            emit(
                self.on_progress.as_deref(),
                SyncProgress::BannedArticlesStripped {
                    banned: banned.iter().filter_map(|s| s.parse().ok()).collect(),
                    remaining: payloads.len(),
                },
            );

            if payloads.is_empty() {
                return Err(SyncError::UploadRejected { body });
            }
        }
    }

    /// One request per payload. A rejected payload is counted as errored and
    /// the rest are still sent.
    async fn upload_each(
        &self,
        endpoint: UploadEndpoint,
        payloads: Vec<CardPayload>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut accepted = 0;
        for payload in payloads {
            let body = serde_json::to_vec(&payload)?;
            self.limiter.acquire(cancel).await?;

            let error = match self.client.post(endpoint, body, cancel).await {
                Ok(response) if response.status == 200 => {
                    accepted += 1;
                    self.metrics.record_updated(1);
                    emit(self.on_progress.as_deref(), SyncProgress::Uploaded { count: 1 });
                    continue;
                }
                Ok(response) => SyncError::UploadRejected {
                    body: response.body_text(),
                },
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => e,
            };

            self.metrics.record_errored(1);
            let message = short_error_message(&error);
            tracing::warn!(
                marketplace_id = payload.marketplace_id(),
                error = %message,
                "Media update failed"
            );
            emit(
                self.on_progress.as_deref(),
                SyncProgress::UploadError {
                    count: 1,
                    error: message,
                },
            );
        }
        Ok(accepted)
    }
}

/// Result of the upload task.
#[derive(Debug, Default)]
#[must_use = "UploadTaskResult may contain errors that should be checked"]
pub struct UploadTaskResult {
    /// Entries the marketplace accepted.
    pub updated: u64,
    /// One message per failed batch.
    pub errors: Vec<String>,
    /// Panic message if the task panicked.
    pub panic_info: Option<String>,
    /// The task stopped on cancellation before the channel drained.
    pub cancelled: bool,
}

impl UploadTaskResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.panic_info.is_some()
    }
}

/// Spawn the upload worker.
///
/// Batches are uploaded one at a time in arrival order. A failed batch is
/// recorded and the worker moves on; cancellation stops it immediately.
pub fn spawn_upload_task(
    uploader: Uploader,
    endpoint: UploadEndpoint,
    mut rx: mpsc::Receiver<Batch>,
    cancel: CancellationToken,
) -> JoinHandle<UploadTaskResult> {
    tokio::spawn(async move {
        let mut result = UploadTaskResult::default();
        let task_start = std::time::Instant::now();
        let mut batch_count = 0u64;

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Upload task cancelled");
                    result.cancelled = true;
                    break;
                }
                batch = rx.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };

            batch_count += 1;
            let count = batch.len();
            match uploader.upload(endpoint, batch.payloads, &cancel).await {
                Ok(uploaded) => result.updated += uploaded as u64,
                Err(e) if e.is_cancelled() => {
                    tracing::debug!(batch_size = count, "Upload cancelled mid-batch");
                    result.cancelled = true;
                    break;
                }
                Err(e) => {
                    let message = short_error_message(&e);
                    tracing::warn!(batch_size = count, error = %message, "Failed to upload batch");
                    emit(
                        uploader.on_progress.as_deref(),
                        SyncProgress::UploadError {
                            count,
                            error: message,
                        },
                    );
                    result.errors.push(e.to_string());
                }
            }
        }

        tracing::debug!(
            batch_count,
            updated = result.updated,
            errors = result.errors.len(),
            elapsed_ms = task_start.elapsed().as_millis(),
            "Upload task completed"
        );
        result
    })
}

/// Await the upload task with a timeout, capturing panic information.
///
/// A task that outlives [`UPLOAD_TASK_TIMEOUT`] is aborted.
pub async fn await_upload_task(mut handle: JoinHandle<UploadTaskResult>) -> UploadTaskResult {
    tokio::select! {
        joined = &mut handle => match joined {
            Ok(result) => result,
            Err(e) => {
                let panic_info = if e.is_panic() {
                    let payload = e.into_panic();
                    if let Some(s) = payload.downcast_ref::<&str>() {
                        (*s).to_string()
                    } else if let Some(s) = payload.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    }
                } else if e.is_cancelled() {
                    "Task was cancelled".to_string()
                } else {
                    format!("Task failed: {e}")
                };
                tracing::error!(panic_info = %panic_info, "Upload task failed");
                UploadTaskResult {
                    panic_info: Some(panic_info),
                    ..UploadTaskResult::default()
                }
            }
        },
        _ = tokio::time::sleep(UPLOAD_TASK_TIMEOUT) => {
            handle.abort();
            tracing::error!(
                timeout_secs = UPLOAD_TASK_TIMEOUT.as_secs(),
                "Upload task timed out"
            );
            UploadTaskResult {
                panic_info: Some(format!(
                    "Upload task timed out after {}s",
                    UPLOAD_TASK_TIMEOUT.as_secs()
                )),
                ..UploadTaskResult::default()
            }
        }
    }
}
