use wbsync::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::OperationStarted {
                operation,
                limit,
                dry_run,
            } => {
                tracing::info!(operation = %operation, limit, dry_run, "Starting sync");
            }

            SyncProgress::AttributesLoaded { attribute, count } => {
                tracing::info!(attribute, count, "Loaded catalog attribute");
            }

            SyncProgress::DiscoveryStarted { limit, workers } => {
                tracing::debug!(limit = ?limit, workers, "Discovering marketplace cards");
            }

            SyncProgress::FetchedPage {
                cursor_id,
                count,
                total_so_far,
            } => {
                tracing::debug!(cursor_id, count, total_so_far, "Fetched page");
            }

            SyncProgress::PageFetchRetry {
                retry_after_ms,
                attempt,
                error,
            } => {
                tracing::warn!(retry_after_ms, attempt, error = %error, "Retrying listing page");
            }

            SyncProgress::DiscoveryComplete { dispatched } => {
                tracing::info!(dispatched, "Discovery complete");
            }

            SyncProgress::Excluded { internal_id, stage } => {
                tracing::debug!(internal_id, stage, "Excluded");
            }

            SyncProgress::ItemFailed {
                internal_id,
                marketplace_id,
                error,
            } => {
                tracing::warn!(internal_id, marketplace_id = ?marketplace_id, error = %error, "Skipped card");
            }

            SyncProgress::FlushingBatch {
                count,
                bytes,
                final_batch,
            } => {
                if final_batch {
                    tracing::info!(count, bytes, "Flushing final batch");
                } else {
                    tracing::debug!(count, bytes, "Flushing batch");
                }
            }

            SyncProgress::BannedArticlesStripped { banned, remaining } => {
                tracing::warn!(banned = ?banned, remaining, "Stripped banned articles");
            }

            SyncProgress::Uploaded { count } => {
                tracing::info!(count, "Uploaded batch");
            }

            SyncProgress::UploadError { count, error } => {
                tracing::error!(count, error = %error, "Upload failed");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            SyncProgress::OperationComplete {
                operation,
                updated,
                errored,
            } => {
                tracing::info!(operation = %operation, updated, errored, "Sync complete");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
