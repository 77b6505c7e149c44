//! Progress reporting types for sync operations.
//!
//! The engine never prints; it emits [`SyncProgress`] events through an
//! optional callback and the caller decides how to render them.

use super::types::CardOperation;

/// Progress events emitted during sync operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// An operation started.
    OperationStarted {
        operation: CardOperation,
        /// Item budget for discovery.
        limit: usize,
        dry_run: bool,
    },

    /// An attribute map was fetched from the catalog.
    AttributesLoaded {
        /// Attribute name (`titles`, `brands`, ...).
        attribute: &'static str,
        /// Number of ids in the map.
        count: usize,
    },

    /// Discovery workers started paging the listing endpoint.
    DiscoveryStarted {
        /// Item budget; `None` when the whole listing is paged.
        limit: Option<usize>,
        workers: usize,
    },

    /// Fetched a listing page.
    FetchedPage {
        /// Marketplace id of the cursor the page was requested with.
        cursor_id: i64,
        /// Number of items on the page.
        count: usize,
        /// Running total of items dispatched downstream.
        total_so_far: usize,
    },

    /// A listing page fetch failed transiently and will be retried.
    PageFetchRetry {
        /// Time to wait before retry (ms).
        retry_after_ms: u64,
        /// Current attempt number.
        attempt: u32,
        error: String,
    },

    /// Discovery stopped producing items.
    DiscoveryComplete {
        /// Number of items dispatched to processing.
        dispatched: usize,
    },

    /// An id was removed by a filter stage.
    Excluded {
        internal_id: i64,
        stage: &'static str,
    },

    /// A single item could not be built and was skipped.
    ItemFailed {
        internal_id: i64,
        /// Absent for cards that do not exist on the marketplace yet.
        marketplace_id: Option<i64>,
        error: String,
    },

    /// A batch is being handed to the uploader.
    FlushingBatch {
        count: usize,
        /// Estimated payload size in bytes.
        bytes: usize,
        /// Whether this is the terminal flush after the item stream closed.
        final_batch: bool,
    },

    /// The marketplace rejected some entries of a batch as banned articles.
    BannedArticlesStripped {
        banned: Vec<i64>,
        remaining: usize,
    },

    /// A batch was accepted by the marketplace.
    Uploaded {
        count: usize,
    },

    /// A batch upload failed.
    UploadError {
        count: usize,
        error: String,
    },

    /// Warning message (non-fatal).
    Warning {
        message: String,
    },

    /// An operation finished (successfully or not).
    OperationComplete {
        operation: CardOperation,
        updated: u64,
        errored: u64,
    },
}

/// Callback for progress updates during sync operations.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
///
/// # Example
///
/// ```ignore
/// use wbsync::sync::{emit, SyncProgress, ProgressCallback};
///
/// fn report(on_progress: Option<&ProgressCallback>) {
///     emit(on_progress, SyncProgress::Uploaded { count: 42 });
/// }
/// ```
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
