//! Discovery pipeline: pages the listing endpoint with a pool of workers and
//! streams accepted items downstream.
//!
//! ```text
//! task queue (cursors) ──→ W workers ──claim──→ CursorRegistry
//!        ↑                    │  acquire listing token
//!        └── next cursor ─────┤  fetch page
//!                             └──→ items channel ──→ process workers
//! ```
//!
//! Workers stop when the cursor chain runs out (an empty page, no next
//! cursor), when the item budget is spent, or on the first fatal error.
//! The items channel closes once every worker has exited.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use super::cursor::CursorRegistry;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{ITEM_CHANNEL_CAPACITY, MAX_QUEUED_CURSORS, PAGE_SIZE};
use crate::catalog::IdSet;
use crate::error::{Result, SyncError};
use crate::marketplace::{Cursor, InternalId, Item, ListingSettings, MarketplaceClient};
use crate::metrics::SyncMetrics;
use crate::rate_limit::ApiRateLimiter;

/// An item accepted by discovery, with its parsed internal id.
#[derive(Debug, Clone)]
pub struct DiscoveredItem {
    pub internal_id: InternalId,
    pub item: Item,
}

/// Totals reported when discovery finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub dispatched: usize,
    pub pages: usize,
    /// Items dropped because their id was not in the allow-list.
    pub rejected: usize,
}

/// Page sizes for an item budget: full pages, then the remainder.
///
/// Without a budget every page is full and the schedule never ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSchedule {
    limit: Option<usize>,
    page_size: u32,
}

impl PageSchedule {
    pub fn new(limit: Option<usize>, page_size: u32) -> Self {
        Self {
            limit,
            page_size: page_size.max(1),
        }
    }

    /// Number of pages the budget spans; `None` when unbounded.
    pub fn pages(&self) -> Option<usize> {
        self.limit
            .map(|limit| limit.div_ceil(self.page_size as usize))
    }

    /// Size of page `index`, or `None` once the budget is covered.
    pub fn get(&self, index: usize) -> Option<u32> {
        let Some(limit) = self.limit else {
            return Some(self.page_size);
        };
        let page = self.page_size as usize;
        let start = index.checked_mul(page)?;
        (start < limit).then(|| (limit - start).min(page) as u32)
    }
}

/// Discovery configuration for one sync.
#[derive(Clone)]
pub struct Discovery {
    pub client: MarketplaceClient,
    pub limiter: ApiRateLimiter,
    pub settings: ListingSettings,
    pub locale: Option<String>,
    /// Ids the catalog knows; anything else is dropped.
    pub allow_list: Arc<IdSet>,
    /// Item budget; `None` pages the whole listing.
    pub limit: Option<usize>,
    pub workers: usize,
    pub metrics: Arc<SyncMetrics>,
}

/// State shared by the discovery workers of one run.
struct Shared {
    discovery: Discovery,
    registry: CursorRegistry,
    schedule: PageSchedule,
    tasks_tx: mpsc::Sender<Cursor>,
    tasks_rx: Mutex<mpsc::Receiver<Cursor>>,
    /// Cursors queued or being processed.
    pending: AtomicUsize,
    pages: AtomicUsize,
    dispatched: AtomicUsize,
    rejected: AtomicUsize,
    /// Fired when no further cursors will be produced.
    exhausted: CancellationToken,
    abort: CancellationToken,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl Shared {
    fn finish_task(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.exhausted.cancel();
        }
    }

    /// Reserve one slot of the item budget.
    fn reserve(&self) -> bool {
        let Some(limit) = self.discovery.limit else {
            self.dispatched.fetch_add(1, Ordering::SeqCst);
            return true;
        };
        self.dispatched
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }
}

impl Discovery {
    /// Start the workers.
    ///
    /// Returns the items receiver and a handle resolving to the summary, or
    /// to the first fatal error. `cancel` stops every worker promptly.
    pub fn spawn(
        self,
        cancel: &CancellationToken,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> (
        mpsc::Receiver<DiscoveredItem>,
        JoinHandle<Result<DiscoverySummary>>,
    ) {
        let (items_tx, items_rx) = mpsc::channel(ITEM_CHANNEL_CAPACITY);

        let schedule = PageSchedule::new(self.limit, PAGE_SIZE);
        let queue = schedule
            .pages()
            .map_or(MAX_QUEUED_CURSORS, |pages| pages.clamp(1, MAX_QUEUED_CURSORS));
        let (tasks_tx, tasks_rx) = mpsc::channel(queue);
        let workers = self.workers.max(1);

        emit(
            on_progress.as_deref(),
            SyncProgress::DiscoveryStarted {
                limit: self.limit,
                workers,
            },
        );

        let shared = Arc::new(Shared {
            discovery: self,
            registry: CursorRegistry::new(),
            schedule,
            tasks_tx,
            tasks_rx: Mutex::new(tasks_rx),
            pending: AtomicUsize::new(0),
            pages: AtomicUsize::new(0),
            dispatched: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
            exhausted: CancellationToken::new(),
            abort: cancel.child_token(),
            on_progress,
        });

        match shared.schedule.get(0) {
            Some(first) => {
                shared.pending.store(1, Ordering::SeqCst);
                if shared.tasks_tx.try_send(Cursor::initial(first)).is_err() {
                    shared.exhausted.cancel();
                }
            }
            None => shared.exhausted.cancel(),
        }

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let shared = Arc::clone(&shared);
            let items_tx = items_tx.clone();
            set.spawn(async move { run_worker(worker_id, &shared, &items_tx).await });
        }
        drop(items_tx);

        let handle = tokio::spawn(async move {
            let mut first_error: Option<SyncError> = None;

            while let Some(joined) = set.join_next().await {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(SyncError::network(format!("discovery worker failed: {e}")))
                });
                if let Err(err) = outcome {
                    if first_error.is_none() {
                        if !err.is_cancelled() {
                            tracing::error!(error = %err, "Discovery failed");
                        }
                        shared.abort.cancel();
                        first_error = Some(err);
                    } else if !err.is_cancelled() {
                        tracing::debug!(error = %err, "Additional discovery error");
                    }
                }
            }

            let summary = DiscoverySummary {
                dispatched: shared.dispatched.load(Ordering::SeqCst),
                pages: shared.pages.load(Ordering::SeqCst),
                rejected: shared.rejected.load(Ordering::SeqCst),
            };
            emit(
                shared.on_progress.as_deref(),
                SyncProgress::DiscoveryComplete {
                    dispatched: summary.dispatched,
                },
            );
            tracing::debug!(
                dispatched = summary.dispatched,
                pages = summary.pages,
                rejected = summary.rejected,
                "Discovery finished"
            );

            match first_error {
                Some(err) => Err(err),
                None => Ok(summary),
            }
        });

        (items_rx, handle)
    }
}

async fn next_task(shared: &Shared) -> Result<Option<Cursor>> {
    tokio::select! {
        biased;
        _ = shared.abort.cancelled() => Err(SyncError::Cancelled),
        _ = shared.exhausted.cancelled() => Ok(None),
        cursor = async { shared.tasks_rx.lock().await.recv().await } => Ok(cursor),
    }
}

async fn run_worker(
    worker_id: usize,
    shared: &Shared,
    items_tx: &mpsc::Sender<DiscoveredItem>,
) -> Result<()> {
    let discovery = &shared.discovery;
    let on_progress = shared.on_progress.as_deref();

    while let Some(cursor) = next_task(shared).await? {
        if !shared.registry.claim(&cursor) {
            tracing::debug!(worker_id, cursor_id = cursor.last_id, "Duplicate cursor, skipping");
            shared.finish_task();
            continue;
        }

        discovery.limiter.acquire(&shared.abort).await?;
        let items = discovery
            .client
            .page(
                &discovery.settings,
                &cursor,
                discovery.locale.as_deref(),
                &shared.abort,
                on_progress,
            )
            .await?;

        let page_index = shared.pages.fetch_add(1, Ordering::SeqCst);
        emit(
            on_progress,
            SyncProgress::FetchedPage {
                cursor_id: cursor.last_id,
                count: items.len(),
                total_so_far: shared.dispatched.load(Ordering::SeqCst),
            },
        );

        if items.is_empty() {
            tracing::debug!(worker_id, "Empty page, no more data");
            shared.exhausted.cancel();
            shared.finish_task();
            return Ok(());
        }

        if let Some(next_limit) = shared.schedule.get(page_index + 1)
            && let Some(last) = items.last()
        {
            shared.pending.fetch_add(1, Ordering::SeqCst);
            if shared.tasks_tx.try_send(Cursor::after(last, next_limit)).is_err() {
                shared.pending.fetch_sub(1, Ordering::SeqCst);
                tracing::debug!(worker_id, "Task queue full, dropping next cursor");
            }
        }

        for item in items {
            let Some(internal_id) = item
                .internal_id()
                .filter(|id| discovery.allow_list.contains(id))
            else {
                tracing::debug!(
                    vendor_code = %item.vendor_code,
                    marketplace_id = item.marketplace_id,
                    "Item not in catalog, skipping"
                );
                shared.rejected.fetch_add(1, Ordering::SeqCst);
                discovery.metrics.record_errored(1);
                continue;
            };

            if !shared.reserve() {
                tracing::debug!(worker_id, limit = ?discovery.limit, "Item budget reached");
                shared.exhausted.cancel();
                shared.finish_task();
                return Ok(());
            }

            let discovered = DiscoveredItem { internal_id, item };
            tokio::select! {
                biased;
                _ = shared.abort.cancelled() => return Err(SyncError::Cancelled),
                sent = items_tx.send(discovered) => {
                    if sent.is_err() {
                        // Downstream hung up; nothing left to feed.
                        shared.exhausted.cancel();
                        shared.finish_task();
                        return Ok(());
                    }
                }
            }
            discovery.metrics.record_dispatched();
        }

        shared.finish_task();
    }

    Ok(())
}
