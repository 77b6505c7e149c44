//! Sync orchestrator: one public operation per card operation.
//!
//! Every operation runs the same pipeline:
//!
//! ```text
//! catalog ─→ attribute snapshot ─→ filter chain ─→ survivors
//!                                                     │
//! listing ─→ discovery workers ─→ items ─→ process workers ─→ Batcher
//!                                                               │
//!                                  marketplace ←─ upload task ←─┘
//! ```
//!
//! `create` replaces the process workers: discovery only indexes which
//! catalog ids already have a card, and the missing survivors are built
//! into new cards.
//!
//! # Example
//!
//! ```ignore
//! use wbsync::sync::SyncEngine;
//!
//! let engine = SyncEngine::builder()
//!     .marketplace(marketplace)
//!     .catalog(catalog)
//!     .options(options)
//!     .build()?;
//!
//! let result = engine.rename().await;
//! println!("Updated {} cards", result.updated);
//! ```

mod attributes;
mod process;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use self::attributes::load_attributes;
use self::process::{ProcessContext, run_process_workers};
use super::batcher::{BatchLimits, Batcher};
use super::builder::build_create;
use super::discovery::{Discovery, DiscoverySummary};
use super::filter::FilterChain;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{BATCH_CHANNEL_CAPACITY, CardOperation, SyncOptions, SyncResult};
use super::upload::{Uploader, await_upload_task, spawn_upload_task};
use crate::catalog::{Attributes, CatalogClient, IdSet};
use crate::error::{Result, SyncError, short_error_message};
use crate::marketplace::MarketplaceClient;
use crate::metrics::{MetricsRegistry, SyncMetrics};
use crate::rate_limit::ApiRateLimiter;

/// Runs card operations against one marketplace account and catalog.
///
/// Built with [`SyncEngine::builder`].
pub struct SyncEngine {
    pub(super) marketplace: MarketplaceClient,
    pub(super) catalog: CatalogClient,
    pub(super) options: SyncOptions,
    pub(super) registry: Arc<MetricsRegistry>,
    pub(super) on_progress: Option<Arc<ProgressCallback>>,
    pub(super) cancel: CancellationToken,
}

impl SyncEngine {
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Process-wide metrics this engine reports into.
    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }

    /// Cancelling this token stops any running operation.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Replace title and description from the catalog.
    pub async fn rename(&self) -> SyncResult {
        self.run(CardOperation::Rename).await
    }

    /// Replace the brand from the catalog.
    pub async fn brand(&self) -> SyncResult {
        self.run(CardOperation::Brand).await
    }

    /// Fill in missing package dimensions.
    pub async fn package(&self) -> SyncResult {
        self.run(CardOperation::Package).await
    }

    /// Replace card photos with the catalog's media.
    pub async fn media(&self) -> SyncResult {
        self.run(CardOperation::Media).await
    }

    /// Create cards for catalog items the marketplace does not have.
    pub async fn create(&self) -> SyncResult {
        self.run(CardOperation::Create).await
    }

    /// Run one operation to completion.
    ///
    /// `updated` in the result is valid whether or not the operation failed.
    #[tracing::instrument(skip(self, operation), fields(operation = %operation, dry_run = self.options.dry_run))]
    pub async fn run(&self, operation: CardOperation) -> SyncResult {
        let started = Instant::now();
        let cancel = self.cancel.child_token();
        let metrics = self.registry.begin_run();

        emit(
            self.on_progress.as_deref(),
            SyncProgress::OperationStarted {
                operation,
                limit: self.options.limit,
                dry_run: self.options.dry_run,
            },
        );
        tracing::info!(
            limit = self.options.limit,
            workers = self.options.workers,
            "Starting sync"
        );

        let mut result = SyncResult {
            operation: Some(operation),
            ..SyncResult::default()
        };
        let outcome = self.execute(operation, &metrics, &cancel, &mut result).await;
        cancel.cancel();

        let snapshot = self.registry.end_run(&metrics);
        result.metrics = snapshot;
        result.updated = snapshot.updated;
        result.ledger.log();

        match &outcome {
            Ok(()) => tracing::info!(
                updated = snapshot.updated,
                errored = snapshot.errored,
                elapsed_ms = started.elapsed().as_millis(),
                "Sync complete"
            ),
            Err(e) if e.is_cancelled() => tracing::warn!(
                updated = snapshot.updated,
                errored = snapshot.errored,
                "Sync cancelled"
            ),
            Err(e) => tracing::error!(
                updated = snapshot.updated,
                errored = snapshot.errored,
                error = %e,
                "Sync failed"
            ),
        }
        emit(
            self.on_progress.as_deref(),
            SyncProgress::OperationComplete {
                operation,
                updated: snapshot.updated,
                errored: snapshot.errored,
            },
        );

        result.error = outcome.err();
        result
    }

    async fn execute(
        &self,
        operation: CardOperation,
        metrics: &Arc<SyncMetrics>,
        cancel: &CancellationToken,
        result: &mut SyncResult,
    ) -> Result<()> {
        let on_progress = self.on_progress.as_deref();

        let attributes = load_attributes(
            &self.catalog,
            operation.required_attributes(),
            cancel,
            on_progress,
        )
        .await?;

        let (survivors, ledger) = FilterChain::new(&attributes, &self.options)
            .run(attributes.ids.iter().copied(), on_progress);
        result.ledger = ledger;
        tracing::info!(
            catalog = attributes.ids.len(),
            survivors = survivors.len(),
            excluded = result.ledger.len(),
            "Filtered catalog ids"
        );

        if survivors.is_empty() {
            let message = "No catalog ids passed the filters; nothing to sync".to_string();
            tracing::warn!("{message}");
            emit(on_progress, SyncProgress::Warning { message });
            return Ok(());
        }

        let attributes = Arc::new(attributes);
        let survivors = Arc::new(survivors);

        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let uploader = Uploader::new(
            self.marketplace.clone(),
            ApiRateLimiter::new(self.options.upload_rate_for(operation)),
            Arc::clone(metrics),
        )
        .with_dry_run(self.options.dry_run)
        .with_progress(self.on_progress.clone());
        let upload_handle = spawn_upload_task(uploader, operation.endpoint(), batch_rx, cancel.clone());

        let limits = match operation {
            CardOperation::Media => BatchLimits::SINGLE,
            _ => BatchLimits::BULK,
        };
        let batcher = Arc::new(Batcher::new(batch_tx, limits, self.on_progress.clone()));

        let produced = match operation {
            CardOperation::Create => {
                self.create_cards(&attributes, &survivors, &batcher, metrics, cancel)
                    .await
            }
            _ => {
                let context = Arc::new(ProcessContext::new(
                    operation,
                    Arc::clone(&attributes),
                    Arc::clone(&survivors),
                    self.options.clone(),
                    Arc::clone(&batcher),
                    Arc::clone(metrics),
                    self.on_progress.clone(),
                ));
                self.update_cards(&attributes, context, metrics, cancel).await
            }
        };

        let flushed = match produced {
            Ok(()) => batcher.flush(cancel).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &flushed
            && !e.is_cancelled()
        {
            cancel.cancel();
        }
        // Closes the batch channel so the upload task can finish.
        drop(batcher);

        let uploaded = await_upload_task(upload_handle).await;
        result.errors.extend(uploaded.errors);
        let drained = match uploaded.panic_info {
            Some(info) => Err(SyncError::network(format!("upload worker failed: {info}"))),
            // Batches still queued or in flight were dropped.
            None if uploaded.cancelled => Err(SyncError::Cancelled),
            None => Ok(()),
        };
        first_failure([flushed, drained])
    }

    fn discovery(
        &self,
        attributes: &Attributes,
        limit: Option<usize>,
        metrics: Arc<SyncMetrics>,
    ) -> Discovery {
        Discovery {
            client: self.marketplace.clone(),
            limiter: ApiRateLimiter::new(self.options.listing_rate),
            settings: self.options.listing.clone(),
            locale: self.options.locale.clone(),
            allow_list: Arc::new(attributes.ids.clone()),
            limit,
            workers: self.options.workers,
            metrics,
        }
    }

    async fn update_cards(
        &self,
        attributes: &Attributes,
        context: Arc<ProcessContext>,
        metrics: &Arc<SyncMetrics>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (items, handle) = self
            .discovery(attributes, Some(self.options.limit), Arc::clone(metrics))
            .spawn(cancel, self.on_progress.clone());

        let (discovered, processed) = tokio::join!(
            join_discovery(handle, cancel),
            run_process_workers(context, items, self.options.workers, cancel),
        );

        first_failure([discovered.map(|_| ()), processed])
    }

    /// Index every existing card, then build a new card for each survivor
    /// that has none. The item budget caps the cards created.
    async fn create_cards(
        &self,
        attributes: &Attributes,
        survivors: &IdSet,
        batcher: &Batcher,
        metrics: &SyncMetrics,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Indexing counts nothing: the items found here are not updated.
        let (mut items, handle) = self
            .discovery(attributes, None, Arc::new(SyncMetrics::new()))
            .spawn(cancel, self.on_progress.clone());

        let mut existing = IdSet::new();
        let index = async {
            while let Some(discovered) = items.recv().await {
                existing.insert(discovered.internal_id);
            }
        };
        let ((), discovered) = tokio::join!(index, join_discovery(handle, cancel));
        discovered?;

        let mut candidates: Vec<_> = survivors
            .iter()
            .copied()
            .filter(|id| !existing.contains(id))
            .collect();
        candidates.sort_unstable();
        tracing::info!(
            existing = existing.len(),
            candidates = candidates.len(),
            limit = self.options.limit,
            "Indexed marketplace cards"
        );
        candidates.truncate(self.options.limit);

        for id in candidates {
            metrics.record_dispatched();
            metrics.record_processed();
            match build_create(id, attributes, &self.options) {
                Ok(payload) => batcher.add(payload, cancel).await?,
                Err(e) if e.is_per_item() => {
                    let error = short_error_message(&e);
                    tracing::warn!(internal_id = id, error = %error, "Skipping card");
                    metrics.record_errored(1);
                    emit(
                        self.on_progress.as_deref(),
                        SyncProgress::ItemFailed {
                            internal_id: id,
                            marketplace_id: None,
                            error,
                        },
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Await discovery and cancel the pipeline if it failed.
async fn join_discovery(
    handle: JoinHandle<Result<DiscoverySummary>>,
    cancel: &CancellationToken,
) -> Result<DiscoverySummary> {
    let outcome = handle
        .await
        .unwrap_or_else(|e| Err(SyncError::network(format!("discovery failed: {e}"))));
    if let Err(e) = &outcome
        && !e.is_cancelled()
    {
        cancel.cancel();
    }
    outcome
}

/// The first error that is not a cancellation, else the first cancellation.
fn first_failure<const N: usize>(outcomes: [Result<()>; N]) -> Result<()> {
    let mut cancelled = None;
    for outcome in outcomes {
        match outcome {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {
                cancelled.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match cancelled {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
