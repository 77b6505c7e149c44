use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::catalog::{Attributes, IdSet};
use crate::error::{Result, SyncError, short_error_message};
use crate::metrics::SyncMetrics;

use super::super::batcher::Batcher;
use super::super::builder::build;
use super::super::discovery::DiscoveredItem;
use super::super::progress::{ProgressCallback, SyncProgress, emit};
use super::super::types::{CardOperation, SyncOptions};

/// Everything a process worker reads while turning items into payloads.
pub(super) struct ProcessContext {
    pub(super) operation: CardOperation,
    pub(super) attributes: Arc<Attributes>,
    /// Ids that passed the filter chain.
    pub(super) survivors: Arc<IdSet>,
    pub(super) options: SyncOptions,
    pub(super) batcher: Arc<Batcher>,
    pub(super) metrics: Arc<SyncMetrics>,
    pub(super) on_progress: Option<Arc<ProgressCallback>>,
    seen: Mutex<HashSet<String>>,
}

impl ProcessContext {
    pub(super) fn new(
        operation: CardOperation,
        attributes: Arc<Attributes>,
        survivors: Arc<IdSet>,
        options: SyncOptions,
        batcher: Arc<Batcher>,
        metrics: Arc<SyncMetrics>,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Self {
        Self {
            operation,
            attributes,
            survivors,
            options,
            batcher,
            metrics,
            on_progress,
            seen: Mutex::new(HashSet::new()),
        }
    }

    async fn process(&self, discovered: DiscoveredItem, cancel: &CancellationToken) -> Result<()> {
        self.metrics.record_processed();

        if !self.seen.lock().await.insert(discovered.item.vendor_code.clone()) {
            tracing::debug!(vendor_code = %discovered.item.vendor_code, "Duplicate vendor code, skipping");
            return Ok(());
        }

        if !self.survivors.contains(&discovered.internal_id) {
            tracing::debug!(internal_id = discovered.internal_id, "Filtered out, skipping");
            self.metrics.record_errored(1);
            return Ok(());
        }

        match build(self.operation, &discovered, &self.attributes, &self.options) {
            Ok(payload) => self.batcher.add(payload, cancel).await,
            Err(e) if e.is_per_item() => {
                let error = short_error_message(&e);
                tracing::warn!(
                    marketplace_id = discovered.item.marketplace_id,
                    internal_id = discovered.internal_id,
                    error = %error,
                    "Skipping item"
                );
                self.metrics.record_errored(1);
                emit(
                    self.on_progress.as_deref(),
                    SyncProgress::ItemFailed {
                        internal_id: discovered.internal_id,
                        marketplace_id: Some(discovered.item.marketplace_id),
                        error,
                    },
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

async fn run_worker(
    worker_id: usize,
    context: Arc<ProcessContext>,
    items: Arc<Mutex<mpsc::Receiver<DiscoveredItem>>>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            item = async { items.lock().await.recv().await } => item,
        };
        let Some(discovered) = next else {
            break;
        };
        context.process(discovered, &cancel).await?;
    }

    tracing::debug!(worker_id, "Process worker finished");
    Ok(())
}

/// Run `workers` process workers until the items channel closes.
///
/// The first fatal error cancels `cancel` and is returned once every worker
/// has stopped.
pub(super) async fn run_process_workers(
    context: Arc<ProcessContext>,
    items: mpsc::Receiver<DiscoveredItem>,
    workers: usize,
    cancel: &CancellationToken,
) -> Result<()> {
    let items = Arc::new(Mutex::new(items));
    let mut set = JoinSet::new();
    for worker_id in 0..workers.max(1) {
        set.spawn(run_worker(
            worker_id,
            Arc::clone(&context),
            Arc::clone(&items),
            cancel.clone(),
        ));
    }

    let mut first_error: Option<SyncError> = None;
    while let Some(joined) = set.join_next().await {
        let outcome = joined
            .unwrap_or_else(|e| Err(SyncError::network(format!("process worker failed: {e}"))));
        let Err(err) = outcome else {
            continue;
        };

        let replace = match &first_error {
            None => true,
            Some(existing) => existing.is_cancelled() && !err.is_cancelled(),
        };
        if !err.is_cancelled() {
            tracing::error!(error = %err, "Process worker failed");
            cancel.cancel();
        }
        if replace {
            first_error = Some(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
