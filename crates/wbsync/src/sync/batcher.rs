//! Accumulates built payloads and hands full batches to the upload worker.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use super::builder::CardPayload;
use super::progress::{ProgressCallback, SyncProgress, emit};
use super::types::{MAX_BATCH_BYTES, UPLOAD_BATCH_SIZE};
use crate::error::{Result, SyncError};

/// Ordered payloads flushed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub payloads: Vec<CardPayload>,
    /// Estimated size: title plus description bytes.
    pub bytes: usize,
    /// Whether this is the terminal flush.
    pub final_batch: bool,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }
}

/// Flush thresholds. A batch is flushed as soon as either is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_items: usize,
    pub max_bytes: usize,
}

impl BatchLimits {
    /// Bulk update and create endpoints.
    pub const BULK: Self = Self {
        max_items: UPLOAD_BATCH_SIZE,
        max_bytes: MAX_BATCH_BYTES,
    };

    /// One payload per request.
    pub const SINGLE: Self = Self {
        max_items: 1,
        max_bytes: MAX_BATCH_BYTES,
    };
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self::BULK
    }
}

#[derive(Default)]
struct Pending {
    payloads: Vec<CardPayload>,
    bytes: usize,
}

/// Shared by every process worker. Flushing holds the lock until the
/// upload worker has taken the batch, so a stalled upload stalls `add`.
pub struct Batcher {
    pending: Mutex<Pending>,
    tx: mpsc::Sender<Batch>,
    limits: BatchLimits,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl Batcher {
    pub fn new(
        tx: mpsc::Sender<Batch>,
        limits: BatchLimits,
        on_progress: Option<Arc<ProgressCallback>>,
    ) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            tx,
            limits,
            on_progress,
        }
    }

    /// Append a payload, flushing if a threshold is reached.
    pub async fn add(&self, payload: CardPayload, cancel: &CancellationToken) -> Result<()> {
        let mut pending = self.pending.lock().await;
        pending.bytes += payload.size_estimate();
        pending.payloads.push(payload);

        if pending.payloads.len() >= self.limits.max_items || pending.bytes >= self.limits.max_bytes {
            let batch = take(&mut pending, false);
            self.send(batch, cancel).await?;
        }
        Ok(())
    }

    /// Send whatever is pending as the final batch.
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<()> {
        let mut pending = self.pending.lock().await;
        if pending.payloads.is_empty() {
            return Ok(());
        }
        let batch = take(&mut pending, true);
        self.send(batch, cancel).await
    }

    async fn send(&self, batch: Batch, cancel: &CancellationToken) -> Result<()> {
        emit(
            self.on_progress.as_deref(),
            SyncProgress::FlushingBatch {
                count: batch.len(),
                bytes: batch.bytes,
                final_batch: batch.final_batch,
            },
        );
        tracing::debug!(
            batch_size = batch.len(),
            bytes = batch.bytes,
            is_final = batch.final_batch,
            "Flushing batch"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            sent = self.tx.send(batch) => sent.map_err(|_| SyncError::Cancelled),
        }
    }
}

fn take(pending: &mut Pending, final_batch: bool) -> Batch {
    let bytes = std::mem::take(&mut pending.bytes);
    Batch {
        payloads: std::mem::take(&mut pending.payloads),
        bytes,
        final_batch,
    }
}
