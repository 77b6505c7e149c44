//! The concurrent card sync pipeline.
//!
//! # Module Structure
//!
//! - [`types`] - Core types: `SyncOptions`, `SyncResult`, `CardOperation`, constants
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`cursor`] - Registry that lets each listing cursor be fetched once
//! - [`discovery`] - Listing workers feeding the items channel
//! - [`filter`] - Filter chain and exclusion ledger
//! - [`builder`] - Per-operation payload construction
//! - [`batcher`] - Size- and count-bounded batching
//! - [`upload`] - Uploader with banned article recovery and the upload task
//! - [`engine`] - `SyncEngine`, one public operation per card operation

mod batcher;
mod builder;
mod context;
mod cursor;
mod discovery;
pub mod engine;
mod filter;
mod progress;
mod types;
mod upload;

pub use batcher::{Batch, BatchLimits, Batcher};
pub use builder::{CardPayload, build, build_create};
pub use context::SyncEngineBuilder;
pub use cursor::{CursorKey, CursorRegistry};
pub use discovery::{DiscoveredItem, Discovery, DiscoverySummary, PageSchedule};
pub use engine::SyncEngine;
pub use filter::{ExclusionLedger, FilterChain, FilterStage};
pub use progress::{ProgressCallback, SyncProgress, emit};
pub use types::{CardOperation, SyncOptions, SyncResult};
pub use upload::{
    UPLOAD_TASK_TIMEOUT, UploadTaskResult, Uploader, await_upload_task, banned_articles,
    spawn_upload_task,
};

pub use types::{
    ANONYMOUS_PACKAGE_IMAGE, BATCH_CHANNEL_CAPACITY, DEFAULT_LIMIT, DEFAULT_WORKERS,
    ITEM_CHANNEL_CAPACITY, MAX_BATCH_BYTES, MAX_QUEUED_CURSORS, PAGE_SIZE, UPLOAD_BATCH_SIZE,
};
