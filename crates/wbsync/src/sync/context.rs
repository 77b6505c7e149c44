//! Builder for [`SyncEngine`].
//!
//! # Example
//!
//! ```ignore
//! use wbsync::sync::{SyncEngine, SyncOptions};
//!
//! let engine = SyncEngine::builder()
//!     .marketplace(marketplace)
//!     .catalog(catalog)
//!     .options(SyncOptions::default())
//!     .progress(callback)
//!     .cancel(shutdown_token)
//!     .build()?;
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::engine::SyncEngine;
use super::progress::ProgressCallback;
use super::types::SyncOptions;
use crate::catalog::CatalogClient;
use crate::error::{Result, SyncError};
use crate::marketplace::MarketplaceClient;
use crate::metrics::MetricsRegistry;

/// Collects the clients and settings a [`SyncEngine`] needs.
#[derive(Default)]
pub struct SyncEngineBuilder {
    marketplace: Option<MarketplaceClient>,
    catalog: Option<CatalogClient>,
    options: Option<SyncOptions>,
    progress: Option<Arc<ProgressCallback>>,
    cancel: Option<CancellationToken>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl SyncEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marketplace(mut self, client: MarketplaceClient) -> Self {
        self.marketplace = Some(client);
        self
    }

    pub fn catalog(mut self, client: CatalogClient) -> Self {
        self.catalog = Some(client);
        self
    }

    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Set the progress callback.
    pub fn progress(mut self, callback: Arc<ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Root cancellation token. Defaults to a fresh token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Registry that accumulates counters across operations. Defaults to a
    /// private registry.
    pub fn metrics(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(registry);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] if a client is missing or the options
    /// ask for zero workers.
    pub fn build(self) -> Result<SyncEngine> {
        let marketplace = self
            .marketplace
            .ok_or_else(|| SyncError::config("missing required field: marketplace"))?;
        let catalog = self
            .catalog
            .ok_or_else(|| SyncError::config("missing required field: catalog"))?;
        let options = self.options.unwrap_or_default();

        if options.workers == 0 {
            return Err(SyncError::config("workers must be at least 1"));
        }

        Ok(SyncEngine {
            marketplace,
            catalog,
            options,
            registry: self.metrics.unwrap_or_else(MetricsRegistry::new),
            on_progress: self.progress,
            cancel: self.cancel.unwrap_or_default(),
        })
    }
}

impl SyncEngine {
    pub fn builder() -> SyncEngineBuilder {
        SyncEngineBuilder::new()
    }
}
