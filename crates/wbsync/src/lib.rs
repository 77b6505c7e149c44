//! wbsync - a concurrent card sync engine for the Wildberries marketplace.
//!
//! The engine pages the marketplace listing under a token-bucket rate limit,
//! joins each card with attributes from an internal catalog service, filters
//! out ids the catalog cannot describe, and uploads rebuilt cards in bounded
//! batches under a second, independent rate limit.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use wbsync::{CatalogClient, MarketplaceClient, SyncEngine, SyncOptions};
//!
//! let marketplace = MarketplaceClient::new(wbsync::marketplace::DEFAULT_BASE_URL, &token)?;
//! let catalog = CatalogClient::new("http://localhost:8081", Duration::from_secs(30))?;
//!
//! let engine = SyncEngine::builder()
//!     .marketplace(marketplace)
//!     .catalog(catalog)
//!     .options(SyncOptions::default())
//!     .build()?;
//!
//! let result = engine.rename().await;
//! println!("{} cards updated", result.updated);
//! ```

pub mod catalog;
pub mod error;
pub mod http;
pub mod marketplace;
pub mod metrics;
pub mod rate_limit;
pub mod retry;
pub mod sync;
pub mod text;

pub use catalog::{Attributes, CatalogClient, MediaOptions};
pub use error::{Result, SyncError};
pub use marketplace::{Dimensions, Item, MarketplaceClient};
pub use metrics::{MeteredTransport, MetricsRegistry};
pub use rate_limit::{ApiRateLimiter, RateLimit, rate_limits};
pub use sync::{CardOperation, SyncEngine, SyncOptions, SyncProgress, SyncResult};
