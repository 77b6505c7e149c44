//! Shared sync types and constants.

use std::collections::HashSet;
use std::fmt;

use crate::catalog::AttributeKind;
use crate::error::SyncError;
use crate::marketplace::{Dimensions, ListingSettings, UploadEndpoint};
use crate::metrics::MetricsSnapshot;
use crate::rate_limit::RateLimit;

use super::filter::ExclusionLedger;

/// Items requested per listing page.
pub const PAGE_SIZE: u32 = 100;

/// Default number of discovery and process workers.
pub const DEFAULT_WORKERS: usize = 5;

/// Default item budget for one sync.
pub const DEFAULT_LIMIT: usize = 100_000;

/// A batch is flushed once it holds this many payloads.
pub const UPLOAD_BATCH_SIZE: usize = 2000;

/// A batch is flushed once its estimated size reaches this many bytes.
pub const MAX_BATCH_BYTES: usize = 1 << 20;

/// Capacity of the discovered-items channel.
///
/// Kept at one so discovery blocks until a process worker is ready.
pub const ITEM_CHANNEL_CAPACITY: usize = 1;

/// Upper bound on the capacity of the listing cursor queue.
pub const MAX_QUEUED_CURSORS: usize = 1024;

/// Capacity of the batches channel feeding the upload worker.
pub const BATCH_CHANNEL_CAPACITY: usize = 1;

/// Appended to every media update.
pub const ANONYMOUS_PACKAGE_IMAGE: &str =
    "http://media.athebyme-market.ru/anonymous/package/image/png";

/// The card operations a sync can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardOperation {
    /// Replace title and description.
    Rename,
    /// Replace brand.
    Brand,
    /// Fill in package dimensions.
    Package,
    /// Replace the photo set.
    Media,
    /// Create cards for catalog items missing from the marketplace.
    Create,
}

impl CardOperation {
    pub const ALL: [CardOperation; 5] = [
        CardOperation::Rename,
        CardOperation::Brand,
        CardOperation::Package,
        CardOperation::Media,
        CardOperation::Create,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            CardOperation::Rename => "rename",
            CardOperation::Brand => "brand",
            CardOperation::Package => "package",
            CardOperation::Media => "media",
            CardOperation::Create => "create",
        }
    }

    /// Attribute maps fetched before the operation starts.
    ///
    /// The filter chain sources come first, in filter order.
    #[must_use]
    pub fn required_attributes(self) -> &'static [AttributeKind] {
        use AttributeKind::*;
        match self {
            CardOperation::Rename | CardOperation::Brand | CardOperation::Package => {
                &[Ids, Brands, Titles, Descriptions, Barcodes]
            }
            CardOperation::Media => &[Ids, Brands, Titles, Descriptions, Barcodes, MediaUrls],
            CardOperation::Create => &[Ids, Brands, Titles, Descriptions, Barcodes, Prices],
        }
    }

    #[must_use]
    pub fn endpoint(self) -> UploadEndpoint {
        match self {
            CardOperation::Media => UploadEndpoint::Media,
            CardOperation::Create => UploadEndpoint::Create,
            _ => UploadEndpoint::Update,
        }
    }
}

impl fmt::Display for CardOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for one sync invocation.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Maximum number of items discovery hands downstream.
    pub limit: usize,
    /// Discovery and process worker count.
    pub workers: usize,
    pub listing_rate: RateLimit,
    pub upload_rate: RateLimit,
    pub media_rate: RateLimit,
    /// Package dimensions used where the marketplace card has none.
    pub package_defaults: Dimensions,
    /// Brands that are never pushed.
    pub banned_brands: HashSet<String>,
    /// Supplier identity embedded in created vendor codes.
    pub identity_code: i64,
    /// Marketplace category for created cards.
    pub subject_id: i64,
    /// Listing locale query parameter.
    pub locale: Option<String>,
    /// Sort and filter for the listing endpoint.
    pub listing: ListingSettings,
    /// Build and batch, but do not upload.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            workers: DEFAULT_WORKERS,
            listing_rate: RateLimit::LISTING,
            upload_rate: RateLimit::UPLOAD,
            media_rate: RateLimit::MEDIA,
            package_defaults: Dimensions::default(),
            banned_brands: HashSet::new(),
            identity_code: 0,
            subject_id: 0,
            locale: None,
            listing: ListingSettings::default(),
            dry_run: false,
        }
    }
}

impl SyncOptions {
    /// Upload limiter parameters for `operation`.
    #[must_use]
    pub fn upload_rate_for(&self, operation: CardOperation) -> RateLimit {
        match operation {
            CardOperation::Media => self.media_rate,
            _ => self.upload_rate,
        }
    }

    /// Whether `brand` is on the banned list (case-insensitive).
    #[must_use]
    pub fn is_banned_brand(&self, brand: &str) -> bool {
        let brand = brand.trim().to_lowercase();
        self.banned_brands
            .iter()
            .any(|banned| banned.trim().to_lowercase() == brand)
    }
}

/// Outcome of one sync operation.
///
/// `updated` is valid even when the operation failed; it counts what the
/// marketplace accepted before the failure.
#[derive(Debug, Default)]
pub struct SyncResult {
    pub operation: Option<CardOperation>,
    pub updated: u64,
    pub metrics: MetricsSnapshot,
    pub ledger: ExclusionLedger,
    /// Per-batch upload failures that did not stop the pipeline.
    pub errors: Vec<String>,
    /// The error that stopped the operation, if any.
    pub error: Option<SyncError>,
}

impl SyncResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the updated count and the terminal error.
    pub fn into_parts(self) -> (u64, Option<SyncError>) {
        (self.updated, self.error)
    }
}
