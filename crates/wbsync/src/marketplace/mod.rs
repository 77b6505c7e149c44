//! Wildberries content API: listing cards and pushing card changes.

mod client;
mod types;

pub use client::{
    DEFAULT_BASE_URL, LISTING_TIMEOUT, MarketplaceClient, UPLOAD_TIMEOUT, UploadEndpoint,
};
pub use types::{
    CardCreate, CardUpdate, Characteristic, CreateSize, CreateVariant, Cursor, Dimensions,
    InternalId, Item, ListingFilter, ListingRequest, ListingResponse, ListingSettings,
    MarketplaceId, MediaUpdate, Photo, ResponseCursor, Size, Sort, parse_internal_id,
};
