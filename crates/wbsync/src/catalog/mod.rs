//! Internal catalog service: per-product attributes keyed by internal id.

mod client;
mod types;

pub use client::{CatalogClient, DEFAULT_CATALOG_TIMEOUT, MediaOptions};
pub use types::{
    AttributeKind, AttributeMap, Attributes, COST_MARKUP, IdSet, PriceMap, SizeMap, StringListMap,
    StringMap,
};
