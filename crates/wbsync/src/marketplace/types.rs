//! Wire types for the marketplace content API.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Marketplace-internal card id (`nmID`).
pub type MarketplaceId = i64;

/// Supplier-side product id embedded in the vendor code.
pub type InternalId = i64;

static VENDOR_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w*-(\d+)-\w*$").expect("vendor code pattern is valid"));

/// Extract the internal id from a vendor code of the form `<prefix>-<digits>-<suffix>`.
pub fn parse_internal_id(vendor_code: &str) -> Option<InternalId> {
    VENDOR_CODE
        .captures(vendor_code)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// One card returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(rename = "nmID")]
    pub marketplace_id: MarketplaceId,
    #[serde(rename = "imtID", default)]
    pub group_id: i64,
    #[serde(rename = "nmUUID", default)]
    pub uuid: String,
    #[serde(rename = "subjectID", default)]
    pub subject_id: i64,
    #[serde(default)]
    pub subject_name: String,
    pub vendor_code: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default)]
    pub dimensions: Dimensions,
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
    #[serde(default)]
    pub sizes: Vec<Size>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Item {
    /// Internal id parsed from the vendor code, if it matches the pattern.
    pub fn internal_id(&self) -> Option<InternalId> {
        parse_internal_id(&self.vendor_code)
    }
}

/// One photo in several renditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Photo {
    pub big: String,
    pub c246x328: String,
    pub c516x688: String,
    pub square: String,
    pub tm: String,
}

/// Package dimensions in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    #[serde(default)]
    pub length: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
}

impl Dimensions {
    #[must_use]
    pub const fn new(length: i64, width: i64, height: i64) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    /// Replace each zero or negative side with the matching default.
    #[must_use]
    pub fn or_defaults(self, defaults: Dimensions) -> Self {
        let pick = |value: i64, fallback: i64| if value > 0 { value } else { fallback };
        Self {
            length: pick(self.length, defaults.length),
            width: pick(self.width, defaults.width),
            height: pick(self.height, defaults.height),
        }
    }

    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.length > 0 && self.width > 0 && self.height > 0
    }
}

/// A card characteristic. The value type depends on the characteristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    pub id: i64,
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Size {
    #[serde(rename = "chrtID", default)]
    pub chrt_id: i64,
    #[serde(default)]
    pub tech_size: String,
    #[serde(default)]
    pub wb_size: String,
    #[serde(default)]
    pub skus: Vec<String>,
}

// ---------- Listing request/response ----------

/// Body of a listing request: `{"settings": {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ListingRequest<'a> {
    pub settings: &'a ListingSettings,
}

/// Listing settings. The filter is passed through to the endpoint unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingSettings {
    #[serde(default)]
    pub sort: Sort,
    #[serde(default)]
    pub filter: ListingFilter,
    #[serde(default)]
    pub cursor: Cursor,
}

impl ListingSettings {
    /// Copy of these settings with the cursor replaced.
    #[must_use]
    pub fn with_cursor(&self, cursor: Cursor) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFilter {
    /// `-1` all cards, `0` only without photos, `1` only with photos.
    pub with_photo: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text_search: String,
    #[serde(rename = "tagIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<i64>,
    #[serde(default)]
    pub allowed_categories_only: bool,
    #[serde(rename = "objectIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub object_ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub brands: Vec<String>,
    #[serde(rename = "imtID", default, skip_serializing_if = "is_zero")]
    pub imt_id: i64,
}

impl Default for ListingFilter {
    fn default() -> Self {
        Self {
            with_photo: -1,
            text_search: String::new(),
            tag_ids: Vec::new(),
            allowed_categories_only: false,
            object_ids: Vec::new(),
            brands: Vec::new(),
            imt_id: 0,
        }
    }
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// Paging cursor: the trailing item of the previous page plus a page size.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "nmID", default, skip_serializing_if = "is_zero")]
    pub last_id: MarketplaceId,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "String::is_empty")]
    pub last_updated_at: String,
    pub limit: u32,
}

impl Cursor {
    /// The cursor every sync starts from: `(0, "")`.
    #[must_use]
    pub fn initial(limit: u32) -> Self {
        Self {
            last_id: 0,
            last_updated_at: String::new(),
            limit,
        }
    }

    /// The cursor following `item`.
    #[must_use]
    pub fn after(item: &Item, limit: u32) -> Self {
        Self {
            last_id: item.marketplace_id,
            last_updated_at: item.updated_at.clone(),
            limit,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::initial(100)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ListingResponse {
    #[serde(default)]
    pub cards: Vec<Item>,
    #[serde(default)]
    pub cursor: ResponseCursor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseCursor {
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,
    #[serde(rename = "nmID", default)]
    pub last_id: MarketplaceId,
    #[serde(default)]
    pub total: u64,
}

// ---------- Update/create/media payloads ----------

/// Body entry for the bulk card update endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdate {
    #[serde(rename = "nmID")]
    pub marketplace_id: MarketplaceId,
    pub vendor_code: String,
    pub brand: String,
    pub title: String,
    pub description: String,
    pub dimensions: Dimensions,
    pub characteristics: Vec<Characteristic>,
    pub sizes: Vec<Size>,
}

impl From<&Item> for CardUpdate {
    fn from(item: &Item) -> Self {
        Self {
            marketplace_id: item.marketplace_id,
            vendor_code: item.vendor_code.clone(),
            brand: item.brand.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            dimensions: item.dimensions,
            characteristics: item.characteristics.clone(),
            sizes: item.sizes.clone(),
        }
    }
}

/// Body of one media save request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUpdate {
    #[serde(rename = "nmId")]
    pub marketplace_id: MarketplaceId,
    #[serde(rename = "data")]
    pub urls: Vec<String>,
}

/// One size of a card being created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSize {
    pub tech_size: String,
    pub wb_size: String,
    pub price: i64,
    pub skus: Vec<String>,
}

/// A card variant for the create endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVariant {
    pub brand: String,
    pub title: String,
    pub description: String,
    pub vendor_code: String,
    pub dimensions: Dimensions,
    pub sizes: Vec<CreateSize>,
    pub characteristics: Vec<Characteristic>,
}

/// Body entry for the bulk card create endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardCreate {
    #[serde(rename = "subjectID")]
    pub subject_id: i64,
    pub variants: Vec<CreateVariant>,
}
