//! Attribute maps and their validation at the catalog boundary.
//!
//! The catalog answers with JSON objects keyed by stringified product id
//! whose values are loosely typed. Each response is checked here once and
//! turned into a typed map; nothing downstream inspects JSON values.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::marketplace::InternalId;

/// Markup applied to cost prices delivered as `{"Z": cost}`.
pub const COST_MARKUP: f64 = 1.15;

pub type StringMap = HashMap<InternalId, String>;
pub type StringListMap = HashMap<InternalId, Vec<String>>;
pub type PriceMap = HashMap<InternalId, f64>;
pub type SizeMap = HashMap<InternalId, Value>;
pub type IdSet = HashSet<InternalId>;

/// The attribute sources exposed by the catalog service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKind {
    Ids,
    Titles,
    Descriptions,
    Brands,
    Prices,
    Barcodes,
    MediaUrls,
    Sizes,
}

impl AttributeKind {
    /// Path segment under `/api/`.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            AttributeKind::Ids => "globalids",
            AttributeKind::Titles => "appellations",
            AttributeKind::Descriptions => "descriptions",
            AttributeKind::Brands => "brands",
            AttributeKind::Prices => "price",
            AttributeKind::Barcodes => "barcodes",
            AttributeKind::MediaUrls => "media",
            AttributeKind::Sizes => "sizes",
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            AttributeKind::Ids => "ids",
            AttributeKind::Titles => "titles",
            AttributeKind::Descriptions => "descriptions",
            AttributeKind::Brands => "brands",
            AttributeKind::Prices => "prices",
            AttributeKind::Barcodes => "barcodes",
            AttributeKind::MediaUrls => "media_urls",
            AttributeKind::Sizes => "sizes",
        }
    }
}

/// One decoded attribute map, tagged by its source.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeMap {
    Ids(IdSet),
    Titles(StringMap),
    Descriptions(StringMap),
    Brands(StringMap),
    Prices(PriceMap),
    Barcodes(StringListMap),
    MediaUrls(StringListMap),
    Sizes(SizeMap),
}

impl AttributeMap {
    #[must_use]
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeMap::Ids(_) => AttributeKind::Ids,
            AttributeMap::Titles(_) => AttributeKind::Titles,
            AttributeMap::Descriptions(_) => AttributeKind::Descriptions,
            AttributeMap::Brands(_) => AttributeKind::Brands,
            AttributeMap::Prices(_) => AttributeKind::Prices,
            AttributeMap::Barcodes(_) => AttributeKind::Barcodes,
            AttributeMap::MediaUrls(_) => AttributeKind::MediaUrls,
            AttributeMap::Sizes(_) => AttributeKind::Sizes,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            AttributeMap::Ids(m) => m.len(),
            AttributeMap::Titles(m) | AttributeMap::Descriptions(m) | AttributeMap::Brands(m) => {
                m.len()
            }
            AttributeMap::Prices(m) => m.len(),
            AttributeMap::Barcodes(m) | AttributeMap::MediaUrls(m) => m.len(),
            AttributeMap::Sizes(m) => m.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Snapshot of every attribute map fetched for one sync invocation.
///
/// Maps are fetched once at the start and never refreshed, so every worker
/// sees the same data. Maps an operation does not need stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub ids: IdSet,
    pub titles: Option<StringMap>,
    pub descriptions: Option<StringMap>,
    pub brands: Option<StringMap>,
    pub prices: Option<PriceMap>,
    pub barcodes: Option<StringListMap>,
    pub media_urls: Option<StringListMap>,
    pub sizes: Option<SizeMap>,
}

impl Attributes {
    /// Store a decoded map in its slot, replacing any previous one.
    pub fn insert(&mut self, map: AttributeMap) {
        match map {
            AttributeMap::Ids(ids) => self.ids = ids,
            AttributeMap::Titles(m) => self.titles = Some(m),
            AttributeMap::Descriptions(m) => self.descriptions = Some(m),
            AttributeMap::Brands(m) => self.brands = Some(m),
            AttributeMap::Prices(m) => self.prices = Some(m),
            AttributeMap::Barcodes(m) => self.barcodes = Some(m),
            AttributeMap::MediaUrls(m) => self.media_urls = Some(m),
            AttributeMap::Sizes(m) => self.sizes = Some(m),
        }
    }

    pub fn title(&self, id: InternalId) -> Option<&str> {
        self.titles.as_ref()?.get(&id).map(String::as_str)
    }

    pub fn description(&self, id: InternalId) -> Option<&str> {
        self.descriptions.as_ref()?.get(&id).map(String::as_str)
    }

    pub fn brand(&self, id: InternalId) -> Option<&str> {
        self.brands.as_ref()?.get(&id).map(String::as_str)
    }

    pub fn price(&self, id: InternalId) -> Option<f64> {
        self.prices.as_ref()?.get(&id).copied()
    }

    pub fn barcodes(&self, id: InternalId) -> Option<&[String]> {
        self.barcodes.as_ref()?.get(&id).map(Vec::as_slice)
    }

    pub fn media_urls(&self, id: InternalId) -> Option<&[String]> {
        self.media_urls.as_ref()?.get(&id).map(Vec::as_slice)
    }
}

// ---------- Decoders ----------

fn parse_key(key: &str) -> Result<InternalId> {
    key.trim()
        .parse()
        .map_err(|_| SyncError::decode(format!("invalid product id key: {key:?}")))
}

fn decode_object(body: &[u8]) -> Result<HashMap<String, Value>> {
    Ok(serde_json::from_slice(body)?)
}

fn decode_entries<T>(
    body: &[u8],
    mut convert: impl FnMut(InternalId, Value) -> Result<T>,
) -> Result<HashMap<InternalId, T>> {
    let raw = decode_object(body)?;
    let mut out = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        let id = parse_key(&key)?;
        out.insert(id, convert(id, value)?);
    }
    Ok(out)
}

/// Decode an id set from either `[1, 2]` or `{"1": ..., "2": ...}`.
pub fn decode_ids(body: &[u8]) -> Result<IdSet> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Array(values) => values
            .into_iter()
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| SyncError::decode(format!("id is not an integer: {v}")))
            })
            .collect(),
        Value::Object(map) => map.keys().map(|k| parse_key(k)).collect(),
        other => Err(SyncError::decode(format!(
            "expected id list or object, got {}",
            json_type(&other)
        ))),
    }
}

pub fn decode_strings(body: &[u8]) -> Result<StringMap> {
    decode_entries(body, |id, value| match value {
        Value::String(s) => Ok(s),
        _ => Err(SyncError::TypeMismatch {
            id,
            expected: "string",
        }),
    })
}

/// Prices are either a plain number or a cost object `{"Z": cost}`.
pub fn decode_prices(body: &[u8]) -> Result<PriceMap> {
    decode_entries(body, |id, value| {
        let mismatch = SyncError::TypeMismatch {
            id,
            expected: "number or object with key Z",
        };
        match value {
            Value::Number(n) => n.as_f64().ok_or(mismatch),
            Value::Object(obj) => obj
                .get("Z")
                .and_then(Value::as_f64)
                .map(|cost| cost * COST_MARKUP)
                .ok_or(mismatch),
            _ => Err(mismatch),
        }
    })
}

/// Barcodes are either one string or an array of strings.
pub fn decode_barcodes(body: &[u8]) -> Result<StringListMap> {
    decode_entries(body, |id, value| match value {
        Value::String(s) => Ok(vec![s]),
        Value::Array(items) => string_list(id, items, "string or array of strings"),
        _ => Err(SyncError::TypeMismatch {
            id,
            expected: "string or array of strings",
        }),
    })
}

pub fn decode_string_lists(body: &[u8]) -> Result<StringListMap> {
    decode_entries(body, |id, value| match value {
        Value::Array(items) => string_list(id, items, "array of strings"),
        _ => Err(SyncError::TypeMismatch {
            id,
            expected: "array of strings",
        }),
    })
}

pub fn decode_sizes(body: &[u8]) -> Result<SizeMap> {
    decode_entries(body, |_, value| Ok(value))
}

fn string_list(id: InternalId, items: Vec<Value>, expected: &'static str) -> Result<Vec<String>> {
    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            _ => Err(SyncError::TypeMismatch { id, expected }),
        })
        .collect()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
