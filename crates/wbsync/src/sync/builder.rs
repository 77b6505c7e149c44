//! Card builder: turns a discovered item plus catalog attributes into an
//! upload payload for one card operation.

use serde::Serialize;

use super::discovery::DiscoveredItem;
use super::types::{ANONYMOUS_PACKAGE_IMAGE, CardOperation, SyncOptions};
use crate::catalog::Attributes;
use crate::error::{Result, SyncError};
use crate::marketplace::{
    CardCreate, CardUpdate, CreateSize, CreateVariant, InternalId, MarketplaceId, MediaUpdate,
};
use crate::text::{DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS, normalise};

/// An upload payload. Serialises as the bare inner document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CardPayload {
    Update(CardUpdate),
    Media(MediaUpdate),
    Create(CardCreate),
}

impl CardPayload {
    /// Marketplace id the payload targets. Created cards have none yet.
    #[must_use]
    pub fn marketplace_id(&self) -> Option<MarketplaceId> {
        match self {
            CardPayload::Update(card) => Some(card.marketplace_id),
            CardPayload::Media(media) => Some(media.marketplace_id),
            CardPayload::Create(_) => None,
        }
    }

    /// Key the marketplace uses when it reports an article as banned:
    /// the stringified marketplace id, or the vendor code for new cards.
    #[must_use]
    pub fn article_key(&self) -> String {
        match self {
            CardPayload::Update(card) => card.marketplace_id.to_string(),
            CardPayload::Media(media) => media.marketplace_id.to_string(),
            CardPayload::Create(card) => card
                .variants
                .first()
                .map(|v| v.vendor_code.clone())
                .unwrap_or_default(),
        }
    }

    /// Size contribution used by the batcher: title plus description bytes.
    #[must_use]
    pub fn size_estimate(&self) -> usize {
        match self {
            CardPayload::Update(card) => card.title.len() + card.description.len(),
            CardPayload::Media(media) => media.urls.iter().map(String::len).sum(),
            CardPayload::Create(card) => card
                .variants
                .iter()
                .map(|v| v.title.len() + v.description.len())
                .sum(),
        }
    }
}

fn required<'a>(value: Option<&'a str>, field: &str, id: InternalId) -> Result<&'a str> {
    value.ok_or_else(|| SyncError::validation(format!("no {field} for id {id}")))
}

/// Build the payload for `operation` from a discovered item.
///
/// All update payloads keep the item's marketplace id and every field the
/// operation does not replace.
pub fn build(
    operation: CardOperation,
    discovered: &DiscoveredItem,
    attributes: &Attributes,
    options: &SyncOptions,
) -> Result<CardPayload> {
    let item = &discovered.item;
    let id = discovered.internal_id;

    match operation {
        CardOperation::Rename => {
            let title = required(attributes.title(id), "title", id)?;
            let description = attributes
                .description(id)
                .map(|d| normalise(d, DESCRIPTION_MAX_CHARS))
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| normalise(title, DESCRIPTION_MAX_CHARS));

            let mut card = CardUpdate::from(item);
            card.title = normalise(title, TITLE_MAX_CHARS);
            card.description = description;
            Ok(CardPayload::Update(card))
        }
        CardOperation::Brand => {
            let brand = required(attributes.brand(id), "brand", id)?;
            let mut card = CardUpdate::from(item);
            card.brand = brand.trim().to_string();
            Ok(CardPayload::Update(card))
        }
        CardOperation::Package => {
            let mut card = CardUpdate::from(item);
            card.dimensions = item.dimensions.or_defaults(options.package_defaults);
            Ok(CardPayload::Update(card))
        }
        CardOperation::Media => {
            let supplied = attributes.media_urls(id).unwrap_or_default();
            if supplied.is_empty() || supplied.len() < item.photos.len() {
                return Err(SyncError::MediaFilesInsufficient {
                    marketplace_id: item.marketplace_id,
                    photos: item.photos.len(),
                    urls: supplied.len(),
                });
            }

            let mut urls = supplied.to_vec();
            if urls.len() == 1 {
                urls.push(urls[0].clone());
            }
            urls.push(ANONYMOUS_PACKAGE_IMAGE.to_string());

            Ok(CardPayload::Media(MediaUpdate {
                marketplace_id: item.marketplace_id,
                urls,
            }))
        }
        CardOperation::Create => Err(SyncError::validation(format!(
            "item {} already exists on the marketplace",
            item.marketplace_id
        ))),
    }
}

/// Build a new card for a catalog id that has no marketplace counterpart.
pub fn build_create(
    id: InternalId,
    attributes: &Attributes,
    options: &SyncOptions,
) -> Result<CardPayload> {
    let title = normalise(attributes.title(id).unwrap_or_default(), TITLE_MAX_CHARS);
    let description = normalise(
        attributes.description(id).unwrap_or_default(),
        DESCRIPTION_MAX_CHARS,
    );
    let price = attributes.price(id).unwrap_or_default();

    let variant = CreateVariant {
        brand: attributes.brand(id).unwrap_or_default().trim().to_string(),
        title,
        description,
        vendor_code: format!("id-{id}-{}", options.identity_code),
        dimensions: options.package_defaults,
        sizes: vec![CreateSize {
            tech_size: "0".to_string(),
            wb_size: String::new(),
            price: (price * 2.0).round() as i64,
            skus: attributes.barcodes(id).map(<[String]>::to_vec).unwrap_or_default(),
        }],
        characteristics: Vec::new(),
    };
    validate_variant(&variant)?;

    Ok(CardPayload::Create(CardCreate {
        subject_id: options.subject_id,
        variants: vec![variant],
    }))
}

fn validate_variant(variant: &CreateVariant) -> Result<()> {
    for (field, value) in [
        ("brand", &variant.brand),
        ("title", &variant.title),
        ("description", &variant.description),
        ("vendorCode", &variant.vendor_code),
    ] {
        if value.trim().is_empty() {
            return Err(SyncError::validation(format!(
                "{}: {field} is empty",
                variant.vendor_code
            )));
        }
    }
    if !variant.dimensions.is_positive() {
        return Err(SyncError::validation(format!(
            "{}: dimensions must be positive",
            variant.vendor_code
        )));
    }
    if let Some(size) = variant.sizes.iter().find(|s| s.price <= 0) {
        return Err(SyncError::validation(format!(
            "{}: size {:?} has price {}",
            variant.vendor_code, size.tech_size, size.price
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AttributeMap;
    use crate::marketplace::{Dimensions, Item, Photo};
    use std::collections::HashMap;

    fn item(id: i64, photos: usize) -> DiscoveredItem {
        let item: Item = serde_json::from_value(serde_json::json!({
            "nmID": 1000 + id,
            "vendorCode": format!("id-{id}-7"),
            "brand": "Old brand",
            "title": "Old title",
            "description": "Old description",
            "dimensions": {"length": 0, "width": 50, "height": 0},
            "characteristics": [{"id": 1, "value": ["red"]}],
            "sizes": [{"chrtID": 5, "techSize": "0", "skus": ["111"]}],
        }))
        .expect("item json");
        DiscoveredItem {
            internal_id: id,
            item: Item {
                photos: vec![Photo::default(); photos],
                ..item
            },
        }
    }

    fn attributes() -> Attributes {
        let mut attrs = Attributes::default();
        attrs.insert(AttributeMap::Ids([1, 2].into_iter().collect()));
        attrs.insert(AttributeMap::Titles(HashMap::from([
            (1, "<b>New</b> title".to_string()),
            (2, "Fallback title".to_string()),
        ])));
        attrs.insert(AttributeMap::Descriptions(HashMap::from([(
            1,
            "New description".to_string(),
        )])));
        attrs.insert(AttributeMap::Brands(HashMap::from([(1, " Acme ".to_string())])));
        attrs.insert(AttributeMap::Prices(HashMap::from([(1, 100.4), (2, 0.0)])));
        attrs.insert(AttributeMap::Barcodes(HashMap::from([(
            1,
            vec!["460".to_string(), "461".to_string()],
        )])));
        attrs.insert(AttributeMap::MediaUrls(HashMap::from([
            (1, vec!["https://img/1.png".to_string()]),
            (2, vec!["https://img/a.png".to_string(), "https://img/b.png".to_string()]),
        ])));
        attrs
    }

    fn options() -> SyncOptions {
        SyncOptions {
            package_defaults: Dimensions::new(100, 100, 100),
            identity_code: 42,
            subject_id: 3091,
            ..SyncOptions::default()
        }
    }

    fn update(payload: CardPayload) -> CardUpdate {
        match payload {
            CardPayload::Update(card) => card,
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn rename_replaces_only_text_fields() {
        let card = update(build(CardOperation::Rename, &item(1, 0), &attributes(), &options()).unwrap());
        assert_eq!(card.marketplace_id, 1001);
        assert_eq!(card.title, "New title");
        assert_eq!(card.description, "New description");
        assert_eq!(card.brand, "Old brand");
        assert_eq!(card.sizes.len(), 1);
        assert_eq!(card.characteristics.len(), 1);
    }

    #[test]
    fn rename_falls_back_to_title_for_description() {
        let card = update(build(CardOperation::Rename, &item(2, 0), &attributes(), &options()).unwrap());
        assert_eq!(card.title, "Fallback title");
        assert_eq!(card.description, "Fallback title");
    }

    #[test]
    fn rename_round_trips_through_json() {
        let payload = build(CardOperation::Rename, &item(1, 0), &attributes(), &options()).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["nmID"], 1001);
        assert!(json.get("Update").is_none());

        let parsed: CardUpdate = serde_json::from_value(json).unwrap();
        assert_eq!(CardPayload::Update(parsed), payload);
    }

    #[test]
    fn brand_replaces_brand() {
        let card = update(build(CardOperation::Brand, &item(1, 0), &attributes(), &options()).unwrap());
        assert_eq!(card.brand, "Acme");
        assert_eq!(card.title, "Old title");
    }

    #[test]
    fn brand_missing_is_validation_error() {
        let err = build(CardOperation::Brand, &item(2, 0), &attributes(), &options()).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn package_fills_missing_dimensions() {
        let card = update(build(CardOperation::Package, &item(1, 0), &attributes(), &options()).unwrap());
        assert_eq!(card.dimensions, Dimensions::new(100, 50, 100));
    }

    #[test]
    fn media_with_single_url_and_two_photos_is_insufficient() {
        let err = build(CardOperation::Media, &item(1, 2), &attributes(), &options()).unwrap_err();
        assert!(matches!(
            err,
            SyncError::MediaFilesInsufficient {
                photos: 2,
                urls: 1,
                ..
            }
        ));
        assert!(err.is_per_item());
    }

    #[test]
    fn media_duplicates_single_url_and_appends_sentinel() {
        let payload = build(CardOperation::Media, &item(1, 1), &attributes(), &options()).unwrap();
        let CardPayload::Media(media) = payload else {
            panic!("expected media payload");
        };
        assert_eq!(media.marketplace_id, 1001);
        assert_eq!(
            media.urls,
            vec![
                "https://img/1.png".to_string(),
                "https://img/1.png".to_string(),
                ANONYMOUS_PACKAGE_IMAGE.to_string(),
            ]
        );
    }

    #[test]
    fn media_serialises_as_nm_id_and_data() {
        let payload = build(CardOperation::Media, &item(2, 2), &attributes(), &options()).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["nmId"], 1002);
        assert_eq!(json["data"].as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn create_builds_full_card() {
        let payload = build_create(1, &attributes(), &options()).unwrap();
        let CardPayload::Create(card) = &payload else {
            panic!("expected create payload");
        };
        assert_eq!(card.subject_id, 3091);
        let variant = &card.variants[0];
        assert_eq!(variant.vendor_code, "id-1-42");
        assert_eq!(variant.brand, "Acme");
        assert_eq!(variant.title, "New title");
        assert_eq!(variant.dimensions, Dimensions::new(100, 100, 100));
        assert_eq!(variant.sizes[0].price, 201);
        assert_eq!(variant.sizes[0].skus, vec!["460".to_string(), "461".to_string()]);
        assert_eq!(payload.article_key(), "id-1-42");
        assert_eq!(payload.marketplace_id(), None);
    }

    #[test]
    fn create_rejects_missing_fields_and_bad_price() {
        // id 2 has no brand, no description and a zero price.
        let err = build_create(2, &attributes(), &options()).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));

        let mut attrs = attributes();
        attrs.insert(AttributeMap::Prices(HashMap::from([(1, 0.0)])));
        let err = build_create(1, &attrs, &options()).unwrap_err();
        assert!(err.to_string().contains("price"));
    }

    #[test]
    fn create_rejects_non_positive_dimensions() {
        let options = SyncOptions {
            package_defaults: Dimensions::new(100, 0, 100),
            ..options()
        };
        let err = build_create(1, &attributes(), &options).unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn update_for_create_operation_is_rejected() {
        let err = build(CardOperation::Create, &item(1, 0), &attributes(), &options()).unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn size_estimate_counts_title_and_description_bytes() {
        let payload = build(CardOperation::Rename, &item(1, 0), &attributes(), &options()).unwrap();
        assert_eq!(payload.size_estimate(), "New title".len() + "New description".len());
    }
}
