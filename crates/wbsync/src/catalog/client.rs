//! Client for the internal catalog (attribute) service.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use super::types::{
    AttributeKind, AttributeMap, IdSet, PriceMap, SizeMap, StringListMap, StringMap, decode_barcodes,
    decode_ids, decode_prices, decode_sizes, decode_string_lists, decode_strings,
};
use crate::error::{Result, SyncError};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpRequest, HttpTransport};
use crate::marketplace::InternalId;

/// Default per-request timeout for catalog calls.
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Request body shared by every attribute endpoint. Empty ids mean "all".
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterRequest<'a> {
    #[serde(rename = "productIDs")]
    product_ids: &'a [InternalId],
    #[serde(skip_serializing_if = "Option::is_none")]
    include_empty_descriptions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    censored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<u32>,
}

impl<'a> FilterRequest<'a> {
    fn ids(product_ids: &'a [InternalId]) -> Self {
        Self {
            product_ids,
            include_empty_descriptions: None,
            censored: None,
            image_size: None,
        }
    }
}

/// Media preferences sent with `/api/media`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaOptions {
    pub censored: bool,
    pub image_size: Option<u32>,
}

/// Catalog attribute client.
///
/// Every call is a single POST with a JSON body; failures are returned to
/// the caller without retrying.
#[derive(Clone)]
pub struct CatalogClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    timeout: Duration,
    media: MediaOptions,
}

impl CatalogClient {
    /// Create a client backed by reqwest.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(timeout)
            .map_err(|e| SyncError::config(e.to_string()))?;
        Self::new_with_transport(base_url, Arc::new(transport)).map(|c| c.with_timeout(timeout))
    }

    pub fn new_with_transport(base_url: &str, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| SyncError::config(format!("invalid catalog URL {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SyncError::config(format!(
                "catalog URL must be http or https: {base_url}"
            )));
        }

        Ok(Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: DEFAULT_CATALOG_TIMEOUT,
            media: MediaOptions::default(),
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_media_options(mut self, media: MediaOptions) -> Self {
        self.media = media;
        self
    }

    fn url(&self, kind: AttributeKind) -> String {
        format!("{}/api/{}", self.base_url, kind.path())
    }

    async fn post(&self, kind: AttributeKind, body: &FilterRequest<'_>) -> Result<Vec<u8>> {
        let request = HttpRequest::post_json(self.url(kind), serde_json::to_vec(body)?)
            .timeout(self.timeout);

        tracing::debug!(
            attribute = kind.name(),
            ids = body.product_ids.len(),
            "Fetching catalog attributes"
        );

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(SyncError::Upstream {
                status: response.status,
                body: response.body_text(),
            });
        }
        Ok(response.body)
    }

    /// Every internal id the catalog knows about.
    pub async fn ids(&self) -> Result<IdSet> {
        let body = self.post(AttributeKind::Ids, &FilterRequest::ids(&[])).await?;
        decode_ids(&body)
    }

    pub async fn titles(&self, ids: &[InternalId]) -> Result<StringMap> {
        let body = self.post(AttributeKind::Titles, &FilterRequest::ids(ids)).await?;
        decode_strings(&body)
    }

    pub async fn descriptions(&self, ids: &[InternalId], include_empty: bool) -> Result<StringMap> {
        let request = FilterRequest {
            include_empty_descriptions: Some(include_empty),
            ..FilterRequest::ids(ids)
        };
        let body = self.post(AttributeKind::Descriptions, &request).await?;
        decode_strings(&body)
    }

    pub async fn brands(&self, ids: &[InternalId]) -> Result<StringMap> {
        let body = self.post(AttributeKind::Brands, &FilterRequest::ids(ids)).await?;
        decode_strings(&body)
    }

    pub async fn prices(&self, ids: &[InternalId]) -> Result<PriceMap> {
        let body = self.post(AttributeKind::Prices, &FilterRequest::ids(ids)).await?;
        decode_prices(&body)
    }

    pub async fn barcodes(&self, ids: &[InternalId]) -> Result<StringListMap> {
        let body = self.post(AttributeKind::Barcodes, &FilterRequest::ids(ids)).await?;
        decode_barcodes(&body)
    }

    pub async fn media_urls(
        &self,
        ids: &[InternalId],
        censored: bool,
        image_size: Option<u32>,
    ) -> Result<StringListMap> {
        let request = FilterRequest {
            censored: Some(censored),
            image_size,
            ..FilterRequest::ids(ids)
        };
        let body = self.post(AttributeKind::MediaUrls, &request).await?;
        decode_string_lists(&body)
    }

    pub async fn sizes(&self, ids: &[InternalId]) -> Result<SizeMap> {
        let body = self.post(AttributeKind::Sizes, &FilterRequest::ids(ids)).await?;
        decode_sizes(&body)
    }

    /// Fetch one attribute source by kind.
    ///
    /// Descriptions are fetched without empty entries; media uses the
    /// client's [`MediaOptions`].
    pub async fn fetch(&self, kind: AttributeKind, ids: &[InternalId]) -> Result<AttributeMap> {
        Ok(match kind {
            AttributeKind::Ids => AttributeMap::Ids(self.ids().await?),
            AttributeKind::Titles => AttributeMap::Titles(self.titles(ids).await?),
            AttributeKind::Descriptions => {
                AttributeMap::Descriptions(self.descriptions(ids, false).await?)
            }
            AttributeKind::Brands => AttributeMap::Brands(self.brands(ids).await?),
            AttributeKind::Prices => AttributeMap::Prices(self.prices(ids).await?),
            AttributeKind::Barcodes => AttributeMap::Barcodes(self.barcodes(ids).await?),
            AttributeKind::MediaUrls => AttributeMap::MediaUrls(
                self.media_urls(ids, self.media.censored, self.media.image_size)
                    .await?,
            ),
            AttributeKind::Sizes => AttributeMap::Sizes(self.sizes(ids).await?),
        })
    }
}
