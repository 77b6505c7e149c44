//! Marketplace content API client: listing pager and upload endpoints.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::types::{Cursor, Item, ListingRequest, ListingResponse, ListingSettings};
use crate::error::{Result, SyncError};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::retry::{RetryConfig, with_retry};
use crate::sync::ProgressCallback;

/// Default content API host.
pub const DEFAULT_BASE_URL: &str = "https://content-api.wildberries.ru";

/// Per-request timeout for listing pages.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(100);

/// Per-request timeout for update, create and media uploads.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

const LISTING_PATH: &str = "/content/v2/get/cards/list";

/// Write endpoints of the content API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadEndpoint {
    /// Bulk card update.
    Update,
    /// Bulk card create.
    Create,
    /// Media save, one card per request.
    Media,
}

impl UploadEndpoint {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            UploadEndpoint::Update => "/content/v2/cards/update",
            UploadEndpoint::Create => "/content/v2/cards/upload",
            UploadEndpoint::Media => "/content/v3/media/save",
        }
    }
}

/// Marketplace API client.
///
/// Holds a shared, connection-pooled transport. Rate limiting is the
/// caller's concern; the discovery pipeline and uploader each own a limiter.
#[derive(Clone)]
pub struct MarketplaceClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
    retry: RetryConfig,
}

impl MarketplaceClient {
    /// Create a client backed by reqwest.
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let transport = ReqwestTransport::with_timeout(LISTING_TIMEOUT)
            .map_err(|e| SyncError::config(e.to_string()))?;
        Ok(Self::new_with_transport(base_url, token, Arc::new(transport)))
    }

    pub fn new_with_transport(
        base_url: &str,
        token: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryConfig::default(),
        }
    }

    /// Override the retry policy for listing pages.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn listing_url(&self, locale: Option<&str>) -> String {
        match locale {
            Some(locale) if !locale.is_empty() => {
                format!("{}?locale={}", self.url(LISTING_PATH), locale)
            }
            _ => self.url(LISTING_PATH),
        }
    }

    /// Fetch one listing page without retrying.
    pub async fn fetch_page(
        &self,
        settings: &ListingSettings,
        locale: Option<&str>,
    ) -> Result<ListingResponse> {
        let body = serde_json::to_vec(&ListingRequest { settings })?;
        let request = HttpRequest::post_json(self.listing_url(locale), body)
            .bearer(&self.token)
            .timeout(LISTING_TIMEOUT);

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            return Err(SyncError::Upstream {
                status: response.status,
                body: response.body_text(),
            });
        }

        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Fetch the page starting at `cursor`.
    ///
    /// Dropped connections are retried with a fixed delay; any other failure
    /// is returned as-is. Items come back in endpoint order.
    #[tracing::instrument(skip(self, settings, cancel, on_progress), fields(cursor_id = cursor.last_id, limit = cursor.limit))]
    pub async fn page(
        &self,
        settings: &ListingSettings,
        cursor: &Cursor,
        locale: Option<&str>,
        cancel: &CancellationToken,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<Item>> {
        let settings = settings.with_cursor(cursor.clone());
        let response = with_retry(
            || self.fetch_page(&settings, locale),
            self.retry,
            cancel,
            on_progress,
        )
        .await?;

        tracing::debug!(
            count = response.cards.len(),
            total = response.cursor.total,
            "Fetched listing page"
        );
        Ok(response.cards)
    }

    /// POST a JSON body to a write endpoint.
    ///
    /// Returns the raw response; status handling belongs to the uploader.
    pub async fn post(
        &self,
        endpoint: UploadEndpoint,
        body: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        tracing::debug!(
            endpoint = endpoint.path(),
            body_bytes = body.len(),
            "Sending upload request"
        );
        let request = HttpRequest::post_json(self.url(endpoint.path()), body)
            .bearer(&self.token)
            .timeout(UPLOAD_TIMEOUT);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            result = self.transport.send(request) => Ok(result?),
        }
    }
}
