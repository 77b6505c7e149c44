use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default marketplace rate limits (requests per minute).
pub mod rate_limits {
    /// Listing reads: the content API allows up to 100/min, we keep to 70.
    pub const LISTING_PER_MINUTE: u32 = 70;
    /// Bulk card update/create uploads.
    pub const UPLOAD_PER_MINUTE: u32 = 10;
    /// Media save requests, one card per request.
    pub const MEDIA_PER_MINUTE: u32 = 60;
}

/// Token bucket parameters: refill rate per minute and burst capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub per_minute: u32,
    pub burst: u32,
}

impl RateLimit {
    pub const LISTING: Self = Self::per_minute(rate_limits::LISTING_PER_MINUTE);
    pub const UPLOAD: Self = Self::per_minute(rate_limits::UPLOAD_PER_MINUTE);
    pub const MEDIA: Self = Self::per_minute(rate_limits::MEDIA_PER_MINUTE);

    /// A limit whose burst equals its per-minute rate.
    #[must_use]
    pub const fn per_minute(per_minute: u32) -> Self {
        Self {
            per_minute,
            burst: per_minute,
        }
    }
}

/// A token-bucket rate limiter using the governor crate.
///
/// Instances are independent: the listing and upload limiters of one sync
/// never share tokens. Clones share the same bucket.
///
/// # Example
///
/// ```ignore
/// use wbsync::rate_limit::{ApiRateLimiter, RateLimit};
///
/// let limiter = ApiRateLimiter::new(RateLimit::LISTING);
///
/// // Before each API call:
/// limiter.acquire(&cancel).await?;
/// client.page(&settings, &cursor, &cancel).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
    limit: RateLimit,
}

impl ApiRateLimiter {
    /// Create a new rate limiter.
    ///
    /// A zero rate is treated as 1/min; a zero burst falls back to the rate.
    pub fn new(limit: RateLimit) -> Self {
        let per_minute = NonZeroU32::new(limit.per_minute).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(limit.burst).unwrap_or(per_minute);
        let quota = Quota::per_minute(per_minute).allow_burst(burst);

        Self {
            inner: Arc::new(RateLimiter::direct(quota)),
            limit,
        }
    }

    #[must_use]
    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Wait until one token is available.
    ///
    /// Returns [`SyncError::Cancelled`] if `cancel` fires first. Waiters are
    /// not served in FIFO order.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            _ = self.inner.until_ready() => Ok(()),
        }
    }

    /// Take a token only if one is available right now.
    pub fn try_acquire(&self) -> bool {
        self.inner.check().is_ok()
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter")
            .field("limit", &self.limit)
            .finish()
    }
}
