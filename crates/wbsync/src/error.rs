use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur while syncing cards with the marketplace.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport-level failure (connection refused, reset, timeout).
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    /// The remote service answered with a non-success status.
    #[error("Upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// A response body could not be decoded.
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// An attribute map carried a value of the wrong type for an id.
    #[error("Attribute for id {id} is not {expected}")]
    TypeMismatch { id: i64, expected: &'static str },

    /// The supplier has fewer media URLs than the card already shows.
    #[error("Item {marketplace_id} has {photos} photos but only {urls} media URLs")]
    MediaFilesInsufficient {
        marketplace_id: i64,
        photos: usize,
        urls: usize,
    },

    /// The card builder rejected an item.
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// Every entry of a batch was rejected as a banned article.
    #[error("Upload rejected: {body}")]
    UploadRejected { body: String },

    /// Invalid configuration (bad URL, missing credentials).
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl SyncError {
    /// Create a non-retryable network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Create a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create a validation error.
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this error is a cancellation.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is a transient transport failure worth retrying.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network {
                retryable: true,
                ..
            }
        )
    }

    /// Check if this error concerns a single item and must not stop the pipeline.
    #[inline]
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::MediaFilesInsufficient { .. }
                | Self::Validation { .. }
                | Self::UploadRejected { .. }
        )
    }
}

impl From<HttpError> for SyncError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Transport { message, retryable } => Self::Network { message, retryable },
            HttpError::Timeout => Self::network("request timed out"),
            HttpError::NoMockResponse { method, url } => {
                Self::network(format!("no mock response registered for {method} {url}"))
            }
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err.to_string())
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps progress events
/// readable when an upstream body spans several lines.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
