//! Social-media publish targets.
//!
//! Every platform implements [`PublishTarget`], so the cycle iterates a list
//! of targets instead of knowing about any platform. Implementations make
//! exactly one attempt per call; retries are layered on from outside with
//! [`crate::retry::with_retry_if`] and [`PublishError::is_retryable`].
//!
//! - [`bluesky`] - AT Protocol session, rich-text facets, link-card embeds
//! - [`mastodon`] - bearer-token status post

pub mod bluesky;
pub mod facets;
pub mod mastodon;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use bluesky::{BlueskyClient, BlueskyConfig};
pub use facets::{extract_facets, ByteSlice, Facet, FacetFeature};
pub use mastodon::{MastodonClient, MastodonConfig};

/// Timeout for any single platform API call
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept for logs
const MAX_ERROR_BODY: usize = 512;

/// Errors from a single publish attempt.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// The platform rejected the request
    #[error("HTTP error: status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// Login failed; credentials are wrong or revoked
    #[error("Authentication failed: {0}")]
    Auth(String),
    /// An established session was rejected; the next attempt logs in again
    #[error("Session expired: {0}")]
    SessionExpired(String),
    /// A 2xx response whose body we could not understand
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

impl PublishError {
    /// Returns true if this error is transient and the attempt should be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::Network(_) | PublishError::Timeout | PublishError::SessionExpired(_) => {
                true
            }
            PublishError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            PublishError::Auth(_) | PublishError::InvalidResponse(_) => false,
        }
    }
}

/// Something that can announce a post.
#[async_trait]
pub trait PublishTarget: Send + Sync {
    /// Short name used in logs ("bluesky", "mastodon").
    fn name(&self) -> &str;

    /// Makes one attempt to publish `text`. `link` is the article URL the
    /// text refers to; targets that render link previews use it.
    async fn publish(&self, text: &str, link: Option<&str>) -> Result<(), PublishError>;
}

/// Sends a request with the shared timeout and maps non-2xx responses to
/// [`PublishError::HttpStatus`], keeping the start of the body for logs.
pub(crate) async fn send_checked(
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, PublishError> {
    let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
        .await
        .map_err(|_| PublishError::Timeout)?
        .map_err(PublishError::Network)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = crate::util::truncate_chars(body.trim(), MAX_ERROR_BODY).into_owned();
    Err(PublishError::HttpStatus {
        status: status.as_u16(),
        body,
    })
}
