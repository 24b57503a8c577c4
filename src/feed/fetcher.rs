use crate::feed::parser::{parse_feed, Post};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Identifies the bot to feed hosts; some CDNs reject requests without one.
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; reposter/",
    env!("CARGO_PKG_VERSION"),
    "; +https://github.com/dhofheinz/reposter)"
);
pub const ACCEPT: &str = "application/rss+xml, application/xml, text/xml, */*";

/// Errors that can occur while retrieving the feed.
///
/// A fetch never retries on its own; the caller wraps it in
/// [`crate::retry::with_retry`] and uses [`FetchError::is_retryable`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// Returns true if another attempt could plausibly succeed.
    ///
    /// 4xx responses are permanent except 408 (timeout) and 429 (rate limit).
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout | FetchError::IncompleteResponse { .. } => {
                true
            }
            FetchError::HttpStatus(status) => *status >= 500 || *status == 408 || *status == 429,
            FetchError::ResponseTooLarge => false,
        }
    }
}

/// Fetches the feed at `url` and parses it into posts.
///
/// Sends an identifying `User-Agent` and an `Accept` header favoring XML.
/// A non-2xx status is an error; malformed items inside a 2xx body are not.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<Vec<Post>, FetchError> {
    let request = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .header(reqwest::header::ACCEPT, ACCEPT);

    let response = tokio::time::timeout(FETCH_TIMEOUT, request.send())
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(FetchError::Network)?;

    if !response.status().is_success() {
        return Err(FetchError::HttpStatus(response.status().as_u16()));
    }

    let bytes = read_limited_bytes(response, MAX_FEED_SIZE).await?;
    let markup = String::from_utf8_lossy(&bytes);
    let posts = parse_feed(&markup);

    tracing::debug!(feed = %url, bytes = bytes.len(), posts = posts.len(), "Feed fetched");
    Ok(posts)
}

/// Reads a response body, failing if it exceeds `limit` bytes or comes up
/// short of its declared Content-Length.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
