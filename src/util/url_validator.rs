use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// Credentials would be sent over plain HTTP to a non-local host.
    #[error("Insecure URL: HTTPS required for {0} (plain HTTP allowed for localhost only)")]
    Insecure(String),
}

/// Validates a feed URL.
///
/// Feeds are fetched anonymously, so any http(s) URL with a host is accepted.
///
/// # Examples
///
/// ```
/// use reposter::util::validate_feed_url;
///
/// assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    if url.host_str().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    Ok(url)
}

/// Validates the base URL of an authenticated API endpoint.
///
/// Access tokens and app passwords travel with every request, so HTTPS is
/// required. Plain HTTP is allowed only for loopback hosts (local testing).
///
/// # Examples
///
/// ```
/// use reposter::util::validate_api_base;
///
/// assert!(validate_api_base("https://mastodon.social").is_ok());
/// assert!(validate_api_base("http://127.0.0.1:8080").is_ok());
/// assert!(validate_api_base("http://mastodon.social").is_err());
/// ```
pub fn validate_api_base(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = validate_feed_url(url_str)?;

    if url.scheme() == "http" && !is_loopback_host(&url) {
        return Err(UrlValidationError::Insecure(
            url.host_str().unwrap_or_default().to_owned(),
        ));
    }

    Ok(url)
}

fn is_loopback_host(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host == "localhost" {
        return true;
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    host_for_parse
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}
