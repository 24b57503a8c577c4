//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: scheme checks for the feed URL and HTTPS enforcement
//!   for credentialed API endpoints
//! - **Text processing**: character-aware length calculation and truncation
//!
//! # Examples
//!
//! ```
//! use reposter::util::{char_len, truncate_chars, validate_feed_url};
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! assert_eq!(url.host_str(), Some("example.com"));
//!
//! assert_eq!(char_len("📝 New post"), 10);
//! assert_eq!(truncate_chars("Long article title", 10), "Long ar...");
//! ```

mod text;
mod url_validator;

pub use text::{char_len, truncate_chars};
pub use url_validator::{validate_api_base, validate_feed_url, UrlValidationError};
