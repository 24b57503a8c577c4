//! Feed retrieval and parsing.
//!
//! - [`parser`] - Tag-based extraction of `<item>` blocks into [`Post`]s.
//!   Malformed items are skipped individually, never failing the whole parse.
//! - [`fetcher`] - Single HTTP GET of the feed with size and time limits.
//!   Retries are layered on by the caller.
//!
//! # Example
//!
//! ```ignore
//! use reposter::feed::fetch_feed;
//!
//! let posts = fetch_feed(&client, "https://example.com/feed").await?;
//! for post in &posts {
//!     println!("{} -> {}", post.title, post.link);
//! }
//! ```

mod fetcher;
mod parser;

pub use fetcher::{fetch_feed, FetchError, ACCEPT, USER_AGENT};
pub(crate) use fetcher::read_limited_bytes;
pub use parser::{decode_text, parse_feed, Post};
