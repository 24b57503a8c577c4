//! reposter: announces new articles from an RSS feed on Bluesky and Mastodon.
//!
//! A cycle fetches the feed, skips posts already recorded by the
//! [`tracker::PostTracker`], formats each new post into a short message and
//! hands it to every configured [`publish::PublishTarget`]. See
//! [`cycle::Orchestrator`] for the ordering and failure rules.

pub mod config;
pub mod cycle;
pub mod feed;
pub mod format;
pub mod publish;
pub mod retry;
pub mod storage;
pub mod tracker;
pub mod util;
