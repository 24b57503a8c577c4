//! One polling cycle: fetch, filter unseen, format, publish, record.
//!
//! Posts are handled strictly one after another. For each unseen post every
//! target gets its own retried attempt, and a failure on one target never
//! stops the others. Once all targets have been tried the post is recorded
//! in the tracker, even if every target failed (see [`MarkPolicy`]), so a
//! post is announced at most once across cycles.
//!
//! A fetch that still fails after retries aborts the cycle before anything
//! is published. A tracker failure aborts the cycle wherever it happens.

use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use crate::feed::{fetch_feed, FetchError, Post};
use crate::format::{MessageFormat, DEFAULT_MAX_LENGTH};
use crate::publish::{PublishError, PublishTarget};
use crate::retry::{with_retry_if, RetryPolicy};
use crate::storage::DatabaseError;
use crate::tracker::PostTracker;

/// When a post counts as announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkPolicy {
    /// Record after every target was attempted, whatever the outcome.
    /// Never re-announces; may permanently miss a target.
    #[default]
    AfterAttempt,
    /// Record only if at least one target succeeded; otherwise the post is
    /// retried next cycle.
    RequireSuccess,
}

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Post tracker failure: {0}")]
    Store(#[from] DatabaseError),
    #[error("No publish targets are configured")]
    NoTargets,
}

/// Tunables for a cycle.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub feed_url: String,
    /// Skip the publish calls; everything else runs.
    pub dry_run: bool,
    /// In a dry run, still record each post as announced, so switching to a
    /// live run does not re-announce the backlog. `false` leaves the tracker
    /// untouched.
    pub dry_run_records: bool,
    pub max_length: usize,
    /// Pause between consecutive unseen posts, for platform rate limits.
    pub post_delay: Duration,
    pub retry: RetryPolicy,
    pub mark_policy: MarkPolicy,
    pub message: MessageFormat,
}

impl CycleOptions {
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            dry_run: false,
            dry_run_records: true,
            max_length: DEFAULT_MAX_LENGTH,
            post_delay: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            mark_policy: MarkPolicy::default(),
            message: MessageFormat::default(),
        }
    }
}

/// Outcome of publishing one post to one target. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishAttemptResult {
    pub target: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Counters for one cycle, mainly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Posts the parser returned
    pub fetched: usize,
    /// Posts not yet on record
    pub unseen: usize,
    /// Posts recorded in the tracker this cycle
    pub marked: usize,
    pub publish_succeeded: usize,
    pub publish_failed: usize,
}

/// Drives polling cycles against a fixed set of targets.
pub struct Orchestrator {
    client: reqwest::Client,
    tracker: PostTracker,
    targets: Vec<Box<dyn PublishTarget>>,
    options: CycleOptions,
}

impl Orchestrator {
    /// Fails with [`CycleError::NoTargets`] when there is nothing to publish
    /// to and this is not a dry run: marking posts without any attempt would
    /// silently drop them.
    pub fn new(
        client: reqwest::Client,
        tracker: PostTracker,
        targets: Vec<Box<dyn PublishTarget>>,
        options: CycleOptions,
    ) -> Result<Self, CycleError> {
        if targets.is_empty() && !options.dry_run {
            return Err(CycleError::NoTargets);
        }
        Ok(Self {
            client,
            tracker,
            targets,
            options,
        })
    }

    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name()).collect()
    }

    /// Runs one complete cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let span = tracing::info_span!(
            "cycle",
            feed = %self.options.feed_url,
            dry_run = self.options.dry_run
        );
        async {
            let result = self.run_cycle_inner().await;
            match &result {
                Ok(report) if report.unseen == 0 => {
                    tracing::info!(fetched = report.fetched, "No new posts to share");
                }
                Ok(report) => tracing::info!(
                    fetched = report.fetched,
                    unseen = report.unseen,
                    marked = report.marked,
                    succeeded = report.publish_succeeded,
                    failed = report.publish_failed,
                    "Cycle complete"
                ),
                Err(e) => tracing::error!(error = %e, "Cycle aborted"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_cycle_inner(&self) -> Result<CycleReport, CycleError> {
        let mut report = CycleReport::default();

        tracing::info!("Fetching feed");
        let client = &self.client;
        let url = self.options.feed_url.as_str();
        let posts = with_retry_if(
            self.options.retry,
            "fetch feed",
            || fetch_feed(client, url),
            FetchError::is_retryable,
        )
        .await?;
        report.fetched = posts.len();
        tracing::info!(posts = posts.len(), "Found posts in feed");

        let unseen = self.filter_unseen(posts).await?;
        report.unseen = unseen.len();

        for (index, post) in unseen.iter().enumerate() {
            if index > 0 && !self.options.post_delay.is_zero() {
                tokio::time::sleep(self.options.post_delay).await;
            }

            let outcome = self.process_post(post).await?;
            report.publish_succeeded += outcome.succeeded;
            report.publish_failed += outcome.failed;
            if outcome.marked {
                report.marked += 1;
            }
        }

        Ok(report)
    }

    /// Drops posts already on record (and repeated guids within this feed),
    /// then orders the rest oldest first so announcements read chronologically.
    async fn filter_unseen(&self, posts: Vec<Post>) -> Result<Vec<Post>, CycleError> {
        let mut seen_in_feed = HashSet::new();
        let mut unseen = Vec::new();

        for post in posts {
            if !seen_in_feed.insert(post.guid.clone()) {
                tracing::debug!(guid = %post.guid, "Duplicate guid in feed, skipping");
                continue;
            }
            if self.tracker.has_been_posted(&post.guid).await? {
                continue;
            }
            tracing::info!(guid = %post.guid, title = %post.title, "New post found");
            unseen.push(post);
        }

        // Stable: equal timestamps keep feed order
        unseen.sort_by_key(|post| post.published_at);
        Ok(unseen)
    }

    async fn process_post(&self, post: &Post) -> Result<PostOutcome, CycleError> {
        let options = &self.options;
        if !options.message.fits(&post.link, options.max_length) {
            tracing::warn!(
                guid = %post.guid,
                max_length = options.max_length,
                "Link and hashtags alone exceed the length limit; title dropped"
            );
        }
        let text = options.message.format(post, options.max_length);

        if options.dry_run {
            tracing::info!(
                guid = %post.guid,
                targets = ?self.target_names(),
                message = %text,
                "DRY RUN: would publish"
            );
            if options.dry_run_records {
                self.tracker
                    .mark_as_posted(&post.guid, &post.title, &post.link)
                    .await?;
            }
            return Ok(PostOutcome {
                marked: options.dry_run_records,
                ..PostOutcome::default()
            });
        }

        let results = self.publish_to_all(post, &text).await;
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;

        let marked = match options.mark_policy {
            MarkPolicy::AfterAttempt => true,
            MarkPolicy::RequireSuccess => succeeded > 0,
        };
        if marked {
            self.tracker
                .mark_as_posted(&post.guid, &post.title, &post.link)
                .await?;
        } else {
            tracing::warn!(
                guid = %post.guid,
                "Every target failed; leaving post unmarked for the next cycle"
            );
        }

        Ok(PostOutcome {
            succeeded,
            failed,
            marked,
        })
    }

    /// Attempts every target in order, each with its own retry budget.
    async fn publish_to_all(&self, post: &Post, text: &str) -> Vec<PublishAttemptResult> {
        let mut results = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let span = tracing::info_span!("publish", target = target.name(), guid = %post.guid);
            let link = Some(post.link.as_str());
            let result = with_retry_if(
                self.options.retry,
                target.name(),
                || target.publish(text, link),
                PublishError::is_retryable,
            )
            .instrument(span.clone())
            .await;

            let attempt = span.in_scope(|| match result {
                Ok(()) => {
                    tracing::info!("Published");
                    PublishAttemptResult {
                        target: target.name().to_string(),
                        success: true,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to publish");
                    PublishAttemptResult {
                        target: target.name().to_string(),
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            });
            results.push(attempt);
        }

        results
    }

    /// Runs a cycle now and then every `interval` until `shutdown` resolves.
    ///
    /// Cycles never overlap: a tick that arrives while a cycle is running is
    /// delayed. A failed cycle is logged and the schedule continues.
    pub async fn run_every<S>(&self, interval: Duration, shutdown: S) -> usize
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut cycles = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(cycles = cycles, "Shutting down scheduler");
                    return cycles;
                }
                _ = ticker.tick() => {
                    // Errors are already logged by run_cycle
                    let _ = self.run_cycle().await;
                    cycles += 1;
                }
            }
        }
    }
}

#[derive(Debug, Default)]
struct PostOutcome {
    succeeded: usize,
    failed: usize,
    marked: bool,
}
