//! Durable record of which posts have already been announced.
//!
//! Records live in the `posted` namespace of the key-value store, keyed by
//! guid, so there is at most one record per guid and a repeated
//! [`PostTracker::mark_as_posted`] only refreshes its timestamp.
//!
//! Storage errors are returned unchanged: a cycle cannot trust its dedup
//! state when the store is unreachable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{Database, DatabaseError};

/// Namespace holding one [`PostedRecord`] per announced guid.
pub const POSTED_NAMESPACE: &str = "posted";

/// Persisted proof that a post was announced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedRecord {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub posted_at: DateTime<Utc>,
}

/// Sole owner of the `guid -> PostedRecord` mapping.
#[derive(Clone)]
pub struct PostTracker {
    db: Database,
}

impl PostTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// True iff a record exists for `guid`.
    pub async fn has_been_posted(&self, guid: &str) -> Result<bool, DatabaseError> {
        self.db.contains(POSTED_NAMESPACE, guid).await
    }

    /// Upserts the record for `guid`, stamping it with the current time.
    pub async fn mark_as_posted(
        &self,
        guid: &str,
        title: &str,
        link: &str,
    ) -> Result<(), DatabaseError> {
        let record = PostedRecord {
            guid: guid.to_string(),
            title: title.to_string(),
            link: link.to_string(),
            posted_at: Utc::now(),
        };
        self.db.set(POSTED_NAMESPACE, guid, &record).await?;
        tracing::debug!(guid = %guid, "Marked as posted");
        Ok(())
    }

    /// Fetch a single record, mostly for inspection.
    pub async fn get(&self, guid: &str) -> Result<Option<PostedRecord>, DatabaseError> {
        self.db.get(POSTED_NAMESPACE, guid).await
    }

    /// Up to `limit` records, most recently posted first.
    ///
    /// The whole namespace is sorted before truncating, so the result is the
    /// true newest `limit` regardless of key order.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<PostedRecord>, DatabaseError> {
        let mut records: Vec<PostedRecord> = self
            .db
            .scan(POSTED_NAMESPACE)
            .await?
            .into_iter()
            .map(|entry| entry.value)
            .collect();

        records.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
        records.truncate(limit);
        Ok(records)
    }

    /// Number of announced posts on record.
    pub async fn count(&self) -> Result<i64, DatabaseError> {
        self.db.count(POSTED_NAMESPACE).await
    }

    /// Administrative reset: forget every announced post.
    ///
    /// Returns the number of records deleted. Not part of the polling cycle.
    pub async fn clear_all(&self) -> Result<u64, DatabaseError> {
        let deleted = self.db.delete_namespace(POSTED_NAMESPACE).await?;
        tracing::info!(deleted = deleted, "Cleared posted records");
        Ok(deleted)
    }
}
