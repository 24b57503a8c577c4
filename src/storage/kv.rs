use serde::{de::DeserializeOwned, Serialize};

use super::schema::Database;
use super::types::{DatabaseError, KvEntry};

impl Database {
    // ========================================================================
    // Key-Value Operations
    // ========================================================================

    /// Point lookup of `(namespace, key)`.
    ///
    /// Served by the composite primary key, so cost does not grow with the
    /// number of stored entries.
    pub async fn get<T: DeserializeOwned>(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<T>, DatabaseError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv WHERE namespace = ? AND key = ?")
                .bind(namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        row.map(|(value,)| serde_json::from_str(&value))
            .transpose()
            .map_err(DatabaseError::from)
    }

    /// Existence check for `(namespace, key)` without decoding the value.
    pub async fn contains(&self, namespace: &str, key: &str) -> Result<bool, DatabaseError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM kv WHERE namespace = ? AND key = ?")
                .bind(namespace)
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(row.is_some())
    }

    /// Upsert `(namespace, key) -> value`.
    pub async fn set<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
    ) -> Result<(), DatabaseError> {
        let json = serde_json::to_string(value)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO kv (namespace, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(namespace)
        .bind(key)
        .bind(&json)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(())
    }

    /// Scan every entry under `namespace`, ordered by key.
    pub async fn scan<T: DeserializeOwned>(
        &self,
        namespace: &str,
    ) -> Result<Vec<KvEntry<T>>, DatabaseError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM kv WHERE namespace = ? ORDER BY key")
                .bind(namespace)
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

        rows.into_iter()
            .map(|(key, value)| {
                Ok(KvEntry {
                    key,
                    value: serde_json::from_str(&value)?,
                })
            })
            .collect()
    }

    /// Delete every entry under `namespace`.
    ///
    /// Returns the number of entries removed.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM kv WHERE namespace = ?")
            .bind(namespace)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected())
    }

    /// Number of entries under `namespace`.
    pub async fn count(&self, namespace: &str) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM kv WHERE namespace = ?")
            .bind(namespace)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    fn note(text: &str) -> Note {
        Note { text: text.into() }
    }

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let db = test_db().await;
        let value: Option<Note> = db.get("notes", "nope").await.unwrap();
        assert!(value.is_none());
        assert!(!db.contains("notes", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_set_then_get_and_overwrite() {
        let db = test_db().await;
        db.set("notes", "a", &note("first")).await.unwrap();
        db.set("notes", "a", &note("second")).await.unwrap();

        let value: Option<Note> = db.get("notes", "a").await.unwrap();
        assert_eq!(value, Some(note("second")));
        assert_eq!(db.count("notes").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_is_namespace_scoped_and_key_ordered() {
        let db = test_db().await;
        db.set("notes", "b", &note("B")).await.unwrap();
        db.set("notes", "a", &note("A")).await.unwrap();
        db.set("other", "c", &note("C")).await.unwrap();

        let entries: Vec<KvEntry<Note>> = db.scan("notes").await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_delete_namespace_leaves_others() {
        let db = test_db().await;
        db.set("notes", "a", &note("A")).await.unwrap();
        db.set("notes", "b", &note("B")).await.unwrap();
        db.set("other", "c", &note("C")).await.unwrap();

        assert_eq!(db.delete_namespace("notes").await.unwrap(), 2);
        assert_eq!(db.count("notes").await.unwrap(), 0);
        assert_eq!(db.count("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_value_is_error() {
        let db = test_db().await;
        db.set("notes", "a", &42u32).await.unwrap();
        let result: Result<Option<Note>, _> = db.get("notes", "a").await;
        assert!(matches!(result, Err(DatabaseError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_write_under_foreign_lock_is_instance_locked() {
        use sqlx::sqlite::SqliteConnection;
        use sqlx::Connection;

        let dir = std::env::temp_dir().join(format!("reposter_kv_lock_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("locked.db");
        let _ = std::fs::remove_file(&path);
        let path_str = path.to_str().unwrap();

        let db = Database::open(path_str).await.unwrap();
        let mut holder = SqliteConnection::connect(&format!("sqlite:{}", path_str))
            .await
            .unwrap();
        sqlx::query("BEGIN EXCLUSIVE").execute(&mut holder).await.unwrap();

        // Waits out busy_timeout, then gives up
        let err = db.set("notes", "a", &note("blocked")).await.unwrap_err();
        assert!(
            matches!(err, DatabaseError::InstanceLocked),
            "expected InstanceLocked, got {err:?}"
        );

        sqlx::query("ROLLBACK").execute(&mut holder).await.unwrap();
        holder.close().await.unwrap();
        db.set("notes", "a", &note("free")).await.unwrap();
        db.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_closed_pool_errors() {
        let db = test_db().await;
        db.close().await;
        assert!(matches!(
            db.contains("notes", "a").await,
            Err(DatabaseError::Other(_))
        ));
    }
}
