use anyhow::Result;
use chrono::Utc;

use super::schema::Database;
use super::types::SyncRun;

/// Metadata key holding the incremental sync watermark.
pub const LAST_SYNC_KEY: &str = "last_sync_time";

impl Database {
    // ========================================================================
    // Sync Metadata Operations
    // ========================================================================

    /// Get a sync metadata value by key.
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM sync_metadata WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a sync metadata value (UPSERT).
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_metadata (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // Sync Run Lifecycle
    // ========================================================================

    /// Record the start of a sync run. Returns the run's row id for later
    /// use with `complete_sync_run` / `fail_sync_run`.
    pub async fn begin_sync_run(&self) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sync_status (status, started_at, updated_at)
            VALUES ('running', ?, ?)
            RETURNING id
        "#,
        )
        .bind(&now)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Mark a sync run completed with the number of items applied.
    pub async fn complete_sync_run(&self, run_id: i64, items_synced: i64) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE sync_status
            SET status = 'completed', completed_at = ?, items_synced = ?, updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&now)
        .bind(items_synced)
        .bind(&now)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a sync run failed with an error message.
    pub async fn fail_sync_run(&self, run_id: i64, error: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            UPDATE sync_status
            SET status = 'failed', error = ?, updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(error)
        .bind(&now)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The `completed_at` of the most recently updated completed sync run,
    /// if any. Tier 2 of last-sync resolution.
    pub async fn latest_completed_sync(&self) -> Result<Option<String>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT completed_at FROM sync_status
            WHERE status = 'completed'
            ORDER BY updated_at DESC
            LIMIT 1
        "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|(completed_at,)| completed_at))
    }

    /// The most recent sync run of any status, for the status bar.
    pub async fn latest_sync_run(&self) -> Result<Option<SyncRun>> {
        let row: Option<(i64, String, String, Option<String>, i64, Option<String>)> =
            sqlx::query_as(
                r#"
            SELECT id, status, started_at, completed_at, items_synced, error
            FROM sync_status
            ORDER BY updated_at DESC
            LIMIT 1
        "#,
            )
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(
            |(id, status, started_at, completed_at, items_synced, error)| SyncRun {
                id,
                status,
                started_at,
                completed_at,
                items_synced,
                error,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::LAST_SYNC_KEY;
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_metadata_missing_returns_none() {
        let db = test_db().await;
        assert_eq!(db.get_sync_metadata(LAST_SYNC_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_metadata_upsert() {
        let db = test_db().await;
        db.set_sync_metadata(LAST_SYNC_KEY, "2025-01-01T00:00:00Z")
            .await
            .unwrap();
        db.set_sync_metadata(LAST_SYNC_KEY, "2025-02-01T00:00:00Z")
            .await
            .unwrap();

        assert_eq!(
            db.get_sync_metadata(LAST_SYNC_KEY).await.unwrap().as_deref(),
            Some("2025-02-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_sync_run_lifecycle() {
        let db = test_db().await;

        let run_id = db.begin_sync_run().await.unwrap();
        let run = db.latest_sync_run().await.unwrap().unwrap();
        assert_eq!(run.id, run_id);
        assert_eq!(run.status, "running");
        assert!(run.completed_at.is_none());

        db.complete_sync_run(run_id, 42).await.unwrap();
        let run = db.latest_sync_run().await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(run.items_synced, 42);
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_error() {
        let db = test_db().await;
        let run_id = db.begin_sync_run().await.unwrap();
        db.fail_sync_run(run_id, "remote unreachable").await.unwrap();

        let run = db.latest_sync_run().await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
        assert_eq!(run.error.as_deref(), Some("remote unreachable"));
        assert!(run.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_latest_completed_skips_failed_runs() {
        let db = test_db().await;

        let ok = db.begin_sync_run().await.unwrap();
        db.complete_sync_run(ok, 5).await.unwrap();

        // A later failed run must not shadow the completed one
        let bad = db.begin_sync_run().await.unwrap();
        db.fail_sync_run(bad, "boom").await.unwrap();

        let completed = db.latest_completed_sync().await.unwrap();
        assert!(completed.is_some());
    }

    #[tokio::test]
    async fn test_latest_completed_none_when_no_runs() {
        let db = test_db().await;
        assert!(db.latest_completed_sync().await.unwrap().is_none());
    }
}
