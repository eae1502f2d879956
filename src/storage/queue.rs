use anyhow::Result;
use chrono::Utc;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{QueueAction, QueueEntry};

/// Entries that have failed to push this many times are dropped (remote wins).
pub const MAX_PUSH_ATTEMPTS: i64 = 5;

impl Database {
    // ========================================================================
    // Sync Queue Operations
    // ========================================================================

    /// Enqueue a local state mutation for the next push.
    ///
    /// Any pending entry for the same article with the same or inverse action
    /// is removed first: marking unread cancels a queued mark-read rather
    /// than sending both, and repeated actions collapse to one entry.
    pub async fn enqueue_action(&self, article_remote_id: &str, action: QueueAction) -> Result<()> {
        sqlx::query(
            "DELETE FROM sync_queue WHERE article_remote_id = ? AND action IN (?, ?)",
        )
        .bind(article_remote_id)
        .bind(action.as_str())
        .bind(action.inverse().as_str())
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO sync_queue (article_remote_id, action, created_at) VALUES (?, ?, ?)",
        )
        .bind(article_remote_id)
        .bind(action.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Oldest pending entries, up to `limit`.
    pub async fn pending_queue(&self, limit: i64) -> Result<Vec<QueueEntry>> {
        let rows: Vec<(i64, String, String, i64)> = sqlx::query_as(
            r#"
            SELECT id, article_remote_id, action, attempts
            FROM sync_queue
            ORDER BY created_at, id
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, article_remote_id, action, attempts)| {
                let action = QueueAction::parse(&action)?;
                Some(QueueEntry {
                    id,
                    article_remote_id,
                    action,
                    attempts,
                })
            })
            .collect())
    }

    /// Number of entries waiting to be pushed.
    pub async fn queue_len(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    /// Remove entries that were pushed successfully.
    pub async fn ack_queue(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("DELETE FROM sync_queue WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        builder.build().execute(&self.pool).await?;

        Ok(())
    }

    /// Bump attempt counts after a failed push, then drop entries that have
    /// exceeded the attempt cap. Returns the number of dropped entries.
    pub async fn record_push_failure(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE sync_queue SET attempts = attempts + 1 WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        builder.build().execute(&self.pool).await?;

        let result = sqlx::query("DELETE FROM sync_queue WHERE attempts >= ?")
            .bind(MAX_PUSH_ATTEMPTS)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::warn!(
                dropped = result.rows_affected(),
                "Dropped sync queue entries past the attempt cap"
            );
        }

        Ok(result.rows_affected())
    }
}
