use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use super::schema::Database;
use super::types::{Feed, FeedRow, RemoteFeed};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Upsert feeds from the remote subscription list.
    ///
    /// `remote_id` is the conflict key; title, url, site_url and folder follow
    /// the remote. The `partial_content` flag is local-only and preserved
    /// across upserts.
    pub async fn upsert_feeds(&self, feeds: &[RemoteFeed]) -> Result<()> {
        for feed in feeds {
            sqlx::query(
                r#"
                INSERT INTO feeds (remote_id, title, url, site_url, folder)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(remote_id) DO UPDATE SET
                    title = excluded.title,
                    url = excluded.url,
                    site_url = excluded.site_url,
                    folder = excluded.folder
            "#,
            )
            .bind(&feed.remote_id)
            .bind(&feed.title)
            .bind(&feed.url)
            .bind(&feed.site_url)
            .bind(&feed.folder)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Get all feeds with their unread article counts, ordered by folder
    /// then title so the sidebar groups naturally.
    pub async fn get_feeds_with_unread_counts(&self) -> Result<Vec<Feed>> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            r#"
                SELECT
                    f.id, f.remote_id, f.title, f.url, f.site_url, f.folder,
                    f.partial_content,
                    COUNT(CASE WHEN a.read = 0 THEN 1 END) as unread_count
                FROM feeds f
                LEFT JOIN articles a ON f.id = a.feed_id
                GROUP BY f.id
                ORDER BY f.folder IS NULL, f.folder, f.title
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let feeds = rows
            .into_iter()
            .map(
                |(id, remote_id, title, url, site_url, folder, partial_content, unread_count)| {
                    Feed {
                        id,
                        remote_id,
                        title: Arc::from(title),
                        url,
                        site_url,
                        folder,
                        partial_content: partial_content != 0,
                        unread_count,
                    }
                },
            )
            .collect();

        Ok(feeds)
    }

    /// Map of remote stream id -> local feed id, used when upserting items.
    pub async fn feed_ids_by_remote_id(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT remote_id, id FROM feeds")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }

    /// Toggle the partial-content flag for a feed. Returns the new value.
    pub async fn toggle_partial_content(&self, feed_id: i64) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            r#"
            UPDATE feeds SET partial_content = NOT partial_content
            WHERE id = ?
            RETURNING partial_content
        "#,
        )
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 != 0)
    }
}
