use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{Article, ArticleDbRow, RemoteItem};

/// Read-state filter applied to article list queries.
///
/// This is the storage-level view of the UI filter mode; `Unread` is the mode
/// the session-preservation machinery interacts with (see `preserved_ids` on
/// [`ArticleQuery`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadFilter {
    #[default]
    All,
    Unread,
    Read,
}

/// Context-scoped article list query.
///
/// Exactly the browsing contexts the UI can be in: a feed, a folder, a tag,
/// or everything. `preserved_ids` re-includes read articles under the Unread
/// filter so session-preserved articles are not yanked out of the list the
/// moment they are marked read.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    pub feed_id: Option<i64>,
    pub folder: Option<String>,
    pub tag: Option<String>,
    pub filter: ReadFilter,
    pub preserved_ids: Vec<i64>,
}

/// Bound on preserved-id list size per query, below SQLite's bind limit.
const MAX_PRESERVED_IDS: usize = 500;

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Upsert stream items from the remote, resolving feed ids through
    /// `feed_ids` (remote stream id -> local feed id).
    ///
    /// Remote wins: `read` and `starred` are overwritten with the remote's
    /// view on every upsert. Items for unknown feeds are skipped with a
    /// warning. Returns the number of items applied.
    pub async fn upsert_items(
        &self,
        items: &[RemoteItem],
        feed_ids: &HashMap<String, i64>,
    ) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut applied = 0;

        for item in items {
            let Some(&feed_id) = feed_ids.get(&item.feed_remote_id) else {
                tracing::warn!(
                    item = %item.remote_id,
                    stream = %item.feed_remote_id,
                    "Skipping item for unknown feed"
                );
                continue;
            };

            // One transaction per item so the article row and its tags land
            // together; an interrupted sync never leaves a tagless article
            let mut tx = self.pool.begin().await?;

            let row: (i64,) = sqlx::query_as(
                r#"
                INSERT INTO articles
                    (feed_id, remote_id, title, url, published, summary, read, starred, fetched_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(remote_id) DO UPDATE SET
                    title = excluded.title,
                    url = excluded.url,
                    published = excluded.published,
                    summary = excluded.summary,
                    read = excluded.read,
                    starred = excluded.starred
                RETURNING id
            "#,
            )
            .bind(feed_id)
            .bind(&item.remote_id)
            .bind(&item.title)
            .bind(&item.url)
            .bind(item.published)
            .bind(&item.summary)
            .bind(item.read)
            .bind(item.starred)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;

            // Tags follow the remote wholesale
            sqlx::query("DELETE FROM article_tags WHERE article_id = ?")
                .bind(row.0)
                .execute(&mut *tx)
                .await?;
            for tag in &item.tags {
                sqlx::query("INSERT OR IGNORE INTO article_tags (article_id, tag) VALUES (?, ?)")
                    .bind(row.0)
                    .bind(tag)
                    .execute(&mut *tx)
                    .await?;
            }

            tx.commit().await?;
            applied += 1;
        }

        Ok(applied)
    }

    /// Fetch the article list for a browsing context.
    ///
    /// Under `ReadFilter::Unread`, articles whose ids appear in
    /// `query.preserved_ids` are included even when read — this is the query
    /// half of session preservation.
    pub async fn get_articles(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            r#"
            SELECT a.id, a.feed_id, a.remote_id, a.title, a.url, a.published,
                   a.summary, a.full_content, a.read, a.starred, a.parse_attempts,
                   a.fetched_at
            FROM articles a
            JOIN feeds f ON a.feed_id = f.id
            WHERE 1 = 1
        "#,
        );

        if let Some(feed_id) = query.feed_id {
            builder.push(" AND a.feed_id = ");
            builder.push_bind(feed_id);
        }
        if let Some(folder) = &query.folder {
            builder.push(" AND f.folder = ");
            builder.push_bind(folder);
        }
        if let Some(tag) = &query.tag {
            builder.push(
                " AND EXISTS (SELECT 1 FROM article_tags t WHERE t.article_id = a.id AND t.tag = ",
            );
            builder.push_bind(tag);
            builder.push(")");
        }

        match query.filter {
            ReadFilter::All => {}
            ReadFilter::Read => {
                builder.push(" AND a.read = 1");
            }
            ReadFilter::Unread => {
                let preserved = &query.preserved_ids[..query.preserved_ids.len().min(MAX_PRESERVED_IDS)];
                if preserved.is_empty() {
                    builder.push(" AND a.read = 0");
                } else {
                    builder.push(" AND (a.read = 0 OR a.id IN (");
                    let mut separated = builder.separated(", ");
                    for id in preserved {
                        separated.push_bind(*id);
                    }
                    separated.push_unseparated("))");
                }
            }
        }

        builder.push(" ORDER BY a.published DESC, a.fetched_at DESC, a.id DESC");

        let rows: Vec<ArticleDbRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ArticleDbRow::into_article).collect())
    }

    /// Get a single article by id.
    pub async fn get_article(&self, article_id: i64) -> Result<Option<Article>> {
        let row: Option<ArticleDbRow> = sqlx::query_as(
            r#"
            SELECT id, feed_id, remote_id, title, url, published, summary,
                   full_content, read, starred, parse_attempts, fetched_at
            FROM articles
            WHERE id = ?
        "#,
        )
        .bind(article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleDbRow::into_article))
    }

    /// Mark an article as read locally. The caller is responsible for
    /// enqueueing the corresponding sync_queue entry.
    pub async fn mark_read(&self, article_id: i64) -> Result<()> {
        sqlx::query("UPDATE articles SET read = 1 WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark an article as unread locally.
    pub async fn mark_unread(&self, article_id: i64) -> Result<()> {
        sqlx::query("UPDATE articles SET read = 0 WHERE id = ?")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Set the starred flag locally. Returns the new value for convenience.
    pub async fn set_starred(&self, article_id: i64, starred: bool) -> Result<bool> {
        sqlx::query("UPDATE articles SET starred = ? WHERE id = ?")
            .bind(starred)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(starred)
    }

    /// Store fetched full content for an article.
    pub async fn set_full_content(&self, article_id: i64, content: &str) -> Result<()> {
        sqlx::query("UPDATE articles SET full_content = ? WHERE id = ?")
            .bind(content)
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed full-content fetch. Returns the new attempt count,
    /// which gates the retry affordance in the reader.
    pub async fn record_parse_failure(&self, article_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r#"
            UPDATE articles SET parse_attempts = parse_attempts + 1
            WHERE id = ?
            RETURNING parse_attempts
        "#,
        )
        .bind(article_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArticleQuery, ReadFilter};
    use crate::storage::{Database, RemoteFeed, RemoteItem};

    async fn test_db() -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.upsert_feeds(&[
            RemoteFeed {
                remote_id: "feed/1".to_string(),
                title: "Feed One".to_string(),
                url: "https://one.example.com/rss".to_string(),
                site_url: None,
                folder: Some("Tech".to_string()),
            },
            RemoteFeed {
                remote_id: "feed/2".to_string(),
                title: "Feed Two".to_string(),
                url: "https://two.example.com/rss".to_string(),
                site_url: None,
                folder: None,
            },
        ])
        .await
        .unwrap();
        db
    }

    fn item(remote_id: &str, feed: &str, title: &str) -> RemoteItem {
        RemoteItem {
            remote_id: remote_id.to_string(),
            feed_remote_id: feed.to_string(),
            title: title.to_string(),
            url: Some(format!("https://example.com/{}", remote_id)),
            published: Some(1704067200),
            summary: Some("Summary".to_string()),
            read: false,
            starred: false,
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_items_inserts() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();

        let applied = db
            .upsert_items(
                &[item("item/1", "feed/1", "First"), item("item/2", "feed/2", "Second")],
                &feed_ids,
            )
            .await
            .unwrap();
        assert_eq!(applied, 2);

        let articles = db.get_articles(&ArticleQuery::default()).await.unwrap();
        assert_eq!(articles.len(), 2);
    }

    #[tokio::test]
    async fn test_upsert_items_remote_wins_on_read_state() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();

        db.upsert_items(&[item("item/1", "feed/1", "First")], &feed_ids)
            .await
            .unwrap();
        let articles = db.get_articles(&ArticleQuery::default()).await.unwrap();

        // Local mark-read, then the remote reports the item unread again
        db.mark_read(articles[0].id).await.unwrap();
        db.upsert_items(&[item("item/1", "feed/1", "First")], &feed_ids)
            .await
            .unwrap();

        let article = db.get_article(articles[0].id).await.unwrap().unwrap();
        assert!(!article.read, "remote state must win on upsert");
    }

    #[tokio::test]
    async fn test_upsert_items_skips_unknown_feed() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();

        let applied = db
            .upsert_items(&[item("item/1", "feed/ghost", "Orphan")], &feed_ids)
            .await
            .unwrap();
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn test_query_by_folder_and_tag() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();

        let mut tagged = item("item/1", "feed/1", "Tagged");
        tagged.tags = vec!["rust".to_string()];
        db.upsert_items(&[tagged, item("item/2", "feed/2", "Plain")], &feed_ids)
            .await
            .unwrap();

        let in_folder = db
            .get_articles(&ArticleQuery {
                folder: Some("Tech".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(in_folder.len(), 1);
        assert_eq!(&*in_folder[0].title, "Tagged");

        let by_tag = db
            .get_articles(&ArticleQuery {
                tag: Some("rust".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);

        let by_missing_tag = db
            .get_articles(&ArticleQuery {
                tag: Some("golang".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(by_missing_tag.is_empty());
    }

    #[tokio::test]
    async fn test_tags_replaced_on_upsert() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();

        let mut tagged = item("item/1", "feed/1", "Tagged");
        tagged.tags = vec!["rust".to_string(), "tui".to_string()];
        db.upsert_items(&[tagged.clone()], &feed_ids).await.unwrap();

        // Remote re-labels the item; the old tag set must not linger
        tagged.tags = vec!["news".to_string()];
        db.upsert_items(&[tagged], &feed_ids).await.unwrap();

        let by_old_tag = db
            .get_articles(&ArticleQuery {
                tag: Some("rust".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(by_old_tag.is_empty());

        let by_new_tag = db
            .get_articles(&ArticleQuery {
                tag: Some("news".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_new_tag.len(), 1);
    }

    #[tokio::test]
    async fn test_unread_filter_with_preserved_ids() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();

        db.upsert_items(
            &[
                item("item/1", "feed/1", "Read and preserved"),
                item("item/2", "feed/1", "Read and dropped"),
                item("item/3", "feed/1", "Unread"),
            ],
            &feed_ids,
        )
        .await
        .unwrap();

        let all = db.get_articles(&ArticleQuery::default()).await.unwrap();
        let preserved_id = all.iter().find(|a| &*a.title == "Read and preserved").unwrap().id;
        let dropped_id = all.iter().find(|a| &*a.title == "Read and dropped").unwrap().id;
        db.mark_read(preserved_id).await.unwrap();
        db.mark_read(dropped_id).await.unwrap();

        let unread_view = db
            .get_articles(&ArticleQuery {
                feed_id: all[0].feed_id.into(),
                filter: ReadFilter::Unread,
                preserved_ids: vec![preserved_id],
                ..Default::default()
            })
            .await
            .unwrap();

        let titles: Vec<&str> = unread_view.iter().map(|a| &*a.title).collect();
        assert!(titles.contains(&"Unread"));
        assert!(titles.contains(&"Read and preserved"));
        assert!(!titles.contains(&"Read and dropped"));
    }

    #[tokio::test]
    async fn test_read_filter() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();

        db.upsert_items(
            &[item("item/1", "feed/1", "One"), item("item/2", "feed/1", "Two")],
            &feed_ids,
        )
        .await
        .unwrap();

        let all = db.get_articles(&ArticleQuery::default()).await.unwrap();
        db.mark_read(all[0].id).await.unwrap();

        let read_view = db
            .get_articles(&ArticleQuery {
                filter: ReadFilter::Read,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(read_view.len(), 1);
        assert_eq!(read_view[0].id, all[0].id);
    }

    #[tokio::test]
    async fn test_parse_failure_counter() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();
        db.upsert_items(&[item("item/1", "feed/1", "One")], &feed_ids)
            .await
            .unwrap();
        let articles = db.get_articles(&ArticleQuery::default()).await.unwrap();

        assert_eq!(db.record_parse_failure(articles[0].id).await.unwrap(), 1);
        assert_eq!(db.record_parse_failure(articles[0].id).await.unwrap(), 2);

        let article = db.get_article(articles[0].id).await.unwrap().unwrap();
        assert_eq!(article.parse_attempts, 2);
    }

    #[tokio::test]
    async fn test_full_content_roundtrip() {
        let db = test_db().await;
        let feed_ids = db.feed_ids_by_remote_id().await.unwrap();
        db.upsert_items(&[item("item/1", "feed/1", "One")], &feed_ids)
            .await
            .unwrap();
        let articles = db.get_articles(&ArticleQuery::default()).await.unwrap();

        db.set_full_content(articles[0].id, "# Full body").await.unwrap();
        let article = db.get_article(articles[0].id).await.unwrap().unwrap();
        assert_eq!(article.full_content.as_deref(), Some("# Full body"));
        assert_eq!(article.display_content().unwrap().as_ref(), "# Full body");
    }
}
