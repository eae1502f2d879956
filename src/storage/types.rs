use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of tidemark appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Remote Payload Types
// ============================================================================

/// A subscription as reported by the aggregation service.
#[derive(Debug, Clone)]
pub struct RemoteFeed {
    pub remote_id: String,
    pub title: String,
    pub url: String,
    pub site_url: Option<String>,
    /// Folder (label) the subscription is filed under, if any.
    pub folder: Option<String>,
}

/// A stream item as reported by the aggregation service.
///
/// `read` and `starred` are the remote's authoritative view; upserting a
/// RemoteItem overwrites the local flags (remote wins).
#[derive(Debug, Clone)]
pub struct RemoteItem {
    pub remote_id: String,
    pub feed_remote_id: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub summary: Option<String>,
    pub read: bool,
    pub starred: bool,
    pub tags: Vec<String>,
}

// ============================================================================
// Helper Types
// ============================================================================

/// Row type for feed query with unread count
pub(crate) type FeedRow = (
    i64,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64, // partial_content
    i64, // unread_count
);

/// Internal row type for Article queries (used by sqlx FromRow)
/// Converts to Article via into_article() with Arc wrapping
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ArticleDbRow {
    pub id: i64,
    pub feed_id: i64,
    pub remote_id: String,
    pub title: String,
    pub url: Option<String>,
    pub published: Option<i64>,
    pub summary: Option<String>,
    pub full_content: Option<String>,
    pub read: bool,
    pub starred: bool,
    pub parse_attempts: i64,
    pub fetched_at: i64,
}

impl ArticleDbRow {
    pub(crate) fn into_article(self) -> Article {
        Article {
            id: self.id,
            feed_id: self.feed_id,
            remote_id: self.remote_id,
            title: Arc::from(self.title),
            url: self.url.map(Arc::from),
            published: self.published,
            summary: self.summary.map(Arc::from),
            full_content: self.full_content.map(Arc::from),
            read: self.read,
            starred: self.starred,
            parse_attempts: self.parse_attempts,
            fetched_at: self.fetched_at,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Feed data from database
///
/// `title` uses `Arc<str>` for cheap cloning into the feed title cache.
#[derive(Debug, Clone)]
pub struct Feed {
    pub id: i64,
    pub remote_id: String,
    pub title: Arc<str>,
    pub url: String,
    pub site_url: Option<String>,
    /// Folder (label) this feed is filed under, if any.
    pub folder: Option<String>,
    /// True when the feed ships truncated bodies and needs the reader proxy.
    pub partial_content: bool,
    pub unread_count: i64,
}

/// Article data from database
///
/// String fields use `Arc<str>` for cheap cloning in event handlers and the
/// reader view. `remote_id` stays a `String` (used for queue keys).
#[derive(Debug, Clone)]
pub struct Article {
    pub id: i64,
    pub feed_id: i64,
    pub remote_id: String,
    pub title: Arc<str>,
    pub url: Option<Arc<str>>,
    pub published: Option<i64>,
    /// Body as delivered by the feed (possibly truncated).
    pub summary: Option<Arc<str>>,
    /// Full content fetched through the reader proxy, once parsed.
    pub full_content: Option<Arc<str>>,
    pub read: bool,
    pub starred: bool,
    /// Number of failed full-content fetch attempts recorded for this article.
    pub parse_attempts: i64,
    pub fetched_at: i64,
}

impl Article {
    /// The body the reader should display: full content when available,
    /// otherwise the feed-provided summary.
    pub fn display_content(&self) -> Option<&Arc<str>> {
        self.full_content.as_ref().or(self.summary.as_ref())
    }
}

// ============================================================================
// Sync Queue Types
// ============================================================================

/// A state mutation waiting to be pushed to the aggregation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    MarkRead,
    MarkUnread,
    Star,
    Unstar,
}

impl QueueAction {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueAction::MarkRead => "read",
            QueueAction::MarkUnread => "unread",
            QueueAction::Star => "star",
            QueueAction::Unstar => "unstar",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(QueueAction::MarkRead),
            "unread" => Some(QueueAction::MarkUnread),
            "star" => Some(QueueAction::Star),
            "unstar" => Some(QueueAction::Unstar),
            _ => None,
        }
    }

    /// The action that cancels this one if both are queued for one article.
    pub fn inverse(self) -> Self {
        match self {
            QueueAction::MarkRead => QueueAction::MarkUnread,
            QueueAction::MarkUnread => QueueAction::MarkRead,
            QueueAction::Star => QueueAction::Unstar,
            QueueAction::Unstar => QueueAction::Star,
        }
    }
}

/// A pending sync queue entry.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub article_remote_id: String,
    pub action: QueueAction,
    pub attempts: i64,
}

// ============================================================================
// Sync Run Types
// ============================================================================

/// A sync run as recorded in the sync_status table.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: i64,
    pub status: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub items_synced: i64,
    pub error: Option<String>,
}
