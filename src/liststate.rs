//! Read-state preservation for the article list.
//!
//! Under the Unread filter, opening an article marks it read, which would
//! make it vanish from the list the moment you return from the reader. The
//! list would then reflow and the cursor would land on a different article.
//! To keep navigation stable, articles read during the current browsing
//! session stay visible (dimmed) until the user changes context or the
//! session snapshot expires.
//!
//! The manager tracks two sets separately: articles auto-marked read by
//! opening them, and articles the user explicitly toggled. Both stay in
//! the list, but only the auto-read set gets the distinct session styling;
//! an explicit toggle is a deliberate act and renders plainly dimmed like
//! any other read row.
//!
//! A context is the triple (feed, folder, tag). Any change to any of the
//! three keys is a new context and drops the session state; comparison is
//! exact in both directions, so navigating from "all articles" into a tag
//! view and back also counts as two changes.

use std::collections::HashSet;
use std::time::Duration;

use tokio::time::Instant;

/// Snapshots older than this are discarded on restore.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 60);

/// After restoring list position, auto-mark-read is suppressed briefly so
/// the restored selection is not immediately marked read again.
pub const SUPPRESS_AUTO_READ_WINDOW: Duration = Duration::from_millis(100);

/// The browsing context the article list is showing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListContext {
    pub feed_id: Option<i64>,
    pub folder: Option<String>,
    pub tag: Option<String>,
}

/// How an article row should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleEmphasis {
    /// Unread: full emphasis.
    Unread,
    /// Auto-marked read by opening it this session: dimmed but visibly
    /// distinct from long-read articles.
    SessionRead,
    /// Read before this session.
    Read,
}

/// Tracks session read state and the list position snapshot for one
/// browsing context.
pub struct ArticleListStateManager {
    ttl: Duration,
    context: ListContext,
    auto_read: HashSet<i64>,
    manual_read: HashSet<i64>,
    selected: usize,
    saved_at: Option<Instant>,
    suppress_until: Option<Instant>,
}

impl ArticleListStateManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            context: ListContext::default(),
            auto_read: HashSet::new(),
            manual_read: HashSet::new(),
            selected: 0,
            saved_at: None,
            suppress_until: None,
        }
    }

    /// Switch to a new browsing context. A context change of any kind
    /// drops the session read sets and the saved position; re-entering
    /// the same context is a no-op.
    pub fn set_context(&mut self, context: ListContext) {
        if self.context == context {
            return;
        }
        self.context = context;
        self.auto_read.clear();
        self.manual_read.clear();
        self.selected = 0;
        self.saved_at = None;
        self.suppress_until = None;
    }

    pub fn context(&self) -> &ListContext {
        &self.context
    }

    /// Drop all session state without changing context. Used when the read
    /// filter changes: the preserved rows were earned under the old filter
    /// and must not leak into the new view.
    pub fn invalidate(&mut self) {
        self.auto_read.clear();
        self.manual_read.clear();
        self.selected = 0;
        self.saved_at = None;
        self.suppress_until = None;
    }

    /// Record an article marked read by opening it.
    pub fn note_auto_read(&mut self, article_id: i64) {
        self.manual_read.remove(&article_id);
        self.auto_read.insert(article_id);
    }

    /// Record an article the user explicitly marked read.
    pub fn note_manual_read(&mut self, article_id: i64) {
        self.auto_read.remove(&article_id);
        self.manual_read.insert(article_id);
    }

    /// Record an article marked unread again; it no longer needs
    /// preservation since the Unread filter shows it anyway.
    pub fn note_unread(&mut self, article_id: i64) {
        self.auto_read.remove(&article_id);
        self.manual_read.remove(&article_id);
    }

    /// Save the list position before leaving for the reader view.
    ///
    /// Saving again in the same context merges: the read sets accumulate
    /// and only the position and timestamp are replaced.
    pub fn save_position(&mut self, selected: usize) {
        self.selected = selected;
        self.saved_at = Some(Instant::now());
    }

    /// Restore the saved list position for `context`.
    ///
    /// Returns the selected index if a snapshot exists for exactly this
    /// context and it has not outlived the TTL. An expired snapshot is
    /// dropped along with the session read sets. A successful restore opens
    /// the auto-read suppression window.
    pub fn restore_position(&mut self, context: &ListContext) -> Option<usize> {
        if self.context != *context {
            return None;
        }
        let saved_at = self.saved_at?;

        if saved_at.elapsed() > self.ttl {
            tracing::debug!("List snapshot expired, starting fresh");
            self.auto_read.clear();
            self.manual_read.clear();
            self.selected = 0;
            self.saved_at = None;
            return None;
        }

        self.suppress_until = Some(Instant::now() + SUPPRESS_AUTO_READ_WINDOW);
        Some(self.selected)
    }

    /// Whether auto-mark-read should currently be suppressed.
    pub fn suppressing_auto_read(&self) -> bool {
        self.suppress_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// Article ids read this session that must stay visible under the
    /// Unread filter. Fed into the storage query as an explicit allowlist.
    pub fn preserved_ids(&self) -> Vec<i64> {
        self.auto_read.union(&self.manual_read).copied().collect()
    }

    pub fn is_preserved(&self, article_id: i64) -> bool {
        self.auto_read.contains(&article_id) || self.manual_read.contains(&article_id)
    }

    /// Rendering emphasis for an article row. Only articles read as a side
    /// effect of opening them get the session styling; a manual toggle was
    /// deliberate and is dimmed like any other read row (though it still
    /// stays in the list until the session state drops).
    pub fn emphasis(&self, article_id: i64, read: bool) -> ArticleEmphasis {
        if !read {
            ArticleEmphasis::Unread
        } else if self.auto_read.contains(&article_id) {
            ArticleEmphasis::SessionRead
        } else {
            ArticleEmphasis::Read
        }
    }
}
