use crate::config::Config;
use crate::content::{needs_full_content, AppliedParse, AutoParser, ParseDecision, ParseEvent};
use crate::liststate::{ArticleListStateManager, ListContext};
use crate::storage::{Article, ArticleQuery, Database, Feed, QueueAction, ReadFilter};
use crate::sync::SyncOutcome;
use anyhow::Result;
use ratatui::text::Line;
use reqwest::redirect::Policy;
use secrecy::SecretString;
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Maximum scroll offset for the reader view (ratatui u16 limit).
pub const MAX_SCROLL: usize = u16::MAX as usize;

// ============================================================================
// HTTP Client Configuration
// ============================================================================

/// Redirect policy with loop detection and limited hops.
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }
        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }
        attempt.follow()
    })
}

// ============================================================================
// View and Focus Enums
// ============================================================================

/// Current view mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Browse, // Side-by-side feeds/articles
    Reader, // Full-screen article reader
}

/// Which panel has focus in Browse view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Feeds,
    Articles,
}

// ============================================================================
// Content and Event Types
// ============================================================================

/// Content state for the article reader.
#[derive(Debug, Clone)]
pub enum ContentState {
    /// Showing the stored summary or full content; no fetch running.
    Stored,
    /// Proxy fetch in flight.
    Loading,
    /// Proxy content arrived this session.
    Loaded {
        rendered_lines: Vec<Line<'static>>,
    },
    Failed {
        error: String,
        can_retry: bool,
    },
}

/// Events from background tasks, delivered to the event loop.
pub enum AppEvent {
    SyncStarted,
    SyncCompleted { outcome: SyncOutcome },
    SyncFailed { error: String },
    /// A background task panicked.
    TaskPanicked { task: &'static str, error: String },
}

// ============================================================================
// Application State
// ============================================================================

/// Central application state
pub struct App {
    pub db: Database,
    pub http_client: reqwest::Client,
    pub config: Config,

    // Data
    /// Feed list wrapped in Arc for O(1) cloning across reloads.
    pub feeds: Arc<Vec<Feed>>,
    pub articles: Arc<Vec<Article>>,

    // UI State
    pub view: View,
    pub focus: Focus,
    pub selected_feed: usize,
    pub selected_article: usize,
    pub scroll_offset: usize,
    pub filter: ReadFilter,

    // Read-state preservation across Browse <-> Reader navigation
    pub list_state: ArticleListStateManager,

    // Full-content parsing
    pub parser: AutoParser,
    pub content_state: ContentState,
    pub reader_article: Option<Article>,

    // Sync
    pub sync_running: bool,
    pub last_sync_label: Option<String>,
    /// Legacy JSONL sync log consulted as the last resolution tier.
    pub sync_log_path: PathBuf,

    // Tag filter input mode
    pub tag_input_mode: bool,
    pub tag_input: String,

    // Status message with expiry; Cow avoids allocation for static literals
    pub status_message: Option<(Cow<'static, str>, Instant)>,

    pub needs_redraw: bool,
}

impl App {
    pub fn new(
        db: Database,
        config: Config,
        sync_log_path: PathBuf,
        parse_events: mpsc::UnboundedSender<ParseEvent>,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .redirect(create_redirect_policy())
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(30))
            .build()?;

        // Proxy token is env-only; it never lives in the config file
        let proxy_token = std::env::var("TIDEMARK_PROXY_TOKEN")
            .ok()
            .map(SecretString::from);
        let parser = AutoParser::new(
            http_client.clone(),
            config.proxy_url.clone(),
            proxy_token,
            parse_events,
        );
        let list_state = ArticleListStateManager::new(Duration::from_secs(
            config.list_state_ttl_minutes * 60,
        ));

        Ok(Self {
            db,
            http_client,
            config,
            feeds: Arc::new(Vec::new()),
            articles: Arc::new(Vec::new()),
            view: View::Browse,
            focus: Focus::Feeds,
            selected_feed: 0,
            selected_article: 0,
            scroll_offset: 0,
            filter: ReadFilter::Unread,
            list_state,
            parser,
            content_state: ContentState::Stored,
            reader_article: None,
            sync_running: false,
            last_sync_label: None,
            sync_log_path,
            tag_input_mode: false,
            tag_input: String::new(),
            status_message: None,
            needs_redraw: true,
        })
    }

    // ========================================================================
    // Data Loading
    // ========================================================================

    pub async fn reload_feeds(&mut self) -> Result<()> {
        self.feeds = Arc::new(self.db.get_feeds_with_unread_counts().await?);
        self.clamp_selections();
        self.needs_redraw = true;
        Ok(())
    }

    /// Reload the article list for the current context and filter.
    ///
    /// Under the Unread filter, articles read during this session are passed
    /// to the query as an allowlist so they stay visible (dimmed) instead of
    /// vanishing and reflowing the list.
    pub async fn reload_articles(&mut self) -> Result<()> {
        let context = self.list_state.context().clone();
        let query = ArticleQuery {
            feed_id: context.feed_id,
            folder: context.folder,
            tag: context.tag,
            filter: self.filter,
            preserved_ids: self.list_state.preserved_ids(),
        };
        self.articles = Arc::new(self.db.get_articles(&query).await?);
        self.clamp_selections();
        self.needs_redraw = true;
        Ok(())
    }

    // ========================================================================
    // Context and Filter
    // ========================================================================

    /// Switch the article list to a new browsing context. Dropping into a
    /// different feed, folder, or tag invalidates session read state.
    pub async fn set_context(&mut self, context: ListContext) -> Result<()> {
        self.list_state.set_context(context);
        self.selected_article = 0;
        self.reload_articles().await
    }

    /// Cycle the read filter: Unread -> All -> Read -> Unread.
    ///
    /// A filter change invalidates session read state the same way a
    /// context change does.
    pub async fn cycle_filter(&mut self) -> Result<()> {
        self.filter = match self.filter {
            ReadFilter::Unread => ReadFilter::All,
            ReadFilter::All => ReadFilter::Read,
            ReadFilter::Read => ReadFilter::Unread,
        };
        self.list_state.invalidate();
        self.selected_article = 0;
        self.reload_articles().await
    }

    pub fn filter_label(&self) -> &'static str {
        match self.filter {
            ReadFilter::All => "all",
            ReadFilter::Unread => "unread",
            ReadFilter::Read => "read",
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn nav_up(&mut self) {
        match self.focus {
            Focus::Feeds => self.selected_feed = self.selected_feed.saturating_sub(1),
            Focus::Articles => self.selected_article = self.selected_article.saturating_sub(1),
        }
        self.needs_redraw = true;
    }

    pub fn nav_down(&mut self) {
        match self.focus {
            Focus::Feeds => {
                if !self.feeds.is_empty() {
                    let max_index = self.feeds.len() - 1;
                    self.selected_feed = (self.selected_feed + 1).min(max_index);
                }
            }
            Focus::Articles => {
                if !self.articles.is_empty() {
                    let max_index = self.articles.len() - 1;
                    self.selected_article = (self.selected_article + 1).min(max_index);
                }
            }
        }
        self.needs_redraw = true;
    }

    /// Clamp selection indices after any list reload.
    pub fn clamp_selections(&mut self) {
        self.selected_feed = if self.feeds.is_empty() {
            0
        } else {
            self.selected_feed.min(self.feeds.len() - 1)
        };
        self.selected_article = if self.articles.is_empty() {
            0
        } else {
            self.selected_article.min(self.articles.len() - 1)
        };
    }

    pub fn selected_feed(&self) -> Option<&Feed> {
        self.feeds.get(self.selected_feed)
    }

    pub fn selected_article(&self) -> Option<&Article> {
        self.articles.get(self.selected_article)
    }

    // ========================================================================
    // Reader Entry and Exit
    // ========================================================================

    /// Open the selected article in the reader.
    ///
    /// The list position is snapshotted first so returning restores it.
    /// Unread articles are marked read locally and queued for push, unless
    /// the list was just restored (the suppression window prevents a
    /// restored selection from being re-marked by the act of returning).
    /// If the stored content looks truncated, an auto-parse is scheduled.
    pub async fn open_selected_article(&mut self) -> Result<()> {
        let Some(article) = self.articles.get(self.selected_article).cloned() else {
            return Ok(());
        };

        self.list_state.save_position(self.selected_article);

        if !article.read
            && self.config.mark_read_on_open
            && !self.list_state.suppressing_auto_read()
        {
            self.db.mark_read(article.id).await?;
            self.db
                .enqueue_action(&article.remote_id, QueueAction::MarkRead)
                .await?;
            self.list_state.note_auto_read(article.id);
        }

        let feed_partial = self
            .feeds
            .iter()
            .find(|f| f.id == article.feed_id)
            .is_some_and(|f| f.partial_content);

        self.view = View::Reader;
        self.scroll_offset = 0;
        self.content_state = ContentState::Stored;

        if self.config.auto_parse {
            if let Some(url) = &article.url {
                let eligible = needs_full_content(
                    article.summary.as_deref(),
                    article.full_content.is_some(),
                    feed_partial,
                );
                if eligible {
                    let decision =
                        self.parser
                            .request_parse(url.clone(), article.parse_attempts as u32, false);
                    self.content_state = match decision {
                        ParseDecision::Cached(content) => ContentState::Loaded {
                            rendered_lines: crate::ui::reader::render_markdown(&content),
                        },
                        _ => ContentState::Loading,
                    };
                }
            }
        }

        self.reader_article = Some(article);
        self.needs_redraw = true;
        Ok(())
    }

    /// Manually request a full-content parse for the open article,
    /// bypassing the eligibility heuristics.
    pub fn request_manual_parse(&mut self) {
        let (url, attempts) = match &self.reader_article {
            Some(article) => (article.url.clone(), article.parse_attempts as u32),
            None => return,
        };
        let Some(url) = url else {
            self.set_status("Article has no URL to parse");
            return;
        };
        self.content_state = match self.parser.request_parse(url, attempts, true) {
            ParseDecision::Cached(content) => ContentState::Loaded {
                rendered_lines: crate::ui::reader::render_markdown(&content),
            },
            _ => ContentState::Loading,
        };
        self.needs_redraw = true;
    }

    /// Return from the reader to the article list, restoring the saved
    /// position when the context still matches.
    pub async fn exit_reader(&mut self) -> Result<()> {
        self.parser.cancel();
        self.view = View::Browse;
        self.content_state = ContentState::Stored;
        self.scroll_offset = 0;
        self.reader_article = None;

        // Restore before reloading: an expired snapshot must drop its
        // preserved ids so the query below does not resurrect them
        let context = self.list_state.context().clone();
        let restored = self.list_state.restore_position(&context);
        self.reload_articles().await?;
        if let Some(selected) = restored {
            self.selected_article = selected.min(self.articles.len().saturating_sub(1));
        }
        self.needs_redraw = true;
        Ok(())
    }

    // ========================================================================
    // Parse Results
    // ========================================================================

    /// Handle a finished parse fetch. Stale results (from a superseded
    /// navigation) are dropped by the parser's identity check.
    pub async fn handle_parse_event(&mut self, event: ParseEvent) -> Result<()> {
        let url = event.url.clone();
        match self.parser.apply(event) {
            AppliedParse::Content(content) => {
                if let Some(article) = &mut self.reader_article {
                    self.db.set_full_content(article.id, &content).await?;
                    article.full_content = Some(Arc::from(content.as_str()));
                }
                self.content_state = ContentState::Loaded {
                    rendered_lines: crate::ui::reader::render_markdown(&content),
                };
                self.needs_redraw = true;
            }
            AppliedParse::Failure { permanent, attempts } => {
                if let Some(article) = &mut self.reader_article {
                    let recorded = self.db.record_parse_failure(article.id).await?;
                    article.parse_attempts = recorded;
                }
                let can_retry = self.parser.should_offer_retry();
                tracing::debug!(url = %url, attempts, permanent, "Parse failed for open article");
                self.content_state = ContentState::Failed {
                    error: if permanent {
                        "Could not extract article content".to_string()
                    } else {
                        "Content fetch failed".to_string()
                    },
                    can_retry,
                };
                self.needs_redraw = true;
            }
            AppliedParse::Stale => {}
        }
        Ok(())
    }

    // ========================================================================
    // Read and Star Toggles
    // ========================================================================

    /// Toggle read state of the selected article, recording the mutation
    /// both locally and in the push queue.
    pub async fn toggle_read_selected(&mut self) -> Result<()> {
        let Some(article) = self.articles.get(self.selected_article).cloned() else {
            return Ok(());
        };

        if article.read {
            self.db.mark_unread(article.id).await?;
            self.db
                .enqueue_action(&article.remote_id, QueueAction::MarkUnread)
                .await?;
            self.list_state.note_unread(article.id);
        } else {
            self.db.mark_read(article.id).await?;
            self.db
                .enqueue_action(&article.remote_id, QueueAction::MarkRead)
                .await?;
            self.list_state.note_manual_read(article.id);
        }

        self.reload_articles().await?;
        self.reload_feeds().await
    }

    /// Toggle the star on the selected article.
    pub async fn toggle_star_selected(&mut self) -> Result<()> {
        let Some(article) = self.articles.get(self.selected_article).cloned() else {
            return Ok(());
        };
        let starred = !article.starred;
        self.db.set_starred(article.id, starred).await?;
        let action = if starred {
            QueueAction::Star
        } else {
            QueueAction::Unstar
        };
        self.db.enqueue_action(&article.remote_id, action).await?;
        self.set_status(if starred { "Starred" } else { "Unstarred" });
        self.reload_articles().await
    }

    // ========================================================================
    // Status Messages
    // ========================================================================

    /// Set status message (auto-expires after 3 seconds)
    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
        self.needs_redraw = true;
    }

    /// Clear status message if older than 3 seconds. Returns true if one
    /// was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed().as_secs() >= 3 {
                self.status_message = None;
                return true;
            }
        }
        false
    }

    // ========================================================================
    // Scrolling
    // ========================================================================

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
        self.needs_redraw = true;
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = (self.scroll_offset + lines).min(MAX_SCROLL);
        self.needs_redraw = true;
    }
}
