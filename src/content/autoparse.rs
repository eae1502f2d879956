//! Automatic full-content parsing for the open article.
//!
//! Opening an article from a partial feed kicks off a proxy fetch in the
//! background. Navigation is faster than the network, so the machinery here
//! is mostly about identity: every started fetch carries a generation
//! number, and a result is only applied if both the article URL and the
//! generation still match the current job. Skipping to the next article
//! aborts the in-flight task, and since every new fetch gets a fresh
//! generation, any already-sent result for the old article is stale by
//! construction.
//!
//! A short cooldown sits between opening an article and starting its fetch,
//! so holding `j` to skim through a feed does not fire a request per
//! article. Manual parse requests skip both the cooldown and the
//! eligibility heuristics.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::content::fetch::{fetch_content, ContentError};

/// Delay between opening an article and starting its auto-parse.
pub const AUTO_PARSE_COOLDOWN: Duration = Duration::from_millis(100);

/// Failed parses past this many attempts stop offering a retry.
pub const MAX_PARSE_ATTEMPTS: u32 = 3;

/// Summaries shorter than this are assumed truncated.
const SHORT_CONTENT_THRESHOLD: usize = 500;

/// Phrases partial feeds leave at the point of truncation. Matched
/// case-insensitively against the whole summary.
const TRUNCATION_MARKERS: &[&str] = &[
    "read more",
    "continue reading",
    "[...]",
    "[\u{2026}]",
    "click here to read",
    "view full article",
];

/// Parsed-content cache entries kept in memory.
const CACHE_SIZE: usize = 64;

// ============================================================================
// Eligibility
// ============================================================================

/// Whether an article's stored content looks truncated enough to warrant an
/// automatic proxy fetch.
///
/// Articles with full content already stored never qualify. Otherwise a
/// feed flagged as partial always qualifies, as does any summary under the
/// length threshold or containing a known truncation phrase.
pub fn needs_full_content(
    summary: Option<&str>,
    has_full_content: bool,
    feed_partial: bool,
) -> bool {
    if has_full_content {
        return false;
    }
    if feed_partial {
        return true;
    }

    let Some(summary) = summary else {
        return true;
    };
    if summary.len() < SHORT_CONTENT_THRESHOLD {
        return true;
    }

    let lowered = summary.to_lowercase();
    TRUNCATION_MARKERS.iter().any(|m| lowered.contains(m))
}

// ============================================================================
// Parse Job State
// ============================================================================

/// Result of a finished fetch, sent back to the event loop.
#[derive(Debug)]
pub struct ParseEvent {
    pub url: Arc<str>,
    pub generation: u64,
    pub result: Result<String, ContentError>,
}

enum ParseState {
    /// Cooldown running; fetch starts once `not_before` passes.
    Scheduled { not_before: Instant },
    Running { generation: u64, handle: JoinHandle<()> },
    Done,
    Failed { permanent: bool },
}

struct ParseJob {
    url: Arc<str>,
    state: ParseState,
    /// Failures recorded for this URL so far, seeded from storage.
    attempts: u32,
}

/// What `apply` decided about an incoming result.
#[derive(Debug, PartialEq, Eq)]
pub enum AppliedParse {
    /// Content landed for the still-open article.
    Content(String),
    /// The fetch failed; `attempts` includes this failure.
    Failure { permanent: bool, attempts: u32 },
    /// The result belongs to an article or generation that is no longer
    /// current and was discarded.
    Stale,
}

/// Outcome of a parse request, for the caller to act on immediately.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseDecision {
    /// Content was already cached; no fetch needed.
    Cached(String),
    /// A fetch for this URL is already scheduled or in flight.
    InFlight,
    /// Fetch scheduled to start after the cooldown.
    Scheduled,
    /// Fetch started immediately (manual request).
    Started,
}

// ============================================================================
// AutoParser
// ============================================================================

/// Owns the single parse job for the currently open article.
pub struct AutoParser {
    client: reqwest::Client,
    proxy_url: String,
    token: Option<SecretString>,
    events: mpsc::UnboundedSender<ParseEvent>,
    generation: u64,
    job: Option<ParseJob>,
    cache: LruCache<Arc<str>, String>,
}

impl AutoParser {
    pub fn new(
        client: reqwest::Client,
        proxy_url: String,
        token: Option<SecretString>,
        events: mpsc::UnboundedSender<ParseEvent>,
    ) -> Self {
        Self {
            client,
            proxy_url,
            token,
            events,
            generation: 0,
            job: None,
            cache: LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap()),
        }
    }

    /// Request a parse for the article at `url`.
    ///
    /// `attempts` seeds the failure count from storage so retry gating
    /// survives restarts. Manual requests start immediately; automatic ones
    /// wait out the cooldown (see [`tick`](Self::tick)).
    pub fn request_parse(&mut self, url: Arc<str>, attempts: u32, manual: bool) -> ParseDecision {
        if let Some(content) = self.cache.get(&url) {
            return ParseDecision::Cached(content.clone());
        }

        // Manual requests are a deliberate override: they skip the in-flight
        // guard (and with it the cooldown), aborting whatever is pending.
        if !manual {
            if let Some(job) = &self.job {
                if job.url == url {
                    match job.state {
                        ParseState::Scheduled { .. } | ParseState::Running { .. } => {
                            return ParseDecision::InFlight;
                        }
                        // Done means evicted from cache but job not cleared;
                        // Failed means an explicit retry. Both refetch.
                        ParseState::Done | ParseState::Failed { .. } => {}
                    }
                }
            }
        }

        self.cancel();

        if manual {
            let (generation, handle) = self.start_fetch(url.clone());
            self.job = Some(ParseJob {
                url,
                state: ParseState::Running { generation, handle },
                attempts,
            });
            return ParseDecision::Started;
        }

        self.job = Some(ParseJob {
            url,
            state: ParseState::Scheduled {
                not_before: Instant::now() + AUTO_PARSE_COOLDOWN,
            },
            attempts,
        });
        ParseDecision::Scheduled
    }

    /// Start any scheduled fetch whose cooldown has elapsed. Called from
    /// the event loop tick.
    pub fn tick(&mut self) {
        let due_url = match &self.job {
            Some(job) => match job.state {
                ParseState::Scheduled { not_before } if Instant::now() >= not_before => {
                    job.url.clone()
                }
                _ => return,
            },
            None => return,
        };

        let (generation, handle) = self.start_fetch(due_url);
        if let Some(job) = &mut self.job {
            job.state = ParseState::Running { generation, handle };
        }
    }

    /// Apply a finished fetch result.
    ///
    /// The result is only accepted if the current job is still running for
    /// the same URL with the same generation; anything else is a leftover
    /// from an aborted or superseded fetch and is dropped.
    pub fn apply(&mut self, event: ParseEvent) -> AppliedParse {
        let matches_current = match &self.job {
            Some(job) => {
                job.url == event.url
                    && matches!(
                        job.state,
                        ParseState::Running { generation, .. } if generation == event.generation
                    )
            }
            None => false,
        };
        if !matches_current {
            tracing::debug!(
                url = %event.url,
                generation = event.generation,
                "Discarding stale parse result"
            );
            return AppliedParse::Stale;
        }

        let job = self.job.as_mut().unwrap();
        match event.result {
            Ok(content) => {
                self.cache.put(job.url.clone(), content.clone());
                job.state = ParseState::Done;
                AppliedParse::Content(content)
            }
            Err(e) => {
                let permanent = e.is_permanent();
                job.attempts += 1;
                job.state = ParseState::Failed { permanent };
                tracing::warn!(
                    url = %job.url,
                    attempts = job.attempts,
                    permanent,
                    error = %e,
                    "Parse failed"
                );
                AppliedParse::Failure {
                    permanent,
                    attempts: job.attempts,
                }
            }
        }
    }

    /// Abort any scheduled or running fetch. Called when navigating away
    /// from the open article.
    pub fn cancel(&mut self) {
        if let Some(job) = self.job.take() {
            if let ParseState::Running { handle, .. } = job.state {
                handle.abort();
            }
        }
    }

    /// Whether the failure state of the current job warrants offering the
    /// user a retry. Permanent failures and exhausted attempts do not.
    pub fn should_offer_retry(&self) -> bool {
        match &self.job {
            Some(ParseJob {
                state: ParseState::Failed { permanent },
                attempts,
                ..
            }) => !permanent && *attempts < MAX_PARSE_ATTEMPTS,
            _ => false,
        }
    }

    fn start_fetch(&mut self, url: Arc<str>) -> (u64, JoinHandle<()>) {
        self.generation += 1;
        let generation = self.generation;

        let client = self.client.clone();
        let proxy_url = self.proxy_url.clone();
        let token = self.token.clone();
        let events = self.events.clone();
        let task_url = url;

        let handle = tokio::spawn(async move {
            let result = fetch_content(&client, &task_url, &proxy_url, token.as_ref()).await;
            let _ = events.send(ParseEvent {
                url: task_url,
                generation,
                result,
            });
        });

        (generation, handle)
    }
}

// ============================================================================
// Tests
// ============================================================================
