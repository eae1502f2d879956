//! Last-sync watermark resolution.
//!
//! Three storage tiers have historically recorded sync completion times:
//! the `sync_metadata` key/value table (current), the `sync_status` run table
//! (current), and a JSONL log file written by pre-1.0 cron deployments
//! (legacy, read-only). The resolver checks them strictly in that order and
//! returns the first valid timestamp together with its provenance, so the
//! sync engine — and the `--last-sync` CLI — always know how trustworthy the
//! watermark is.
//!
//! Per-tier failures (missing table data, unreadable file, malformed values)
//! are deliberately swallowed and treated as "source unavailable": a partial
//! outage of one tracking mechanism must never block resolution, only push
//! it down a tier. The result is computed fresh on every call and never
//! cached.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::storage::{Database, LAST_SYNC_KEY};

// ============================================================================
// Types
// ============================================================================

/// Which tier produced the resolved timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSource {
    Metadata,
    Status,
    Log,
    None,
}

impl SyncSource {
    /// Stable provenance tag, used by the CLI and tests.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncSource::Metadata => "sync_metadata",
            SyncSource::Status => "sync_status",
            SyncSource::Log => "sync-log",
            SyncSource::None => "none",
        }
    }
}

/// Resolution result: the watermark and where it came from.
///
/// Exactly one source is reported; resolution short-circuits at the first
/// valid hit. `time` is `None` only when `source` is `SyncSource::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastSync {
    pub time: Option<DateTime<Utc>>,
    pub source: SyncSource,
}

impl LastSync {
    fn none() -> Self {
        Self {
            time: None,
            source: SyncSource::None,
        }
    }
}

/// One line of the legacy JSONL sync log. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct LogLine {
    status: Option<String>,
    timestamp: Option<String>,
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the last successful sync time across all three tiers.
pub async fn resolve_last_sync(db: &Database, log_path: &Path) -> LastSync {
    // Tier 1: sync_metadata key. The stored value is only trusted if it
    // parses — a malformed value falls through instead of poisoning the
    // watermark.
    match db.get_sync_metadata(LAST_SYNC_KEY).await {
        Ok(Some(value)) => match parse_timestamp(&value) {
            Some(time) => {
                return LastSync {
                    time: Some(time),
                    source: SyncSource::Metadata,
                };
            }
            None => {
                tracing::warn!(value = %value, "Malformed last_sync_time in sync_metadata, trying next source");
            }
        },
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(error = %e, "sync_metadata unavailable, trying next source");
        }
    }

    // Tier 2: most recent completed sync run.
    match db.latest_completed_sync().await {
        Ok(Some(completed_at)) => {
            if let Some(time) = parse_timestamp(&completed_at) {
                return LastSync {
                    time: Some(time),
                    source: SyncSource::Status,
                };
            }
            tracing::warn!(value = %completed_at, "Malformed completed_at in sync_status, trying next source");
        }
        Ok(None) => {}
        Err(e) => {
            tracing::debug!(error = %e, "sync_status unavailable, trying next source");
        }
    }

    // Tier 3: legacy JSONL log, newest lines last.
    if let Some(time) = last_completed_in_log(log_path) {
        return LastSync {
            time: Some(time),
            source: SyncSource::Log,
        };
    }

    LastSync::none()
}

/// Parse a stored timestamp. RFC 3339 is the canonical format; bare
/// `YYYY-MM-DD HH:MM:SS` from older deployments is accepted as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Scan the legacy log backward for the last completed entry.
///
/// Lines that fail to parse as JSON, lack a timestamp, or record a
/// non-completed status are skipped. Any read error yields `None`.
fn last_completed_in_log(path: &Path) -> Option<DateTime<Utc>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Sync log unavailable");
            return None;
        }
    };

    for line in content.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<LogLine>(line) else {
            tracing::debug!("Skipping malformed sync log line");
            continue;
        };
        if entry.status.as_deref() != Some("completed") {
            continue;
        }
        if let Some(time) = entry.timestamp.as_deref().and_then(parse_timestamp) {
            return Some(time);
        }
    }

    None
}

// ============================================================================
// Tests
// ============================================================================
