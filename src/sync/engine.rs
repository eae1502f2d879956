//! Sync orchestration: push local mutations, then pull remote state.
//!
//! Push runs first so that a mark-read made offline reaches the service
//! before the pull would otherwise clobber it with stale remote state. The
//! pull itself is remote-wins: whatever read/starred state the service
//! reports after our push is the truth we store.

use chrono::Utc;
use thiserror::Error;

use crate::storage::{Database, DatabaseError, QueueAction, QueueEntry, LAST_SYNC_KEY};
use crate::sync::last_sync::{resolve_last_sync, SyncSource};
use crate::sync::remote::{RemoteClient, RemoteError};

/// Queue entries pushed per edit-tag request.
const PUSH_BATCH: usize = 50;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// What a completed sync accomplished, for the status bar and `--sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Items inserted or updated by the pull.
    pub items_applied: u64,
    /// Queue entries successfully pushed.
    pub pushed: u64,
    /// Queue entries dropped after exhausting push attempts.
    pub dropped: u64,
    /// Which tier supplied the incremental watermark.
    pub watermark_source: SyncSource,
}

/// Run one full sync cycle against the aggregation service.
///
/// The run is recorded in `sync_status` for its whole lifetime: `running`
/// while in flight, then `completed` with the applied-item count or `failed`
/// with the error message. The watermark in `sync_metadata` is only advanced
/// after a pull lands, and is set to the pull's start time so items published
/// mid-pull are picked up next cycle.
pub async fn run_sync(
    db: &Database,
    client: &RemoteClient,
    log_path: &std::path::Path,
) -> Result<SyncOutcome, SyncError> {
    let run_id = db.begin_sync_run().await?;

    match sync_inner(db, client, log_path).await {
        Ok(outcome) => {
            db.complete_sync_run(run_id, outcome.items_applied as i64)
                .await?;
            tracing::info!(
                items = outcome.items_applied,
                pushed = outcome.pushed,
                dropped = outcome.dropped,
                watermark = outcome.watermark_source.as_str(),
                "Sync completed"
            );
            Ok(outcome)
        }
        Err(e) => {
            if let Err(record_err) = db.fail_sync_run(run_id, &e.to_string()).await {
                tracing::error!(error = %record_err, "Failed to record sync failure");
            }
            Err(e)
        }
    }
}

async fn sync_inner(
    db: &Database,
    client: &RemoteClient,
    log_path: &std::path::Path,
) -> Result<SyncOutcome, SyncError> {
    // Phase 1: push the offline mutation queue.
    let (pushed, dropped) = push_queue(db, client).await?;

    // Phase 2: refresh the subscription list.
    let feeds = client.subscriptions().await?;
    db.upsert_feeds(&feeds).await?;
    let feed_ids = db.feed_ids_by_remote_id().await?;

    // Phase 3: incremental item pull from the resolved watermark.
    let last = resolve_last_sync(db, log_path).await;
    let pull_started = Utc::now();
    let ot = last.time.map(|t| t.timestamp());
    tracing::debug!(
        source = last.source.as_str(),
        ot = ?ot,
        "Pulling stream from watermark"
    );

    let items = client.stream_items_since(ot).await?;
    let items_applied = db.upsert_items(&items, &feed_ids).await? as u64;

    // Phase 4: advance the watermark only after the pull has landed.
    db.set_sync_metadata(LAST_SYNC_KEY, &pull_started.to_rfc3339())
        .await?;

    Ok(SyncOutcome {
        items_applied,
        pushed,
        dropped,
        watermark_source: last.source,
    })
}

/// Push pending queue entries, batched per action.
///
/// A batch that fails gets its attempt counts bumped and stays queued for
/// the next cycle; entries past the attempt cap are dropped. One failing
/// batch does not abort the rest of the push, and never aborts the pull.
async fn push_queue(db: &Database, client: &RemoteClient) -> Result<(u64, u64), SyncError> {
    let mut pushed = 0u64;
    let mut dropped = 0u64;

    loop {
        let pending = db.pending_queue(PUSH_BATCH as i64).await?;
        if pending.is_empty() {
            break;
        }

        let mut batch_failed = false;
        for action in [
            QueueAction::MarkRead,
            QueueAction::MarkUnread,
            QueueAction::Star,
            QueueAction::Unstar,
        ] {
            let group: Vec<&QueueEntry> =
                pending.iter().filter(|e| e.action == action).collect();
            if group.is_empty() {
                continue;
            }

            let item_ids: Vec<&str> =
                group.iter().map(|e| e.article_remote_id.as_str()).collect();
            let entry_ids: Vec<i64> = group.iter().map(|e| e.id).collect();

            match client.edit_tags(&item_ids, action).await {
                Ok(()) => {
                    db.ack_queue(&entry_ids).await?;
                    pushed += entry_ids.len() as u64;
                }
                Err(RemoteError::RateLimited) => {
                    // Back off entirely; the queue survives for next cycle
                    tracing::warn!("Push rate limited, deferring remaining queue");
                    dropped += db.record_push_failure(&entry_ids).await?;
                    return Ok((pushed, dropped));
                }
                Err(e) => {
                    tracing::warn!(action = action.as_str(), error = %e, "Push batch failed");
                    dropped += db.record_push_failure(&entry_ids).await?;
                    batch_failed = true;
                }
            }
        }

        // A failed group stays queued; retrying it this cycle would just
        // burn through its attempt budget. Defer to the next sync.
        if batch_failed {
            break;
        }
    }

    Ok((pushed, dropped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn no_log() -> std::path::PathBuf {
        std::env::temp_dir().join("tidemark_engine_no_log.jsonl")
    }

    async fn mock_empty_remote(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/subscription/list"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"subscriptions":[]}"#),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[]}"#))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_empty_sync_completes_and_sets_watermark() {
        let db = test_db().await;
        let server = MockServer::start().await;
        mock_empty_remote(&server).await;
        let client = RemoteClient::new(reqwest::Client::new(), &server.uri(), None).unwrap();

        let outcome = run_sync(&db, &client, &no_log()).await.unwrap();
        assert_eq!(outcome.items_applied, 0);
        assert_eq!(outcome.watermark_source, SyncSource::None);

        // The run is recorded and the watermark is set for next time
        let run = db.latest_sync_run().await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert!(db
            .get_sync_metadata(LAST_SYNC_KEY)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_second_sync_resolves_metadata_watermark() {
        let db = test_db().await;
        let server = MockServer::start().await;
        mock_empty_remote(&server).await;
        let client = RemoteClient::new(reqwest::Client::new(), &server.uri(), None).unwrap();

        run_sync(&db, &client, &no_log()).await.unwrap();
        let outcome = run_sync(&db, &client, &no_log()).await.unwrap();
        assert_eq!(outcome.watermark_source, SyncSource::Metadata);
    }

    #[tokio::test]
    async fn test_failed_pull_records_failed_run() {
        let db = test_db().await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let client = RemoteClient::new(reqwest::Client::new(), &server.uri(), None).unwrap();

        let result = run_sync(&db, &client, &no_log()).await;
        assert!(result.is_err());

        let run = db.latest_sync_run().await.unwrap().unwrap();
        assert_eq!(run.status, "failed");
        assert!(run.error.is_some());
    }

    #[tokio::test]
    async fn test_push_runs_before_pull() {
        let db = test_db().await;
        db.enqueue_action("item/1", QueueAction::MarkRead)
            .await
            .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/edit-tag"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;
        mock_empty_remote(&server).await;
        let client = RemoteClient::new(reqwest::Client::new(), &server.uri(), None).unwrap();

        let outcome = run_sync(&db, &client, &no_log()).await.unwrap();
        assert_eq!(outcome.pushed, 1);
        assert_eq!(db.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_push_keeps_queue_and_sync_continues() {
        let db = test_db().await;
        db.enqueue_action("item/1", QueueAction::MarkRead)
            .await
            .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/edit-tag"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        mock_empty_remote(&server).await;
        let client = RemoteClient::new(reqwest::Client::new(), &server.uri(), None).unwrap();

        let outcome = run_sync(&db, &client, &no_log()).await.unwrap();
        assert_eq!(outcome.pushed, 0);
        // Entry survives with a bumped attempt count
        let pending = db.pending_queue(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 1);
    }
}
