//! End-to-end sync tests against a mock aggregation service.
//!
//! Each test wires a fresh in-memory database to a wiremock server speaking
//! the Reader-style API and runs full sync cycles through the public engine
//! entry point.

use std::path::PathBuf;

use tidemark::storage::{ArticleQuery, Database, QueueAction, ReadFilter};
use tidemark::sync::{run_sync, RemoteClient, SyncSource};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn no_log() -> PathBuf {
    std::env::temp_dir().join("tidemark_lifecycle_no_log.jsonl")
}

fn client_for(server: &MockServer) -> RemoteClient {
    RemoteClient::new(reqwest::Client::new(), &server.uri(), None).unwrap()
}

const SUBSCRIPTIONS: &str = r#"{"subscriptions":[
    {"id":"feed/https://one.example.com/rss","title":"One",
     "htmlUrl":"https://one.example.com",
     "categories":[{"id":"user/-/label/Tech","label":"Tech"}]}
]}"#;

const STREAM_PAGE: &str = r#"{"items":[
    {"id":"item/1","title":"First post",
     "origin":{"streamId":"feed/https://one.example.com/rss"},
     "canonical":[{"href":"https://one.example.com/1"}],
     "published":1700000100,
     "summary":{"content":"First summary"},
     "categories":[]},
    {"id":"item/2","title":"Second post",
     "origin":{"streamId":"feed/https://one.example.com/rss"},
     "canonical":[{"href":"https://one.example.com/2"}],
     "published":1700000200,
     "summary":{"content":"Second summary"},
     "categories":["user/-/state/com.google/read","user/-/label/rust"]}
]}"#;

async fn mount_remote(server: &MockServer, stream_body: &str) {
    Mock::given(method("GET"))
        .and(path("/subscription/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUBSCRIPTIONS))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(stream_body.to_string()))
        .mount(server)
        .await;
}

// ============================================================================
// Pull
// ============================================================================

#[tokio::test]
async fn test_first_sync_lands_feeds_and_items() {
    let db = test_db().await;
    let server = MockServer::start().await;
    mount_remote(&server, STREAM_PAGE).await;

    let outcome = run_sync(&db, &client_for(&server), &no_log()).await.unwrap();
    assert_eq!(outcome.items_applied, 2);
    assert_eq!(outcome.watermark_source, SyncSource::None);

    let feeds = db.get_feeds_with_unread_counts().await.unwrap();
    assert_eq!(feeds.len(), 1);
    assert_eq!(&*feeds[0].title, "One");
    assert_eq!(feeds[0].folder.as_deref(), Some("Tech"));
    assert_eq!(feeds[0].unread_count, 1);

    let articles = db.get_articles(&ArticleQuery::default()).await.unwrap();
    assert_eq!(articles.len(), 2);
    let read_one = articles.iter().find(|a| a.remote_id == "item/2").unwrap();
    assert!(read_one.read);
    assert!(!articles.iter().find(|a| a.remote_id == "item/1").unwrap().read);
}

#[tokio::test]
async fn test_second_sync_uses_watermark() {
    let db = test_db().await;
    let server = MockServer::start().await;
    mount_remote(&server, STREAM_PAGE).await;

    run_sync(&db, &client_for(&server), &no_log()).await.unwrap();

    // The second pull must carry an ot param derived from the first run
    let server2 = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscription/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SUBSCRIPTIONS))
        .mount(&server2)
        .await;
    Mock::given(method("GET"))
        .and(query_param("output", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"items":[]}"#))
        .expect(1)
        .mount(&server2)
        .await;

    let outcome = run_sync(&db, &client_for(&server2), &no_log()).await.unwrap();
    assert_eq!(outcome.watermark_source, SyncSource::Metadata);

    // The stream request carried ot=<unix seconds>
    let requests = server2.received_requests().await.unwrap();
    let stream_req = requests
        .iter()
        .find(|r| r.url.path().contains("/stream/contents/"))
        .unwrap();
    assert!(stream_req.url.query().unwrap().contains("ot="));
}

#[tokio::test]
async fn test_remote_wins_over_local_read_state() {
    let db = test_db().await;
    let server = MockServer::start().await;
    mount_remote(&server, STREAM_PAGE).await;
    run_sync(&db, &client_for(&server), &no_log()).await.unwrap();

    // Mark item/1 read locally without queueing it, simulating state the
    // remote never learned about; the next pull reverts it
    let articles = db.get_articles(&ArticleQuery::default()).await.unwrap();
    let local = articles.iter().find(|a| a.remote_id == "item/1").unwrap();
    db.mark_read(local.id).await.unwrap();

    run_sync(&db, &client_for(&server), &no_log()).await.unwrap();
    let article = db.get_article(local.id).await.unwrap().unwrap();
    assert!(!article.read, "remote state wins on pull");
}

// ============================================================================
// Push
// ============================================================================

#[tokio::test]
async fn test_queued_actions_push_then_drain() {
    let db = test_db().await;
    db.enqueue_action("item/1", QueueAction::MarkRead).await.unwrap();
    db.enqueue_action("item/2", QueueAction::Star).await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edit-tag"))
        .and(body_string_contains("i=item%2F1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/edit-tag"))
        .and(body_string_contains("i=item%2F2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .expect(1)
        .mount(&server)
        .await;
    mount_remote(&server, r#"{"items":[]}"#).await;

    let outcome = run_sync(&db, &client_for(&server), &no_log()).await.unwrap();
    assert_eq!(outcome.pushed, 2);
    assert_eq!(db.queue_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rate_limited_push_defers_queue_but_pull_proceeds() {
    let db = test_db().await;
    db.enqueue_action("item/1", QueueAction::MarkRead).await.unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/edit-tag"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    mount_remote(&server, STREAM_PAGE).await;

    let outcome = run_sync(&db, &client_for(&server), &no_log()).await.unwrap();
    assert_eq!(outcome.pushed, 0);
    assert_eq!(outcome.items_applied, 2);
    // The queue entry survives for the next cycle
    assert_eq!(db.queue_len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_pull_leaves_watermark_untouched() {
    let db = test_db().await;
    let server = MockServer::start().await;
    mount_remote(&server, STREAM_PAGE).await;
    run_sync(&db, &client_for(&server), &no_log()).await.unwrap();

    let before = db
        .get_sync_metadata(tidemark::storage::LAST_SYNC_KEY)
        .await
        .unwrap()
        .unwrap();

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    assert!(run_sync(&db, &client_for(&broken), &no_log()).await.is_err());

    let after = db
        .get_sync_metadata(tidemark::storage::LAST_SYNC_KEY)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before, after);
}

// ============================================================================
// Filters After Sync
// ============================================================================

#[tokio::test]
async fn test_tagged_items_queryable_after_sync() {
    let db = test_db().await;
    let server = MockServer::start().await;
    mount_remote(&server, STREAM_PAGE).await;
    run_sync(&db, &client_for(&server), &no_log()).await.unwrap();

    let tagged = db
        .get_articles(&ArticleQuery {
            tag: Some("rust".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].remote_id, "item/2");

    let unread = db
        .get_articles(&ArticleQuery {
            filter: ReadFilter::Unread,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].remote_id, "item/1");
}
