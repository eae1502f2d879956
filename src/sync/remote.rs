//! HTTP client for the Reader-style aggregation service.
//!
//! tidemark does not fetch RSS feeds itself; the aggregation service owns
//! fetching and normalization, and this client speaks its (Google Reader
//! lineage) API: subscription listing, stream contents with an `ot`
//! watermark for incremental fetch, and batched tag edits for read/starred
//! state.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::storage::{QueueAction, RemoteFeed, RemoteItem};

/// Reader state tag marking an item read.
const STATE_READ: &str = "user/-/state/com.google/read";
/// Reader state tag marking an item starred.
const STATE_STARRED: &str = "user/-/state/com.google/starred";
/// Prefix for user labels (folders on feeds, tags on items).
const LABEL_PREFIX: &str = "user/-/label/";

/// Items per stream-contents page.
const PAGE_SIZE: usize = 100;
/// Hard cap on pages per pull; protects against a runaway continuation loop.
const MAX_PAGES: usize = 50;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Rate limited by the aggregation service")]
    RateLimited,
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Unexpected response body: {0}")]
    Decode(String),
    #[error("Insecure API base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SubscriptionList {
    subscriptions: Vec<Subscription>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    id: String,
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "htmlUrl")]
    html_url: Option<String>,
    #[serde(default)]
    categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamContents {
    #[serde(default)]
    items: Vec<StreamItem>,
    #[serde(default)]
    continuation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamItem {
    id: String,
    #[serde(default)]
    title: String,
    origin: Origin,
    #[serde(default)]
    canonical: Vec<Link>,
    #[serde(default)]
    published: Option<i64>,
    #[serde(default)]
    summary: Option<Content>,
    #[serde(default)]
    categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Origin {
    #[serde(rename = "streamId")]
    stream_id: String,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    content: String,
}

impl StreamItem {
    fn into_remote_item(self) -> RemoteItem {
        let read = self.categories.iter().any(|c| c == STATE_READ);
        let starred = self.categories.iter().any(|c| c == STATE_STARRED);
        let tags = self
            .categories
            .iter()
            .filter_map(|c| c.strip_prefix(LABEL_PREFIX))
            .map(str::to_string)
            .collect();

        RemoteItem {
            remote_id: self.id,
            feed_remote_id: self.origin.stream_id,
            title: self.title,
            url: self.canonical.into_iter().next().map(|l| l.href),
            published: self.published,
            summary: self.summary.map(|c| c.content),
            read,
            starred,
            tags,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Client for one configured aggregation account.
pub struct RemoteClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<SecretString>,
}

impl RemoteClient {
    /// Build a client for the given API base URL.
    ///
    /// HTTPS is required except for localhost (wiremock and local relays).
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        token: Option<SecretString>,
    ) -> Result<Self, RemoteError> {
        if !base_url.starts_with("https://") {
            let is_localhost = base_url.starts_with("http://127.0.0.1")
                || base_url.starts_with("http://localhost");
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS API base URL");
                return Err(RemoteError::InsecureBaseUrl);
            }
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header(
                "Authorization",
                format!("Bearer {}", token.expose_secret()),
            ),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.request(builder).send())
            .await
            .map_err(|_| RemoteError::Timeout)?
            .map_err(RemoteError::Network)?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(RemoteError::RateLimited);
        }
        if !status.is_success() {
            return Err(RemoteError::HttpStatus(status.as_u16()));
        }

        Ok(response)
    }

    /// Fetch the full subscription list.
    pub async fn subscriptions(&self) -> Result<Vec<RemoteFeed>, RemoteError> {
        let url = format!("{}/subscription/list?output=json", self.base_url);
        let response = self.send(self.client.get(&url)).await?;

        let list: SubscriptionList = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        Ok(list
            .subscriptions
            .into_iter()
            .map(|sub| {
                let folder = sub.categories.into_iter().find_map(|c| c.label);
                RemoteFeed {
                    url: sub.url.unwrap_or_else(|| sub.id.clone()),
                    remote_id: sub.id,
                    title: sub.title,
                    site_url: sub.html_url,
                    folder,
                }
            })
            .collect())
    }

    /// Fetch reading-list items newer than the watermark (`ot`, unix seconds),
    /// following continuation tokens until the stream is exhausted.
    ///
    /// `ot = None` means no watermark is known and the full backlog window
    /// is fetched (bounded by `MAX_PAGES`).
    pub async fn stream_items_since(&self, ot: Option<i64>) -> Result<Vec<RemoteItem>, RemoteError> {
        let mut items = Vec::new();
        let mut continuation: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut url = format!(
                "{}/stream/contents/user/-/state/com.google/reading-list?output=json&n={}",
                self.base_url, PAGE_SIZE
            );
            if let Some(ot) = ot {
                url.push_str(&format!("&ot={}", ot));
            }
            if let Some(c) = &continuation {
                url.push_str(&format!("&c={}", c));
            }

            let response = self.send(self.client.get(&url)).await?;
            let contents: StreamContents = response
                .json()
                .await
                .map_err(|e| RemoteError::Decode(e.to_string()))?;

            let page_len = contents.items.len();
            items.extend(contents.items.into_iter().map(StreamItem::into_remote_item));

            tracing::debug!(page, fetched = page_len, total = items.len(), "Pulled stream page");

            continuation = contents.continuation;
            if continuation.is_none() || page_len == 0 {
                break;
            }
        }

        if continuation.is_some() {
            tracing::warn!(pages = MAX_PAGES, "Stream pull hit the page cap; remainder deferred to next sync");
        }

        Ok(items)
    }

    /// Push one batch of tag edits for the given item ids.
    ///
    /// Read/star map to tag additions, unread/unstar to removals, matching
    /// the Reader edit-tag contract (`a=` adds a tag, `r=` removes one).
    pub async fn edit_tags(&self, ids: &[&str], action: QueueAction) -> Result<(), RemoteError> {
        if ids.is_empty() {
            return Ok(());
        }

        let (param, tag) = match action {
            QueueAction::MarkRead => ("a", STATE_READ),
            QueueAction::MarkUnread => ("r", STATE_READ),
            QueueAction::Star => ("a", STATE_STARRED),
            QueueAction::Unstar => ("r", STATE_STARRED),
        };

        let mut form: Vec<(&str, &str)> = ids.iter().map(|id| ("i", *id)).collect();
        form.push((param, tag));

        let url = format!("{}/edit-tag", self.base_url);
        self.send(self.client.post(&url).form(&form)).await?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> RemoteClient {
        RemoteClient::new(reqwest::Client::new(), &server.uri(), None).unwrap()
    }

    #[test]
    fn test_https_required_for_non_localhost() {
        let result = RemoteClient::new(reqwest::Client::new(), "http://evil.example.com", None);
        assert!(matches!(result, Err(RemoteError::InsecureBaseUrl)));
    }

    #[tokio::test]
    async fn test_subscriptions_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/subscription/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"subscriptions":[
                    {"id":"feed/https://one.example.com/rss","title":"One",
                     "htmlUrl":"https://one.example.com",
                     "categories":[{"id":"user/-/label/Tech","label":"Tech"}]},
                    {"id":"feed/https://two.example.com/rss","title":"Two","categories":[]}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let feeds = client_for(&server).subscriptions().await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].title, "One");
        assert_eq!(feeds[0].folder.as_deref(), Some("Tech"));
        assert_eq!(feeds[1].folder, None);
    }

    #[tokio::test]
    async fn test_stream_items_include_watermark_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("ot", "1700000000"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items":[
                    {"id":"item/1","title":"Hello","origin":{"streamId":"feed/1"},
                     "canonical":[{"href":"https://example.com/1"}],
                     "published":1700000100,
                     "summary":{"content":"body"},
                     "categories":["user/-/state/com.google/read","user/-/label/rust"]}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let items = client_for(&server)
            .stream_items_since(Some(1700000000))
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].read);
        assert!(!items[0].starred);
        assert_eq!(items[0].tags, vec!["rust".to_string()]);
        assert_eq!(items[0].url.as_deref(), Some("https://example.com/1"));
    }

    #[tokio::test]
    async fn test_stream_follows_continuation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("c", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items":[{"id":"item/2","title":"B","origin":{"streamId":"feed/1"}}]}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items":[{"id":"item/1","title":"A","origin":{"streamId":"feed/1"}}],
                   "continuation":"page2"}"#,
            ))
            .mount(&server)
            .await;

        let items = client_for(&server).stream_items_since(None).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].remote_id, "item/1");
        assert_eq!(items[1].remote_id, "item/2");
    }

    #[tokio::test]
    async fn test_edit_tags_posts_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/edit-tag"))
            .and(body_string_contains("a=user%2F-%2Fstate%2Fcom.google%2Fread"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server)
            .edit_tags(&["item/1", "item/2"], QueueAction::MarkRead)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_edit_tags_empty_batch_is_noop() {
        let server = MockServer::start().await;
        // No mock mounted: any request would fail the test
        client_for(&server)
            .edit_tags(&[], QueueAction::Star)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = client_for(&server).subscriptions().await;
        assert!(matches!(result, Err(RemoteError::RateLimited)));
    }

    #[tokio::test]
    async fn test_server_error_maps_to_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client_for(&server).subscriptions().await;
        assert!(matches!(result, Err(RemoteError::HttpStatus(503))));
    }
}
