//! Full-content fetching through a reader proxy.
//!
//! Partial feeds ship a stub summary; the real article body is obtained by
//! asking a reader proxy (r.jina.ai by default) to fetch and extract the
//! page as markdown. The proxy URL scheme is `{base}/{article_url}`.

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::util::validate_url;

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Minimum extracted length to count as a successful extraction. Shorter
/// bodies are error pages or cookie walls the proxy failed to see past.
const MIN_EXTRACTED_LEN: usize = 80;

/// Minimum spacing between proxy requests, shared across all fetch tasks.
const MIN_REQUEST_INTERVAL_MS: u64 = 100;

static LAST_REQUEST_MS: AtomicU64 = AtomicU64::new(0);

// Monotonic clock for request spacing; SystemTime can jump backward.
static START_INSTANT: OnceLock<Instant> = OnceLock::new();

fn monotonic_ms() -> u64 {
    let start = START_INSTANT.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after 20s")]
    Timeout,
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Rate limited by the content proxy")]
    RateLimited,
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Proxy could not extract article content")]
    Extraction,
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

impl ContentError {
    /// Transient errors are retried with backoff within a single fetch.
    fn is_retryable(&self) -> bool {
        match self {
            ContentError::Timeout | ContentError::Network(_) => true,
            ContentError::HttpStatus(status) => *status >= 500,
            _ => false,
        }
    }

    /// Permanent failures will never succeed for this URL; callers use this
    /// to decide whether offering a retry makes any sense.
    pub fn is_permanent(&self) -> bool {
        match self {
            ContentError::Extraction
            | ContentError::InvalidUrl
            | ContentError::InvalidUtf8
            | ContentError::ResponseTooLarge(_)
            | ContentError::InsecureBaseUrl => true,
            ContentError::HttpStatus(status) => *status < 500,
            ContentError::Timeout | ContentError::Network(_) | ContentError::RateLimited => false,
        }
    }
}

/// Fetch extracted article content for `url` through the reader proxy.
///
/// The article URL is validated first (scheme, localhost, private ranges);
/// the proxy base must be HTTPS except for localhost. An optional proxy
/// token is sent as a bearer header.
pub async fn fetch_content(
    client: &reqwest::Client,
    url: &str,
    base_url: &str,
    token: Option<&SecretString>,
) -> Result<String, ContentError> {
    wait_for_request_slot().await;

    let parsed_url = validate_url(url).map_err(|_| ContentError::InvalidUrl)?;

    if !base_url.starts_with("https://") {
        let is_localhost = base_url.starts_with("http://127.0.0.1")
            || base_url.starts_with("http://localhost");
        if !is_localhost {
            tracing::error!(base_url = %base_url, "Rejecting non-HTTPS proxy base URL");
            return Err(ContentError::InsecureBaseUrl);
        }
    }

    let proxy_url = format!("{}/{}", base_url.trim_end_matches('/'), parsed_url.as_str());
    let content = fetch_with_retry(client, &proxy_url, token).await?;

    if content.trim().len() < MIN_EXTRACTED_LEN {
        tracing::debug!(url = %url, len = content.len(), "Proxy returned near-empty extraction");
        return Err(ContentError::Extraction);
    }

    Ok(content)
}

/// Space requests at least `MIN_REQUEST_INTERVAL_MS` apart. Contention is
/// rare (fetches are serialized per article), so a lost compare-exchange
/// just loops after a short sleep, with a total budget as a safety valve.
async fn wait_for_request_slot() {
    let budget_start = Instant::now();
    const BUDGET: Duration = Duration::from_secs(5);

    loop {
        if budget_start.elapsed() > BUDGET {
            tracing::debug!("Request spacing budget exceeded, proceeding");
            return;
        }

        let now = monotonic_ms();
        let last = LAST_REQUEST_MS.load(Ordering::Acquire);
        let next_allowed = last.saturating_add(MIN_REQUEST_INTERVAL_MS);

        if now >= next_allowed {
            if LAST_REQUEST_MS
                .compare_exchange(last, now, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        } else {
            let wait_ms = next_allowed.saturating_sub(now).max(1);
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    }
}

/// Retry transient failures with exponential backoff: 1s, 2s, 4s.
async fn fetch_with_retry(
    client: &reqwest::Client,
    proxy_url: &str,
    token: Option<&SecretString>,
) -> Result<String, ContentError> {
    const MAX_RETRIES: u32 = 3;
    let mut retry_count = 0;

    loop {
        match fetch_once(client, proxy_url, token).await {
            Ok(content) => return Ok(content),
            Err(e) if e.is_retryable() && retry_count < MAX_RETRIES => {
                let delay = 1u64 << retry_count;
                tracing::debug!(
                    error = %e,
                    retry = retry_count + 1,
                    delay_secs = delay,
                    "Retrying proxy fetch after transient error"
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn fetch_once(
    client: &reqwest::Client,
    proxy_url: &str,
    token: Option<&SecretString>,
) -> Result<String, ContentError> {
    let mut request = client.get(proxy_url);
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {}", token.expose_secret()));
    }

    let response = tokio::time::timeout(Duration::from_secs(20), request.send())
        .await
        .map_err(|_| ContentError::Timeout)?
        .map_err(ContentError::Network)?;

    let status = response.status();
    if status.as_u16() == 429 {
        return Err(ContentError::RateLimited);
    }
    // 422 is the proxy's "fetched the page but found no article" answer
    if status.as_u16() == 422 {
        return Err(ContentError::Extraction);
    }
    if !status.is_success() {
        return Err(ContentError::HttpStatus(status.as_u16()));
    }

    read_limited_text(response, MAX_CONTENT_SIZE).await
}

/// Read a response body with a hard size cap, enforced while streaming so a
/// response without Content-Length cannot balloon memory.
async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ContentError> {
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ContentError::InvalidUtf8)
}
