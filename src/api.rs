//! Wikipedia Feed API access.
//!
//! This module is the boundary between the pipeline and the network. It
//! fetches one feed URL at a time and classifies the result so that ordinary
//! network problems never escape as task failures.
//!
//! # Architecture
//!
//! - [`FeedClient`]: Core trait performing a single GET
//! - [`HttpFeedClient`]: `reqwest` implementation with user agent and optional bearer token
//! - [`fetch_feed`]: Classifies a GET into a [`FetchOutcome`] and writes
//!   validated bodies back through an optional [`ResponseCache`]
//!
//! # Outcome classification
//!
//! | Result of GET | Outcome |
//! |---------------|---------|
//! | transport error | [`WikiError::Connection`] |
//! | status other than 200 | [`WikiError::UnexpectedStatus`] |
//! | status 200 | body; cached when the validator accepts it |
//!
//! Failed fetches are reported, never retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use tracing::{error, info, instrument, warn};

use crate::cache::{CacheRecord, ResponseCache};
use crate::errors::{WikiError, WikiResult};
use crate::models::{FeedUrl, FetchOutcome};

/// Status code and body of a completed GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    pub status: u16,
    pub body: String,
}

/// Trait for fetching a feed URL.
///
/// Implementors only report transport failures as errors; any HTTP status
/// is a successful [`FeedResponse`].
pub trait FeedClient: Send + Sync {
    fn get(&self, url: &str) -> impl Future<Output = WikiResult<FeedResponse>> + Send;
}

/// [`FeedClient`] backed by a shared `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    client: reqwest::Client,
}

impl HttpFeedClient {
    /// Create a client that identifies itself with `user_agent`.
    ///
    /// # Arguments
    ///
    /// * `user_agent` - Sent on every request; Wikimedia asks for a contact-bearing agent
    /// * `access_token` - Optional API token sent as `Authorization: Bearer`
    pub fn new(user_agent: &str, access_token: Option<&str>) -> WikiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|_| WikiError::Config(format!("invalid user agent: {user_agent}")))?,
        );
        if let Some(token) = access_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| WikiError::Config("invalid access token".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

impl FeedClient for HttpFeedClient {
    #[instrument(level = "debug", skip(self))]
    async fn get(&self, url: &str) -> WikiResult<FeedResponse> {
        let send = async {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(FeedResponse { status, body })
        };
        send.await.map_err(|e| WikiError::Connection(e.to_string()))
    }
}

/// Check that a payload carries a non-empty `mostread` object.
///
/// Days that are still being measured come back as 200 without one; those
/// must not be cached or they would shadow the real data later.
pub fn has_most_read(body: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|content| {
            content
                .get("mostread")
                .and_then(|m| m.as_object())
                .map(|m| !m.is_empty())
        })
        .unwrap_or(false)
}

/// Fetch one feed URL and classify the result.
///
/// # Arguments
///
/// * `client` - The transport
/// * `url` - The feed URL
/// * `cache` - Where to store accepted bodies, if caching is enabled
/// * `validator` - Decides whether a 200 body is worth caching
///
/// # Returns
///
/// A [`FetchOutcome`]; this function never fails. Cache write errors are
/// logged and do not affect the outcome.
#[instrument(level = "info", skip_all, fields(url = %url))]
pub async fn fetch_feed<C: FeedClient>(
    client: &C,
    url: FeedUrl,
    cache: Option<Arc<dyn ResponseCache>>,
    validator: fn(&str) -> bool,
) -> FetchOutcome {
    let t0 = Instant::now();
    info!("Fetching");

    let response = match client.get(url.as_str()).await {
        Ok(response) => response,
        Err(e) => {
            error!(
                elapsed_ms = t0.elapsed().as_millis() as u64,
                error = ?e,
                "Wikipedia API connection error"
            );
            return FetchOutcome::failure(url, e);
        }
    };

    if response.status != 200 {
        warn!(
            status = response.status,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Unexpected response status"
        );
        return FetchOutcome::failure(url, WikiError::UnexpectedStatus(response.status));
    }

    if let Some(cache) = cache {
        if validator(&response.body) {
            let record = CacheRecord::new(url.as_str(), response.status, response.body.as_str());
            match store(cache, record).await {
                Ok(()) => info!("Cache put"),
                Err(e) => warn!(error = %e, "Cache put failed; continuing"),
            }
        }
    }

    info!(
        bytes = response.body.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "Fetched"
    );
    FetchOutcome::success(url, response.body)
}

/// Write `record` on the blocking pool; stores may touch the filesystem.
async fn store(cache: Arc<dyn ResponseCache>, record: CacheRecord) -> WikiResult<()> {
    tokio::task::spawn_blocking(move || cache.put(&record))
        .await
        .map_err(|e| WikiError::Cache(format!("cache write task failed: {e}")))?
}
