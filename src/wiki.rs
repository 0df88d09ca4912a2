//! The most-read articles pipeline.
//!
//! [`WikiApi::fetch_most_read_articles`] drives one request end to end:
//!
//! 1. **Validate**: parse the language code and date range
//! 2. **Build**: one feed URL per day, shifted one day ahead
//! 3. **Cache**: serve known URLs from the [`ResponseCache`]
//! 4. **Fetch**: schedule the misses through the [`RateLimitedScheduler`]
//! 5. **Fold**: reduce successful bodies into a ranked list and attach
//!    per-URL errors
//!
//! Day slots are folded in URL order whether they came from the cache or the
//! network, so every `view_history` is chronological.
//!
//! [`run_with_deadline`] wraps a request in the outer timeout and turns the
//! result into the [`MostReadResponse`] envelope.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregate::reduce;
use crate::api::{FeedClient, fetch_feed, has_most_read};
use crate::cache::ResponseCache;
use crate::errors::{WikiError, WikiResult};
use crate::models::{AggregationResult, FeedUrl, FetchOutcome, UrlError};
use crate::scheduler::{RateLimitedScheduler, SchedulerError};
use crate::urls::build_feed_urls;
use crate::validation::parse_range;

/// Client for ranked most-read articles over a date range.
pub struct WikiApi<C> {
    client: Arc<C>,
    cache: Option<Arc<dyn ResponseCache>>,
    scheduler: RateLimitedScheduler,
    max_results: usize,
}

impl<C> WikiApi<C>
where
    C: FeedClient + 'static,
{
    pub fn new(client: Arc<C>, scheduler: RateLimitedScheduler, max_results: usize) -> Self {
        Self {
            client,
            cache: None,
            scheduler,
            max_results,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch and rank the most-read articles for `lang_code` between `start`
    /// and `end` (inclusive, `YYYY-MM-DD`).
    ///
    /// # Returns
    ///
    /// Articles sorted by total views, descending, with one `errors` entry
    /// per URL that could not be fetched. A truncation notice, if any, comes
    /// first.
    ///
    /// # Errors
    ///
    /// - Validation errors, before any request is made
    /// - [`WikiError::ContentProcessing`] if any fetched day is malformed
    /// - [`WikiError::Scheduler`] if a fetch task fails unexpectedly
    #[instrument(level = "info", skip(self))]
    pub async fn fetch_most_read_articles(
        &self,
        lang_code: &str,
        start: &str,
        end: &str,
    ) -> WikiResult<AggregationResult> {
        let range = parse_range(lang_code, start, end)?;
        let urls = build_feed_urls(&range)?;
        info!(days = range.days(), "Resolving featured content");

        let outcomes = self.resolve(urls).await?;

        let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
        debug!(succeeded, failed = outcomes.len() - succeeded, "Resolved days");

        let bodies: Vec<&str> = outcomes.iter().filter_map(FetchOutcome::body).collect();
        let url_errors: Vec<UrlError> = outcomes
            .iter()
            .filter_map(|o| {
                o.error()
                    .map(|e| UrlError::new(o.url.as_str(), e.to_string()))
            })
            .collect();

        let mut result = reduce(&bodies, self.max_results)?;
        result.errors.extend(url_errors);
        info!(
            articles = result.data.len(),
            errors = result.errors.len(),
            "Ranked most-read articles"
        );
        Ok(result)
    }

    /// Produce one outcome per URL, in URL order.
    async fn resolve(&self, urls: Vec<FeedUrl>) -> WikiResult<Vec<FetchOutcome>> {
        let mut slots: Vec<Option<FetchOutcome>> = Vec::with_capacity(urls.len());
        let mut misses: Vec<(usize, FeedUrl)> = Vec::new();

        for (index, url) in urls.into_iter().enumerate() {
            match self.cache_get(&url).await {
                Some(body) => {
                    info!(%url, "Cache hit");
                    slots.push(Some(FetchOutcome::success(url, body)));
                }
                None => {
                    slots.push(None);
                    misses.push((index, url));
                }
            }
        }

        if misses.is_empty() {
            debug!("All days served from cache");
        } else {
            let (indices, tasks): (Vec<usize>, Vec<_>) = misses
                .into_iter()
                .map(|(index, url)| {
                    let client = Arc::clone(&self.client);
                    let cache = self.cache.clone();
                    let task = async move {
                        let outcome =
                            fetch_feed(&*client, url, cache, has_most_read).await;
                        Ok::<_, WikiError>(outcome)
                    };
                    (index, task)
                })
                .unzip();

            let fetched = self.scheduler.run(tasks).await?;
            for (index, outcome) in indices.into_iter().zip(fetched) {
                slots[index] = Some(outcome);
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or(WikiError::Scheduler(SchedulerError::Incomplete(index)))
            })
            .collect()
    }

    /// Look up a cached body on the blocking pool. Lookup failures count as
    /// misses.
    async fn cache_get(&self, url: &FeedUrl) -> Option<String> {
        let cache = Arc::clone(self.cache.as_ref()?);
        let key = url.as_str().to_string();
        let lookup = tokio::task::spawn_blocking(move || cache.get(&key))
            .await
            .map_err(|e| WikiError::Cache(format!("cache lookup task failed: {e}")))
            .and_then(|result| result);
        match lookup {
            Ok(Some(record)) => Some(record.body),
            Ok(None) => None,
            Err(e) => {
                warn!(%url, error = %e, "Cache lookup failed; fetching instead");
                None
            }
        }
    }
}

/// The response envelope returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MostReadResponse {
    Success(AggregationResult),
    RequestError { request_error: String },
}

impl MostReadResponse {
    pub fn request_error(message: impl Into<String>) -> Self {
        MostReadResponse::RequestError {
            request_error: message.into(),
        }
    }

    /// HTTP-style status for the envelope: 200 on success, 400 otherwise.
    pub fn status_code(&self) -> u16 {
        match self {
            MostReadResponse::Success(_) => 200,
            MostReadResponse::RequestError { .. } => 400,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MostReadResponse::Success(_))
    }
}

impl From<WikiResult<AggregationResult>> for MostReadResponse {
    fn from(result: WikiResult<AggregationResult>) -> Self {
        match result {
            Ok(result) => MostReadResponse::Success(result),
            Err(e) => MostReadResponse::request_error(e.to_string()),
        }
    }
}

/// Run `request` under `timeout`.
///
/// On expiry the request future is dropped, which aborts its scheduler loop
/// and every fetch still in flight. Nothing is salvaged from a timed-out
/// request.
#[instrument(level = "info", skip(request))]
pub async fn run_with_deadline<F>(request: F, timeout: Duration) -> MostReadResponse
where
    F: Future<Output = WikiResult<AggregationResult>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => {
            match &result {
                Err(e) if e.is_validation() => info!(error = %e, "Rejected invalid request"),
                Err(e) => warn!(error = %e, "Request failed"),
                Ok(_) => {}
            }
            result.into()
        }
        Err(_) => {
            error!(?timeout, "Request exceeded deadline; cancelled");
            MostReadResponse::request_error(WikiError::Timeout.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::stub::StubClient;
    use crate::cache::{CacheRecord, MemoryCache};
    use chrono::NaiveDate;
    use serde_json::json;

    const FEED: &str = "https://es.wikipedia.org/api/rest_v1/feed/featured";

    fn payload(date: &str, articles: &[(u64, &str, u64)]) -> String {
        let articles: Vec<_> = articles
            .iter()
            .map(|(pageid, title, views)| {
                json!({
                    "pageid": pageid,
                    "views": views,
                    "content_urls": {"desktop": {"page": format!("https://es.wikipedia.org/wiki/{title}")}}
                })
            })
            .collect();
        json!({"mostread": {"date": date, "articles": articles}}).to_string()
    }

    fn api(client: StubClient, max_results: usize) -> (Arc<StubClient>, WikiApi<StubClient>) {
        let client = Arc::new(client);
        let scheduler = RateLimitedScheduler::new(2, Duration::from_secs(1)).unwrap();
        (Arc::clone(&client), WikiApi::new(client, scheduler, max_results))
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_day_end_to_end() {
        let body = payload(
            "2024-02-19Z",
            &[(10, "Página_principal_bis", 50), (11, "Shakira", 900), (12, "Messi", 300)],
        );
        let (client, api) = api(
            StubClient::new().respond(&format!("{FEED}/2024/02/20"), 200, &body),
            5000,
        );

        let result = api.fetch_most_read_articles("es", "2024-02-19", "2024-02-19").await.unwrap();

        assert_eq!(client.seen(), vec![format!("{FEED}/2024/02/20")]);
        assert!(result.errors.is_empty());
        assert_eq!(result.data[0].page, "https://es.wikipedia.org/wiki/Shakira");
        assert_eq!(result.data[0].total_views, 900);
        assert_eq!(
            result.data[0].view_history[0].date,
            NaiveDate::from_ymd_opt(2024, 2, 19).unwrap()
        );
    }

    #[tokio::test]
    async fn test_invalid_range_makes_no_requests() {
        let (client, api) = api(StubClient::new(), 5000);

        let err = api
            .fetch_most_read_articles("es", "2024-01-14", "2024-01-13")
            .await
            .unwrap_err();

        assert!(matches!(err, WikiError::InvalidDateRange));
        assert_eq!(client.requests(), 0);

        let err = api
            .fetch_most_read_articles("es/../", "2024-01-13", "2024-01-14")
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::InvalidLanguageCode));
        assert_eq!(client.requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_url_errors_do_not_abort() {
        let (_, api) = api(
            StubClient::new()
                .respond(&format!("{FEED}/2024/02/20"), 200, &payload("2024-02-19Z", &[(1, "A", 5)]))
                .respond(&format!("{FEED}/2024/02/21"), 503, "unavailable"),
            5000,
        );

        let result = api.fetch_most_read_articles("es", "2024-02-19", "2024-02-21").await.unwrap();

        assert_eq!(result.data.len(), 1);
        assert_eq!(
            result.errors,
            vec![
                UrlError::new(
                    format!("{FEED}/2024/02/21"),
                    "Wikipedia server returned an unexpected response, could be rate limited."
                ),
                UrlError::new(
                    format!("{FEED}/2024/02/22"),
                    "Error connecting to the Wikipedia server."
                ),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hits_skip_fetch_and_history_stays_chronological() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .put(&CacheRecord::new(
                format!("{FEED}/2024/02/21"),
                200,
                payload("2024-02-20Z", &[(1, "A", 2)]),
            ))
            .unwrap();

        let (client, api) = api(
            StubClient::new()
                .respond(&format!("{FEED}/2024/02/20"), 200, &payload("2024-02-19Z", &[(1, "A", 1)]))
                .respond(&format!("{FEED}/2024/02/22"), 200, &payload("2024-02-21Z", &[(1, "A", 3)])),
            5000,
        );
        let api = api.with_cache(cache.clone());

        let result = api.fetch_most_read_articles("es", "2024-02-19", "2024-02-21").await.unwrap();

        assert_eq!(client.requests(), 2);
        assert!(!client.seen().contains(&format!("{FEED}/2024/02/21")));
        let dates: Vec<String> = result.data[0]
            .view_history
            .iter()
            .map(|v| v.date.to_string())
            .collect();
        assert_eq!(dates, vec!["2024-02-19", "2024-02-20", "2024-02-21"]);
        assert_eq!(result.data[0].total_views, 6);

        // Fetched days were written back.
        assert!(cache.get(&format!("{FEED}/2024/02/22")).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmeasured_day_is_skipped_and_not_cached() {
        let cache = Arc::new(MemoryCache::new());
        let (_, api) = api(
            StubClient::new().respond(&format!("{FEED}/2024/02/20"), 200, r#"{"tfa": {}}"#),
            5000,
        );
        let api = api.with_cache(cache.clone());

        let result = api.fetch_most_read_articles("es", "2024-02-19", "2024-02-19").await.unwrap();

        assert!(result.data.is_empty());
        assert!(result.errors.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_day_fails_request() {
        let (_, api) = api(
            StubClient::new().respond(&format!("{FEED}/2024/02/20"), 200, "<html>"),
            5000,
        );

        let err = api
            .fetch_most_read_articles("es", "2024-02-19", "2024-02-19")
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::ContentProcessing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_notice_precedes_url_errors() {
        let (_, api) = api(
            StubClient::new().respond(
                &format!("{FEED}/2024/02/20"),
                200,
                &payload("2024-02-19Z", &[(1, "A", 3), (2, "B", 2), (3, "C", 1)]),
            ),
            1,
        );

        let result = api.fetch_most_read_articles("es", "2024-02-19", "2024-02-20").await.unwrap();

        assert_eq!(result.data.len(), 1);
        assert_eq!(result.errors[0], UrlError::new("", "Limited response to 1 out of 3 results."));
        assert_eq!(result.errors[1].url, format!("{FEED}/2024/02/21"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_cancels_request() {
        let (client, api) = api(
            StubClient::new()
                .with_delay(Duration::from_secs(30))
                .respond(&format!("{FEED}/2024/02/20"), 200, &payload("2024-02-19Z", &[])),
            5000,
        );

        let response = run_with_deadline(
            api.fetch_most_read_articles("es", "2024-02-19", "2024-02-24"),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(
            response,
            MostReadResponse::request_error("The server took too long to complete the task.")
        );
        assert_eq!(response.status_code(), 400);
        // No slot frees up before the deadline, so only the first batch ran.
        assert_eq!(client.requests(), 2);
    }

    #[tokio::test]
    async fn test_deadline_envelopes() {
        let ok = run_with_deadline(
            async { Ok::<_, WikiError>(AggregationResult::default()) },
            Duration::from_secs(1),
        )
        .await;
        assert!(ok.is_success());
        assert_eq!(ok.status_code(), 200);
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"data": [], "errors": []})
        );

        let failed = run_with_deadline(
            async { Err::<AggregationResult, _>(WikiError::InvalidStartDate) },
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"request_error": "Invalid start date."})
        );
    }
}
