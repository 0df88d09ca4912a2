//! Data models for feed requests, fetch outcomes and ranked results.
//!
//! This module defines the core data structures used throughout the application:
//! - [`FeedUrl`]: One featured-content feed URL, used as task identity and cache key
//! - [`FetchOutcome`]: The classified result of fetching one feed URL
//! - [`ArticleStat`] / [`ViewEntry`]: Per-article totals and view history
//! - [`AggregationResult`] / [`UrlError`]: The final ranked list plus errors
//! - Feed payload types: [`FeaturedContent`], [`MostRead`], [`MostReadArticle`]
//!
//! Payload types mirror the Wikipedia Feed API JSON so `serde` can reject
//! malformed days in one place.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::WikiError;

/// A featured-content feed URL for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedUrl(String);

impl FeedUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FeedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The classified result of fetching one feed URL.
///
/// A successful fetch carries the raw body; a failed one carries the error
/// that will be reported against the URL.
#[derive(Debug)]
pub struct FetchOutcome {
    /// The URL that was requested (or served from cache).
    pub url: FeedUrl,
    /// The response body on success, or the classified failure.
    pub result: Result<String, WikiError>,
}

impl FetchOutcome {
    pub fn success(url: FeedUrl, body: String) -> Self {
        Self {
            url,
            result: Ok(body),
        }
    }

    pub fn failure(url: FeedUrl, error: WikiError) -> Self {
        Self {
            url,
            result: Err(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn body(&self) -> Option<&str> {
        self.result.as_ref().ok().map(String::as_str)
    }

    pub fn error(&self) -> Option<&WikiError> {
        self.result.as_ref().err()
    }
}

/// Views recorded for an article on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewEntry {
    /// The day the views were measured, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
    /// Views on that day.
    pub views: u64,
}

/// Accumulated statistics for one article across every folded day.
///
/// `view_history` only holds days where the article made that day's top list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleStat {
    /// Wikipedia page id, the grouping key.
    pub pageid: u64,
    /// Desktop page URL, taken from the first day the article appeared.
    pub page: String,
    /// Sum of `views` over `view_history`.
    pub total_views: u64,
    /// One entry per folded day, in fold order.
    pub view_history: Vec<ViewEntry>,
}

/// An error reported against a single URL in the response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlError {
    /// The failing URL, or an empty string for response-level notices.
    pub url: String,
    /// Human-readable message.
    pub message: String,
}

impl UrlError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Ranked articles plus the errors collected while producing them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub data: Vec<ArticleStat>,
    pub errors: Vec<UrlError>,
}

/// The subset of a featured-content payload the aggregator reads.
#[derive(Debug, Deserialize)]
pub struct FeaturedContent {
    /// Absent while the requested day is still being measured.
    pub mostread: Option<MostRead>,
}

#[derive(Debug, Deserialize)]
pub struct MostRead {
    /// Reporting date, formatted `YYYY-MM-DDZ`.
    pub date: String,
    pub articles: Vec<MostReadArticle>,
}

#[derive(Debug, Deserialize)]
pub struct MostReadArticle {
    pub pageid: u64,
    pub views: u64,
    pub content_urls: ContentUrls,
}

#[derive(Debug, Deserialize)]
pub struct ContentUrls {
    pub desktop: PageUrls,
}

#[derive(Debug, Deserialize)]
pub struct PageUrls {
    pub page: String,
}
