//! Folding of daily most-read lists into one ranked list.
//!
//! Every successful featured-content payload contributes its `mostread`
//! articles. Articles are grouped by page id; each group sums its views and
//! records one `{date, views}` entry per day it appeared, in fold order.
//!
//! The fold keeps first-encounter order explicitly (a `Vec` plus a key index)
//! so that the stable sort breaks ties in favor of the article seen first.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::{debug, error, instrument, warn};

use crate::errors::{WikiError, WikiResult};
use crate::models::{AggregationResult, ArticleStat, FeaturedContent, UrlError, ViewEntry};
use crate::utils::truncate_for_log;

/// Reporting date format used by `mostread.date`.
const MOST_READ_DATE_FORMAT: &str = "%Y-%m-%dZ";

/// Default cap on ranked results.
pub const DEFAULT_MAX_RESULTS: usize = 5000;

/// Insertion-ordered accumulator of article statistics.
#[derive(Debug, Default)]
struct ArticleStats {
    stats: Vec<ArticleStat>,
    index: HashMap<u64, usize>,
}

impl ArticleStats {
    fn record(&mut self, pageid: u64, page: &str, date: NaiveDate, views: u64) {
        let slot = match self.index.get(&pageid) {
            Some(&slot) => slot,
            None => {
                self.stats.push(ArticleStat {
                    pageid,
                    page: page.to_string(),
                    total_views: 0,
                    view_history: Vec::new(),
                });
                self.index.insert(pageid, self.stats.len() - 1);
                self.stats.len() - 1
            }
        };

        let stat = &mut self.stats[slot];
        stat.total_views += views;
        stat.view_history.push(ViewEntry { date, views });
    }

    /// Consume the accumulator, most viewed first; ties keep fold order.
    fn into_ranked(self) -> Vec<ArticleStat> {
        self.stats
            .into_iter()
            .sorted_by_key(|stat| Reverse(stat.total_views))
            .collect()
    }
}

/// Fold one payload into `stats`.
fn fold_payload(stats: &mut ArticleStats, payload: &str) -> WikiResult<()> {
    let content: FeaturedContent = serde_json::from_str(payload).map_err(|e| {
        error!(
            error = %e,
            payload = %truncate_for_log(payload, 300),
            "Invalid featured content response"
        );
        WikiError::ContentProcessing
    })?;

    // Absent while the day is still being measured.
    let Some(most_read) = content.mostread else {
        debug!("Payload has no mostread block; skipping day");
        return Ok(());
    };

    let date = NaiveDate::parse_from_str(&most_read.date, MOST_READ_DATE_FORMAT).map_err(|e| {
        error!(date = %most_read.date, error = %e, "Unexpected mostread date");
        WikiError::ContentProcessing
    })?;

    for article in &most_read.articles {
        stats.record(
            article.pageid,
            &article.content_urls.desktop.page,
            date,
            article.views,
        );
    }
    debug!(%date, articles = most_read.articles.len(), "Folded day");
    Ok(())
}

/// Reduce daily payloads into a ranked list, capped at `max_results`.
///
/// # Arguments
///
/// * `payloads` - Raw featured-content bodies, folded in the given order
/// * `max_results` - Maximum number of articles to return
///
/// # Returns
///
/// The ranked articles. When the cap applies, `errors` holds a single
/// notice with an empty URL describing the truncation.
///
/// # Errors
///
/// [`WikiError::ContentProcessing`] if any payload is not valid JSON, lacks
/// an expected field, or carries a non-numeric view count. One bad payload
/// fails the whole reduction.
#[instrument(level = "info", skip(payloads), fields(payloads = payloads.len()))]
pub fn reduce<S: AsRef<str>>(payloads: &[S], max_results: usize) -> WikiResult<AggregationResult> {
    let mut stats = ArticleStats::default();
    for payload in payloads {
        fold_payload(&mut stats, payload.as_ref())?;
    }

    let mut data = stats.into_ranked();
    let mut errors = Vec::new();
    let total = data.len();
    if total > max_results {
        warn!(total, max_results, "Truncating ranked results");
        errors.push(UrlError::new(
            "",
            format!("Limited response to {max_results} out of {total} results."),
        ));
        data.truncate(max_results);
    }

    Ok(AggregationResult { data, errors })
}
