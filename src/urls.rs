//! Feed URL construction.
//!
//! The Feed API publishes the most-read list for day `D` under day `D + 1`,
//! so a request for `2024-02-19` fetches `.../featured/2024/02/20`.

use chrono::Days;
use tracing::debug;
use url::Url;

use crate::errors::{WikiError, WikiResult};
use crate::models::FeedUrl;
use crate::validation::{ValidatedRange, is_valid_language_code};

/// Build one featured-content URL per day of `range`, shifted one day ahead.
///
/// # Returns
///
/// URLs in chronological order, e.g.
/// `https://en.wikipedia.org/api/rest_v1/feed/featured/2024/02/20`.
///
/// # Errors
///
/// [`WikiError::InvalidLanguageCode`] if the language code does not form a
/// valid hostname label.
pub fn build_feed_urls(range: &ValidatedRange) -> WikiResult<Vec<FeedUrl>> {
    let lang = range.language_code();
    if !is_valid_language_code(lang) {
        return Err(WikiError::InvalidLanguageCode);
    }

    let first = shift(range.start_date())?;
    let last = shift(range.end_date())?;

    let urls = first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| {
            let raw = format!(
                "https://{lang}.wikipedia.org/api/rest_v1/feed/featured/{}",
                day.format("%Y/%m/%d")
            );
            Url::parse(&raw)
                .map(|url| FeedUrl::new(url.as_str()))
                .map_err(|_| WikiError::InvalidLanguageCode)
        })
        .collect::<WikiResult<Vec<_>>>()?;

    debug!(lang, count = urls.len(), "Built feed URLs");
    Ok(urls)
}

fn shift(day: chrono::NaiveDate) -> WikiResult<chrono::NaiveDate> {
    day.checked_add_days(Days::new(1))
        .ok_or(WikiError::InvalidDateRange)
}
