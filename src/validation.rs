//! Input validation for most-read requests.
//!
//! Language codes and dates arrive as raw strings from the CLI. They are
//! checked here, before any URL is built or request issued, so an invalid
//! request never causes network activity.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{WikiError, WikiResult};

/// Date format accepted for `start` and `end`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// Letters, digits and dashes only; the code is interpolated into a hostname.
static LANGUAGE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid language code pattern"));

/// A language code and inclusive date range that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRange {
    language_code: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl ValidatedRange {
    pub fn language_code(&self) -> &str {
        &self.language_code
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Number of calendar days covered, both ends included.
    pub fn days(&self) -> usize {
        (self.end_date - self.start_date).num_days() as usize + 1
    }
}

/// Check that a language code only contains letters, numbers or dashes.
pub fn is_valid_language_code(language_code: &str) -> bool {
    LANGUAGE_CODE.is_match(language_code)
}

/// Parse `start`/`end` as `YYYY-MM-DD` and validate the language code.
///
/// # Errors
///
/// - [`WikiError::InvalidStartDate`] / [`WikiError::InvalidEndDate`] when a
///   date does not parse
/// - [`WikiError::InvalidDateRange`] when `end` is before `start`
/// - [`WikiError::InvalidLanguageCode`] when the code has other characters
pub fn parse_range(language_code: &str, start: &str, end: &str) -> WikiResult<ValidatedRange> {
    let start_date =
        NaiveDate::parse_from_str(start, DATE_FORMAT).map_err(|_| WikiError::InvalidStartDate)?;
    let end_date =
        NaiveDate::parse_from_str(end, DATE_FORMAT).map_err(|_| WikiError::InvalidEndDate)?;

    if start_date > end_date {
        return Err(WikiError::InvalidDateRange);
    }

    if !is_valid_language_code(language_code) {
        return Err(WikiError::InvalidLanguageCode);
    }

    Ok(ValidatedRange {
        language_code: language_code.to_string(),
        start_date,
        end_date,
    })
}
