//! Error taxonomy for the most-read pipeline.
//!
//! Errors fall into four groups:
//! - **Validation**: bad language code or dates, raised before any request.
//! - **Per-URL transport**: connection failures and unexpected statuses. These
//!   are carried inside a [`FetchOutcome`](crate::models::FetchOutcome) and end
//!   up in the response `errors` list, they never abort a batch.
//! - **Content**: a fetched payload that cannot be folded. Fatal to the whole
//!   aggregation.
//! - **Scheduler / timeout**: unhandled task failures and the outer deadline.

use thiserror::Error;

use crate::scheduler::SchedulerError;

#[derive(Error, Debug)]
pub enum WikiError {
    // Validation errors
    #[error("Invalid Wikipedia language code.")]
    InvalidLanguageCode,

    #[error("Invalid start date.")]
    InvalidStartDate,

    #[error("Invalid end date.")]
    InvalidEndDate,

    #[error("Invalid date range, start date should be before the end date.")]
    InvalidDateRange,

    // Per-URL transport errors
    #[error("Error connecting to the Wikipedia server.")]
    Connection(String),

    #[error("Wikipedia server returned an unexpected response, could be rate limited.")]
    UnexpectedStatus(u16),

    // Content errors
    #[error(
        "Unexpected error while processing the content of a response from the Wikipedia API."
    )]
    ContentProcessing,

    // Scheduling errors
    #[error("Task scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("The server took too long to complete the task.")]
    Timeout,

    // Ambient errors
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WikiError {
    /// Whether this error is raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WikiError::InvalidLanguageCode
                | WikiError::InvalidStartDate
                | WikiError::InvalidEndDate
                | WikiError::InvalidDateRange
        )
    }
}

pub type WikiResult<T> = Result<T, WikiError>;
