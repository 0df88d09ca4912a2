//! Response caching for feed URLs.
//!
//! The pipeline consults a [`ResponseCache`] before scheduling any request and
//! writes validated responses back through it after a fetch. Any store that
//! can look up and upsert by URL can implement the trait.
//!
//! Trait methods are synchronous and may block. The pipeline calls them
//! through `tokio::task::spawn_blocking`.
//!
//! # Implementations
//!
//! | Store | Module | Lifetime |
//! |-------|--------|----------|
//! | In-memory map | [`memory`] | Process |
//! | JSON file per URL | [`file`] | Persistent directory |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::WikiResult;

pub mod file;
pub mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

/// A stored feed response and the time it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Create a record stamped with the current time.
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }

    /// Only successful, non-empty responses are worth storing.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && !self.url.is_empty() && !self.body.is_empty()
    }
}

/// Lookup and upsert of feed responses keyed by URL.
pub trait ResponseCache: Send + Sync {
    /// Return the stored record for `url`, or `None` on a miss.
    fn get(&self, url: &str) -> WikiResult<Option<CacheRecord>>;

    /// Insert or replace the record for `record.url`.
    ///
    /// Records that are not [`CacheRecord::is_cacheable`] are ignored.
    fn put(&self, record: &CacheRecord) -> WikiResult<()>;
}
