//! Directory-backed response cache.
//!
//! Each URL is stored as one JSON document named after the percent-encoded
//! URL, so lookups are a single file read and upserts a single file write.
//! Entries that cannot be read back are logged and reported as misses.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cache::{CacheRecord, ResponseCache};
use crate::errors::{WikiError, WikiResult};

#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open a cache rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> WikiResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(url)))
    }
}

impl ResponseCache for FileCache {
    fn get(&self, url: &str) -> WikiResult<Option<CacheRecord>> {
        let path = self.entry_path(url);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<CacheRecord>(&raw) {
            Ok(record) if record.url == url => Ok(Some(record)),
            Ok(record) => {
                warn!(%url, stored = %record.url, "Cache entry belongs to another URL; ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt cache entry; ignoring");
                Ok(None)
            }
        }
    }

    fn put(&self, record: &CacheRecord) -> WikiResult<()> {
        if !record.is_cacheable() {
            return Ok(());
        }
        let json = serde_json::to_string(record)
            .map_err(|e| WikiError::Cache(format!("failed to encode cache entry: {e}")))?;

        // Write then rename so readers never see a half-written entry.
        let path = self.entry_path(&record.url);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        debug!(url = %record.url, path = %path.display(), "Stored cache entry");
        Ok(())
    }
}
