use std::collections::HashMap;
use std::sync::Mutex;

use crate::cache::{CacheRecord, ResponseCache};
use crate::errors::{WikiError, WikiResult};

/// A process-local cache backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseCache for MemoryCache {
    fn get(&self, url: &str) -> WikiResult<Option<CacheRecord>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| WikiError::Cache("memory cache lock poisoned".to_string()))?;
        Ok(entries.get(url).cloned())
    }

    fn put(&self, record: &CacheRecord) -> WikiResult<()> {
        if !record.is_cacheable() {
            return Ok(());
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WikiError::Cache("memory cache lock poisoned".to_string()))?;
        entries.insert(record.url.clone(), record.clone());
        Ok(())
    }
}
