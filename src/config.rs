//! Runtime configuration loaded from a YAML file.
//!
//! Every field has a default, so the file is optional and may set only the
//! values it cares about:
//!
//! ```yaml
//! max_requests_per_window: 100
//! window_ms: 1000
//! max_results: 5000
//! timeout_secs: 60
//! user_agent: "wiki_most_read/0.1 (ops@example.org)"
//! cache_dir: ./cache
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::aggregate::DEFAULT_MAX_RESULTS;
use crate::errors::{WikiError, WikiResult};
use crate::scheduler::{DEFAULT_MAX_TASKS_PER_WINDOW, DEFAULT_WINDOW};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Requests admitted per scheduling window.
    pub max_requests_per_window: usize,
    /// Scheduling window length in milliseconds.
    pub window_ms: u64,
    /// Maximum number of ranked articles returned.
    pub max_results: usize,
    /// Deadline for a whole request, in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
    pub access_token: Option<String>,
    /// Directory for the file cache; `None` keeps responses in memory only.
    pub cache_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_requests_per_window: DEFAULT_MAX_TASKS_PER_WINDOW,
            window_ms: DEFAULT_WINDOW.as_millis() as u64,
            max_results: DEFAULT_MAX_RESULTS,
            timeout_secs: 60,
            user_agent: concat!("wiki_most_read/", env!("CARGO_PKG_VERSION")).to_string(),
            access_token: None,
            cache_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or defaults when no path is given.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> WikiResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !Path::new(path).exists() {
            return Err(WikiError::Config(format!("config file not found: {path}")));
        }
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&raw)?;
        info!(path, "Loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> WikiResult<Self> {
        // An empty document deserializes as unit; treat it as "all defaults".
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw).map_err(|e| WikiError::Config(e.to_string()))
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_requests_per_window, 100);
        assert_eq!(config.window(), Duration::from_secs(1));
        assert_eq!(config.max_results, 5000);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(config.user_agent.starts_with("wiki_most_read/"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("max_results: 10\ncache_dir: /tmp/wiki\n").unwrap();
        assert_eq!(config.max_results, 10);
        assert_eq!(config.cache_dir.as_deref(), Some("/tmp/wiki"));
        assert_eq!(config.max_requests_per_window, 100);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(matches!(
            Config::from_yaml("max_requests: 3"),
            Err(WikiError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "timeout_secs: 5\nwindow_ms: 250\n").unwrap();

        let config = Config::load(path.to_str()).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.window(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load(Some("/nonexistent/config.yaml")),
            Err(WikiError::Config(_))
        ));
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }
}
