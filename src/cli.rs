//! Command-line interface definitions for wiki_most_read.
//!
//! Flags override values from the optional YAML config file. The access
//! token can also come from the environment.

use clap::Parser;

use crate::config::Config;

/// Rank the most-read Wikipedia articles over an inclusive date range.
///
/// # Examples
///
/// ```sh
/// # One day of Spanish Wikipedia
/// wiki_most_read --lang es --start 2024-02-19 --end 2024-02-19
///
/// # A week, cached on disk, written to a file
/// wiki_most_read -l en -s 2024-02-01 -e 2024-02-07 --cache-dir ./cache -o ./out/week.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Wikipedia language code (e.g. en, es, zh-min-nan)
    #[arg(short, long)]
    pub lang: String,

    /// First day, YYYY-MM-DD
    #[arg(short, long)]
    pub start: String,

    /// Last day (inclusive), YYYY-MM-DD
    #[arg(short, long)]
    pub end: String,

    /// Optional path to config.yaml file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Output file for the JSON response (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Directory for the persistent response cache
    #[arg(long, env = "WIKI_CACHE_DIR")]
    pub cache_dir: Option<String>,

    /// Disable response caching entirely; wins over --cache-dir and WIKI_CACHE_DIR
    #[arg(long)]
    pub no_cache: bool,

    /// Maximum number of ranked articles to return
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Requests admitted per one-window cycle
    #[arg(long)]
    pub max_requests_per_window: Option<usize>,

    /// Deadline for the whole request, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Wikimedia API access token
    #[arg(long, env = "WIKI_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(max_results) = self.max_results {
            config.max_results = max_results;
        }
        if let Some(max) = self.max_requests_per_window {
            config.max_requests_per_window = max;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            config.timeout_secs = timeout_secs;
        }
        if let Some(ref token) = self.access_token {
            config.access_token = Some(token.clone());
        }
        if self.no_cache {
            config.cache_dir = None;
        } else if let Some(ref dir) = self.cache_dir {
            config.cache_dir = Some(dir.clone());
        }
        config
    }
}
