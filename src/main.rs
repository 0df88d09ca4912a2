//! # wiki_most_read
//!
//! Ranks the most-read Wikipedia articles for a language edition over an
//! inclusive date range, using the daily featured-content feed.
//!
//! ## Features
//!
//! - Fetches one featured-content feed per day, concurrently
//! - Bounds in-flight requests per one-second window (Wikipedia's API limit)
//! - Caches validated daily responses in memory or on disk
//! - Merges daily top lists into one ranking with per-day view history
//! - Reports per-URL failures alongside the results instead of failing
//!
//! ## Usage
//!
//! ```sh
//! wiki_most_read --lang es --start 2024-02-19 --end 2024-02-19
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Validation**: Parse language code and dates
//! 2. **URLs**: One feed URL per day, shifted one day ahead
//! 3. **Cache**: Serve previously validated days
//! 4. **Fetching**: Rate-limited concurrent requests for the rest
//! 5. **Aggregation**: Fold, rank and cap the articles
//! 6. **Output**: Write the JSON response envelope

use clap::Parser;
use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregate;
mod api;
mod cache;
mod cli;
mod config;
mod errors;
mod models;
mod outputs;
mod scheduler;
mod urls;
mod utils;
mod validation;
mod wiki;

use api::HttpFeedClient;
use cache::{FileCache, MemoryCache, ResponseCache};
use cli::Cli;
use config::Config;
use outputs::json;
use scheduler::RateLimitedScheduler;
use utils::ensure_writable_dir;
use wiki::{WikiApi, run_with_deadline};

#[tokio::main]
#[instrument]
async fn main() -> Result<ExitCode, Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("wiki_most_read starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(lang = %args.lang, start = %args.start, end = %args.end, "Parsed CLI arguments");

    // ---- Load config ----
    let config = args.apply(Config::load(args.config.as_deref())?);
    info!(
        max_requests_per_window = config.max_requests_per_window,
        window_ms = config.window_ms,
        max_results = config.max_results,
        timeout_secs = config.timeout_secs,
        "Configuration ready"
    );

    // ---- Cache ----
    let cache: Option<Arc<dyn ResponseCache>> = match (&config.cache_dir, args.no_cache) {
        (_, true) => None,
        (Some(dir), false) => {
            ensure_writable_dir(dir).await?;
            info!(%dir, "Using file cache");
            Some(Arc::new(FileCache::open(dir)?))
        }
        (None, false) => Some(Arc::new(MemoryCache::new())),
    };

    // ---- Pipeline ----
    let client = Arc::new(HttpFeedClient::new(
        &config.user_agent,
        config.access_token.as_deref(),
    )?);
    let scheduler = RateLimitedScheduler::new(config.max_requests_per_window, config.window())?;
    debug!(
        max_tasks_per_window = scheduler.max_tasks_per_window(),
        window = ?scheduler.window(),
        "Scheduler ready"
    );
    let mut api = WikiApi::new(client, scheduler, config.max_results);
    if let Some(cache) = cache {
        api = api.with_cache(cache);
    }

    let response = run_with_deadline(
        api.fetch_most_read_articles(&args.lang, &args.start, &args.end),
        config.timeout(),
    )
    .await;

    // ---- Output ----
    json::write_response(&response, args.output.as_deref()).await?;

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        status = response.status_code(),
        "Execution complete"
    );

    if response.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("Request failed; see request_error in output");
        Ok(ExitCode::FAILURE)
    }
}
