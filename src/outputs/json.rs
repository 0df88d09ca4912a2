//! JSON output of the response envelope.
//!
//! The envelope is the same document an HTTP caller would receive:
//!
//! ```text
//! {"data": [{"pageid", "page", "total_views", "view_history"}], "errors": [...]}
//! {"request_error": "..."}
//! ```

use std::error::Error;
use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncWriteExt, stdout};
use tracing::{error, info, instrument};

use crate::wiki::MostReadResponse;

/// Write `response` as pretty-printed JSON.
///
/// # Arguments
///
/// * `response` - The envelope to serialize
/// * `output` - Destination file; `None` writes to stdout
///
/// # Returns
///
/// `Ok(())` on success, or an error if directory creation or writing fails.
#[instrument(level = "info", skip(response))]
pub async fn write_response(
    response: &MostReadResponse,
    output: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(response)?;

    let Some(path) = output else {
        let mut out = stdout();
        out.write_all(json.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        return Ok(());
    };

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(parent = %parent.display(), error = %e, "Failed to create output dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!(path, status = response.status_code(), "Wrote JSON response");
    Ok(())
}
