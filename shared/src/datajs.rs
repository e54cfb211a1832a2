//! Codec for the dashboard's `data.js` file.
//!
//! The file is a single assignment of a JSON literal to a browser global:
//!
//! ```text
//! window.BENCHMARK_DATA = {
//!   "lastUpdate": 1650000000000,
//!   "repoUrl": "https://github.com/owner/repo",
//!   "entries": { "Benchmark": [ ... ] }
//! }
//! ```

use crate::error::{HistoryError, Result};
use crate::model::BenchmarkData;
use crate::storage::Location;
use tracing::{debug, info};

const GLOBAL: &str = "window.BENCHMARK_DATA";

pub fn parse(text: &str) -> Result<BenchmarkData> {
    let body = strip_assignment(text)?;
    let data = serde_json::from_str(body)
        .map_err(|e| HistoryError::MalformedDataFile(e.to_string()))?;

    Ok(data)
}

pub fn render(data: &BenchmarkData) -> Result<String> {
    let json = serde_json::to_string_pretty(data)?;

    Ok(format!("{GLOBAL} = {json}\n"))
}

/// Loads the data file at `location`.
pub async fn read(location: &Location) -> Result<BenchmarkData> {
    let text = location.read_string().await?;
    let data = parse(&text)?;
    debug!(
        "Loaded {} with {} suite(s)",
        location,
        data.entries.len()
    );

    Ok(data)
}

/// Loads the data file at `location`, or starts an empty history when nothing
/// is stored there yet.
pub async fn read_or_new(location: &Location, repo_url: &str) -> Result<BenchmarkData> {
    if location.exists().await? {
        return read(location).await;
    }

    info!("No data file at {}, starting a new history", location);
    Ok(BenchmarkData::new(repo_url))
}

pub async fn write(location: &Location, data: &BenchmarkData) -> Result<()> {
    let text = render(data)?;
    location
        .write_string(&text, "application/javascript")
        .await?;
    info!("Wrote {} ({} bytes)", location, text.len());

    Ok(())
}

fn strip_assignment(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix(GLOBAL) {
        Some(rest) => rest
            .trim_start()
            .strip_prefix('=')
            .ok_or_else(|| HistoryError::MalformedDataFile(format!("expected `=` after {GLOBAL}")))?,
        None if trimmed.starts_with('{') => trimmed,
        None => {
            return Err(HistoryError::MalformedDataFile(format!(
                "expected `{GLOBAL} = {{...}}`"
            )))
        }
    };

    Ok(body.trim().trim_end_matches(';').trim_end())
}
