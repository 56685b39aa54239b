//! Fetch-and-write units
//!
//! A unit downloads one location and persists it under the filename derived by
//! [`crate::filename::resolve`]. Two flavors produce byte-identical files:
//!
//! - [`BlockingUnit`]: synchronous, used by the thread pool and by worker processes
//! - [`AsyncUnit`]: cooperative, used by the single-thread async strategy
//!
//! Both read the body in `chunk_size` pieces and stream them into a hidden temp
//! file inside the output directory. The temp file is renamed over the final
//! path only after the last byte is written; on any failure it is removed, so
//! a partial file never appears under the final name.
//!
//! Units never return errors. Every failure becomes a failed
//! [`DownloadOutcome`] carrying the location and a readable reason.

mod blocking;
mod streaming;

pub use blocking::BlockingUnit;
pub use streaming::AsyncUnit;

use crate::config::UnitSettings;
use crate::error::{Error, FetchError};
use crate::filename;
use crate::types::DownloadOutcome;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Prefix of in-progress files in the output directory
pub const STAGING_PREFIX: &str = ".imgdl-";
/// Suffix of in-progress files in the output directory
pub const STAGING_SUFFIX: &str = ".part";

/// Build the blocking HTTP client shared by all units of a thread or worker process
pub fn blocking_client(settings: &UnitSettings) -> Result<reqwest::blocking::Client, Error> {
    reqwest::blocking::Client::builder()
        .timeout(settings.request_timeout)
        .connect_timeout(settings.connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
        .user_agent(settings.user_agent.as_str())
        .build()
        .map_err(|e| Error::WorkerPool(format!("Failed to create HTTP client: {}", e)))
}

/// Build the async HTTP client shared by all cooperative units
pub fn async_client(settings: &UnitSettings) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(settings.request_timeout)
        .connect_timeout(settings.connect_timeout)
        .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
        .user_agent(settings.user_agent.as_str())
        .build()
        .map_err(|e| Error::WorkerPool(format!("Failed to create HTTP client: {}", e)))
}

/// Outcome for a location that was never started because the batch was cancelled
pub fn not_started(location: &str) -> DownloadOutcome {
    DownloadOutcome::failure(
        location,
        filename::resolve(location).ok(),
        format!("{} before start", FetchError::Cancelled),
        Duration::ZERO,
    )
}

/// Create the hidden temp file a unit streams into
fn stage(output_dir: &Path) -> Result<NamedTempFile, FetchError> {
    tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(output_dir)
        .map_err(|e| FetchError::filesystem(output_dir, e))
}

/// Turn a unit's transfer result into its outcome, logging either way
fn finish(
    location: &str,
    filename: String,
    result: Result<u64, FetchError>,
    started: Instant,
) -> DownloadOutcome {
    let elapsed = started.elapsed();
    match result {
        Ok(bytes) => {
            tracing::info!(
                location,
                filename = %filename,
                bytes,
                elapsed_ms = elapsed.as_millis() as u64,
                "Download complete"
            );
            DownloadOutcome::success(location, filename, bytes, elapsed)
        }
        Err(e) => {
            tracing::warn!(
                location,
                filename = %filename,
                error = %e,
                code = e.error_code(),
                "Download failed"
            );
            DownloadOutcome::failure(location, Some(filename), e.to_string(), elapsed)
        }
    }
}

/// Outcome for a location whose filename could not be derived
fn rejected(location: &str, error: FetchError) -> DownloadOutcome {
    tracing::warn!(location, error = %error, "Skipping location");
    DownloadOutcome::failure(location, None, error.to_string(), Duration::ZERO)
}
