//! Wire protocol between the process pool and its workers.
//!
//! Newline-delimited JSON over the worker's stdio. The parent writes one
//! [`FetchJob`] per line to stdin; the worker answers each job with exactly one
//! [`DownloadOutcome`] line on stdout, in the order jobs were received.
//!
//! ```json
//! {"location": "https://x.com/a.jpg", "output_dir": "/tmp/out", "settings": {"request_timeout": 30.0, ...}}
//! {"location": "https://x.com/a.jpg", "filename": "a.jpg", "status": "success", "bytes": 1024, "elapsed": {"secs": 0, "nanos": 52000000}}
//! ```
//!
//! Workers log to stderr only; stdout carries nothing but protocol lines.

use crate::types::{DownloadOutcome, FetchJob};
use thiserror::Error;

/// Errors that can occur when encoding or parsing protocol lines.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Line is not valid JSON for the expected message
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Line was blank
    #[error("Empty protocol line")]
    Empty,
}

/// Encode a job as a single line (without the trailing newline).
pub fn encode_job(job: &FetchJob) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(job)?)
}

/// Parse a job line received by a worker.
pub fn parse_job(line: &str) -> Result<FetchJob, ProtocolError> {
    let line = non_empty(line)?;
    Ok(serde_json::from_str(line)?)
}

/// Encode an outcome as a single line (without the trailing newline).
pub fn encode_outcome(outcome: &DownloadOutcome) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(outcome)?)
}

/// Parse an outcome line received by the parent.
pub fn parse_outcome(line: &str) -> Result<DownloadOutcome, ProtocolError> {
    let line = non_empty(line)?;
    Ok(serde_json::from_str(line)?)
}

fn non_empty(line: &str) -> Result<&str, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        Err(ProtocolError::Empty)
    } else {
        Ok(line)
    }
}
