//! Error types for imgdl
//!
//! Errors come in two layers:
//! - [`FetchError`] explains why a single unit failed. It never escapes a
//!   strategy; every instance is folded into a failed
//!   [`DownloadOutcome`](crate::types::DownloadOutcome).
//! - [`Error`] covers batch-level failures that stop a run before (or instead of)
//!   executing units: empty input, an unusable output directory, or worker
//!   resources that could not be acquired.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for imgdl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Exit status used for batch-level errors
pub const EXIT_BATCH_ERROR: u8 = 2;

/// Batch-level error
///
/// Any of these aborts the whole run. Per-unit problems are reported through
/// [`FetchError`] instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// No locations were supplied
    #[error("empty batch: at least one location is required")]
    EmptyBatch,

    /// The output directory is missing or not a directory
    #[error("output directory {path} is not usable: {reason}")]
    OutputDir {
        /// The offending directory
        path: PathBuf,
        /// Why it cannot be used
        reason: String,
    },

    /// Worker resources (thread pool, process pool, runtime, HTTP client) could not be acquired
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::Config`] tied to a configuration key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::EmptyBatch => "empty_batch",
            Error::OutputDir { .. } => "output_dir",
            Error::WorkerPool(_) => "worker_pool",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        EXIT_BATCH_ERROR
    }
}

/// Why a single fetch-and-write unit failed
#[derive(Debug, Error)]
pub enum FetchError {
    /// No usable filename could be derived from the location
    #[error("invalid location {location:?}: {reason}")]
    InvalidLocation {
        /// The location as supplied
        location: String,
        /// What is wrong with it
        reason: String,
    },

    /// Connection, DNS, timeout or body transfer failure
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx final status
    #[error("HTTP error: server responded with {0}")]
    HttpStatus(reqwest::StatusCode),

    /// Writing the file failed
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        /// The file being written
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The batch was cancelled before this unit finished
    #[error("cancelled")]
    Cancelled,
}

impl FetchError {
    /// Classify a reqwest error the way the console report should describe it
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::HttpStatus(status);
        }
        let message = if e.is_timeout() {
            format!("request timed out: {}", e)
        } else if e.is_connect() {
            format!("connection failed: {}", e)
        } else if e.is_redirect() {
            format!("too many redirects: {}", e)
        } else if e.is_builder() {
            format!("invalid request: {}", e)
        } else {
            e.to_string()
        };
        FetchError::Network(message)
    }

    /// Wrap an I/O error raised while writing `path`
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FetchError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &str {
        match self {
            FetchError::InvalidLocation { .. } => "invalid_location",
            FetchError::Network(_) => "network_error",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::Filesystem { .. } => "filesystem_error",
            FetchError::Cancelled => "cancelled",
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_error_codes() {
        let cases = vec![
            (Error::config("workers", "must be at least 1"), "config_error"),
            (Error::EmptyBatch, "empty_batch"),
            (
                Error::OutputDir {
                    path: PathBuf::from("/nope"),
                    reason: "does not exist".into(),
                },
                "output_dir",
            ),
            (Error::WorkerPool("spawn failed".into()), "worker_pool"),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
        ];

        for (error, code) in cases {
            assert_eq!(error.error_code(), code, "wrong code for {error}");
            assert_eq!(error.exit_code(), EXIT_BATCH_ERROR);
        }
    }

    #[test]
    fn test_config_error_keeps_key() {
        match Error::config("chunk_size", "must be positive") {
            Error::Config { message, key } => {
                assert_eq!(message, "must be positive");
                assert_eq!(key.as_deref(), Some("chunk_size"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_error_messages_are_human_readable() {
        let invalid = FetchError::InvalidLocation {
            location: "https://x.com/a/".into(),
            reason: "location ends with '/'".into(),
        };
        assert_eq!(
            invalid.to_string(),
            "invalid location \"https://x.com/a/\": location ends with '/'"
        );

        let status = FetchError::HttpStatus(reqwest::StatusCode::NOT_FOUND);
        assert_eq!(
            status.to_string(),
            "HTTP error: server responded with 404 Not Found"
        );

        let fs = FetchError::filesystem(
            "/out/img.jpg",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(fs.to_string().starts_with("filesystem error at /out/img.jpg"));
        assert_eq!(fs.error_code(), "filesystem_error");
    }

    #[test]
    fn test_batch_error_display() {
        assert_eq!(
            Error::EmptyBatch.to_string(),
            "empty batch: at least one location is required"
        );
        assert_eq!(
            Error::WorkerPool("no runtime".into()).to_string(),
            "failed to start worker pool: no runtime"
        );
    }
}
