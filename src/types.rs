//! Core types for imgdl

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::UnitSettings;
use crate::error::Error;

/// Exit status when every unit succeeded
pub const EXIT_SUCCESS: u8 = 0;
/// Exit status when at least one unit failed
pub const EXIT_UNIT_FAILURE: u8 = 1;
/// Exit status when the batch was interrupted by a signal
pub const EXIT_INTERRUPTED: u8 = 130;

/// Concurrency model used to run a batch
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Bounded pool of OS threads
    #[default]
    Threaded,
    /// Pool of worker processes talking JSON over stdio
    Multiprocess,
    /// Cooperative tasks multiplexed on a single thread
    Async,
}

impl Strategy {
    /// All strategies, in CLI order
    pub const ALL: [Strategy; 3] = [Strategy::Threaded, Strategy::Multiprocess, Strategy::Async];

    /// Name used on the command line and in config files
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Threaded => "threaded",
            Strategy::Multiprocess => "multiprocess",
            Strategy::Async => "async",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::config(
                    "strategy",
                    format!("unknown approach {s:?} (expected threaded, multiprocess or async)"),
                )
            })
    }
}

/// Result of one unit
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// File written
    Success {
        /// Bytes persisted to disk
        bytes: u64,
    },
    /// Nothing written under the final name
    Failure {
        /// Human-readable explanation
        reason: String,
    },
}

/// Recorded result of one fetch-and-write unit
///
/// Plain data with no handles, so it can be sent back from a worker process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOutcome {
    /// The location that was fetched
    pub location: String,
    /// Derived filename (`None` when derivation itself failed)
    pub filename: Option<String>,
    /// Success with byte count, or failure with reason
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// Time spent in the unit
    pub elapsed: Duration,
}

impl DownloadOutcome {
    /// Successful outcome
    pub fn success(
        location: impl Into<String>,
        filename: impl Into<String>,
        bytes: u64,
        elapsed: Duration,
    ) -> Self {
        Self {
            location: location.into(),
            filename: Some(filename.into()),
            status: OutcomeStatus::Success { bytes },
            elapsed,
        }
    }

    /// Failed outcome
    pub fn failure(
        location: impl Into<String>,
        filename: Option<String>,
        reason: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            location: location.into(),
            filename,
            status: OutcomeStatus::Failure {
                reason: reason.into(),
            },
            elapsed,
        }
    }

    /// Whether the file was written
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success { .. })
    }

    /// Bytes written, for successful outcomes
    pub fn bytes(&self) -> Option<u64> {
        match self.status {
            OutcomeStatus::Success { bytes } => Some(bytes),
            OutcomeStatus::Failure { .. } => None,
        }
    }

    /// Failure reason, for failed outcomes
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Success { .. } => None,
            OutcomeStatus::Failure { reason } => Some(reason),
        }
    }

    /// Name shown in the report: the filename, or the location when none was derived
    pub fn label(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.location)
    }
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            OutcomeStatus::Success { bytes } => write!(
                f,
                "{}: SUCCESS {} bytes in {}s",
                self.label(),
                bytes,
                format_secs(self.elapsed)
            ),
            OutcomeStatus::Failure { reason } => write!(
                f,
                "{}: FAILURE: {} (after {}s)",
                self.label(),
                reason,
                format_secs(self.elapsed)
            ),
        }
    }
}

/// Aggregated result of a batch
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Strategy that ran the batch
    pub strategy: Strategy,
    /// One outcome per input location, in completion order
    pub outcomes: Vec<DownloadOutcome>,
    /// Wall-clock time of the whole batch
    pub total_elapsed: Duration,
    /// Whether the batch was interrupted
    pub cancelled: bool,
}

impl BatchReport {
    /// True when every unit succeeded
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(DownloadOutcome::is_success)
    }

    /// Number of successful units
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Number of failed units
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Sum of bytes written
    pub fn total_bytes(&self) -> u64 {
        self.outcomes.iter().filter_map(DownloadOutcome::bytes).sum()
    }

    /// Longest single unit
    pub fn max_unit_elapsed(&self) -> Duration {
        self.outcomes
            .iter()
            .map(|o| o.elapsed)
            .max()
            .unwrap_or_default()
    }

    /// Outcome for `location`, if present
    pub fn outcome_for(&self, location: &str) -> Option<&DownloadOutcome> {
        self.outcomes.iter().find(|o| o.location == location)
    }

    /// Process exit status summarizing the batch
    pub fn exit_code(&self) -> u8 {
        if self.cancelled {
            EXIT_INTERRUPTED
        } else if self.all_succeeded() {
            EXIT_SUCCESS
        } else {
            EXIT_UNIT_FAILURE
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.outcomes {
            writeln!(f, "{outcome}")?;
        }
        write!(
            f,
            "Total execution time: {}s",
            format_secs(self.total_elapsed)
        )
    }
}

/// One unit of work as handed to a worker process
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchJob {
    /// Location to fetch
    pub location: String,
    /// Directory to write into
    pub output_dir: PathBuf,
    /// Timeouts and transfer settings
    pub settings: UnitSettings,
}

fn format_secs(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}
