//! # imgdl
//!
//! Concurrent image downloader with interchangeable execution strategies.
//!
//! ## Design Philosophy
//!
//! imgdl is designed to be:
//! - **Strategy-agnostic** - One fetch-and-write unit, run by threads, processes or async tasks
//! - **Failure-isolated** - A failed download never stops its siblings
//! - **All-or-nothing on disk** - Files appear under their final name only when complete
//! - **Library-first** - The `imgdl` binary is a thin layer over [`BatchRunner`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use imgdl::strategy::multiprocess::worker;
//! use imgdl::{BatchRunner, Config, Strategy};
//! use tokio_util::sync::CancellationToken;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The multiprocess strategy re-runs this executable as its workers
//!     if let Some(served) = worker::serve_if_worker() {
//!         served?;
//!         return Ok(());
//!     }
//!
//!     let config = Config {
//!         strategy: Strategy::Multiprocess,
//!         workers: Some(4),
//!         ..Default::default()
//!     };
//!
//!     let runner = BatchRunner::new(config)?;
//!     let report = runner.run(
//!         &[
//!             "https://example.com/images/img1.jpg".to_string(),
//!             "https://example.com/images/img2.png".to_string(),
//!         ],
//!         &CancellationToken::new(),
//!     )?;
//!
//!     // One line per file, then the total time
//!     println!("{report}");
//!     std::process::exit(i32::from(report.exit_code()));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Command line interface
pub mod cli;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Fetch-and-write units
pub mod fetch;
/// Filename derivation from locations
pub mod filename;
/// Batch orchestration
pub mod runner;
/// Signal-driven cancellation
pub mod shutdown;
/// Execution strategies
pub mod strategy;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{Config, UnitSettings};
pub use error::{Error, FetchError, Result};
pub use runner::BatchRunner;
pub use strategy::ExecutionStrategy;
pub use types::{BatchReport, DownloadOutcome, OutcomeStatus, Strategy};
