//! Worker side of the process pool
//!
//! Runs inside a child process started with `--worker`. Reads jobs from the
//! input until EOF, runs each with a [`BlockingUnit`] and writes one outcome
//! line per job.

use super::{WORKER_ENV, protocol};
use crate::config::UnitSettings;
use crate::error::{Error, Result};
use crate::fetch::BlockingUnit;
use crate::types::DownloadOutcome;
use std::ffi::OsStr;
use std::io::{BufRead, Write};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Serve jobs on stdin/stdout when this process was started as a pool worker
///
/// Returns `None` in an ordinary process. Programs that use the library's
/// process pool without pinning `worker_program` call this first thing in
/// `main` and exit when it returns `Some`:
///
/// ```no_run
/// use imgdl::strategy::multiprocess::worker;
///
/// fn main() {
///     if let Some(result) = worker::serve_if_worker() {
///         std::process::exit(if result.is_ok() { 0 } else { 1 });
///     }
///     // ... build a BatchRunner as usual
/// }
/// ```
pub fn serve_if_worker() -> Option<Result<()>> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_when(
        std::env::var_os(WORKER_ENV).as_deref(),
        stdin.lock(),
        stdout.lock(),
        &CancellationToken::new(),
    )
}

fn serve_when<R: BufRead, W: Write>(
    marker: Option<&OsStr>,
    input: R,
    output: W,
    cancel: &CancellationToken,
) -> Option<Result<()>> {
    if marker.is_none() {
        return None;
    }
    tracing::debug!("Running as process pool worker");
    Some(serve(input, output, cancel))
}

/// Serve jobs until `input` is closed
///
/// A malformed job line is answered with a failed outcome (empty location) so
/// the parent never waits on a reply that will not come. Failing to build the
/// HTTP client or to write to `output` ends the worker with an error.
pub fn serve<R: BufRead, W: Write>(
    input: R,
    mut output: W,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut units = UnitCache::default();
    let mut served = 0usize;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match protocol::parse_job(&line) {
            Ok(job) => {
                let unit = units.unit_for(&job.settings)?;
                unit.execute(&job.location, &job.output_dir, cancel)
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejecting malformed job");
                DownloadOutcome::failure(
                    "",
                    None,
                    format!("worker protocol error: {}", e),
                    Duration::ZERO,
                )
            }
        };

        let reply = protocol::encode_outcome(&outcome)
            .map_err(|e| Error::WorkerPool(format!("Failed to encode outcome: {}", e)))?;
        writeln!(output, "{}", reply)?;
        output.flush()?;
        served += 1;
    }

    tracing::debug!(served, "Worker input closed, exiting");
    Ok(())
}

/// Keeps one unit alive for as long as jobs arrive with the same settings
#[derive(Default)]
struct UnitCache {
    current: Option<(UnitSettings, BlockingUnit)>,
}

impl UnitCache {
    fn unit_for(&mut self, settings: &UnitSettings) -> Result<&BlockingUnit> {
        if self.current.as_ref().is_none_or(|(cached, _)| cached != settings) {
            self.current = Some((settings.clone(), BlockingUnit::new(settings)?));
        }
        self.current
            .as_ref()
            .map(|(_, unit)| unit)
            .ok_or_else(|| Error::WorkerPool("no HTTP client available".to_string()))
    }
}
