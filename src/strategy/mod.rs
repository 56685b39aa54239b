//! Execution strategies
//!
//! Three interchangeable schedulers run a batch of fetch-and-write units:
//!
//! | Variant | Scheduler | Unit flavor |
//! |---|---|---|
//! | [`ThreadPool`] | scoped OS threads, atomic work cursor | [`BlockingUnit`](crate::fetch::BlockingUnit) |
//! | [`ProcessPool`] | persistent worker processes, JSON over stdio | [`BlockingUnit`](crate::fetch::BlockingUnit) in the child |
//! | [`Cooperative`] | one current-thread tokio runtime, `buffer_unordered` | [`AsyncUnit`](crate::fetch::AsyncUnit) |
//!
//! Every variant attempts each location exactly once, returns one outcome per
//! location (in completion order), keeps going when units fail, and releases
//! its threads, processes or runtime before `run` returns.

mod cooperative;
pub mod multiprocess;
mod threaded;

pub use cooperative::Cooperative;
pub use multiprocess::ProcessPool;
pub use threaded::ThreadPool;

use crate::config::Config;
use crate::error::Result;
use crate::filename;
use crate::types::{DownloadOutcome, Strategy};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A concurrency strategy, selected once per batch
#[derive(Clone, Debug)]
pub enum ExecutionStrategy {
    /// Bounded pool of OS threads
    Threaded(ThreadPool),
    /// Pool of worker processes
    Multiprocess(ProcessPool),
    /// Cooperative tasks on one thread
    Async(Cooperative),
}

impl ExecutionStrategy {
    /// Build the variant for `kind`
    pub fn new(kind: Strategy, config: &Config) -> Self {
        match kind {
            Strategy::Threaded => ExecutionStrategy::Threaded(ThreadPool::new(config)),
            Strategy::Multiprocess => ExecutionStrategy::Multiprocess(ProcessPool::new(config)),
            Strategy::Async => ExecutionStrategy::Async(Cooperative::new(config)),
        }
    }

    /// Which variant this is
    pub fn kind(&self) -> Strategy {
        match self {
            ExecutionStrategy::Threaded(_) => Strategy::Threaded,
            ExecutionStrategy::Multiprocess(_) => Strategy::Multiprocess,
            ExecutionStrategy::Async(_) => Strategy::Async,
        }
    }

    /// Run every location and return exactly one outcome per location
    ///
    /// Blocks the calling thread. Must not be called from inside an async
    /// runtime: the strategies own their own runtimes and blocking clients.
    pub fn run(
        &self,
        locations: &[String],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<DownloadOutcome>> {
        let outcomes = match self {
            ExecutionStrategy::Threaded(pool) => pool.run(locations, output_dir, cancel)?,
            ExecutionStrategy::Multiprocess(pool) => pool.run(locations, output_dir, cancel)?,
            ExecutionStrategy::Async(coop) => coop.run(locations, output_dir, cancel)?,
        };
        Ok(reconcile(locations, outcomes))
    }
}

/// Make the outcome list match the input one-for-one
///
/// A location without an outcome (a worker thread panicked, a worker process
/// answered for the wrong job) gets a failed outcome. Outcomes for locations
/// that were never submitted are dropped. Duplicated locations are counted.
pub(crate) fn reconcile(
    locations: &[String],
    outcomes: Vec<DownloadOutcome>,
) -> Vec<DownloadOutcome> {
    let mut expected: HashMap<&str, usize> = HashMap::new();
    for location in locations {
        *expected.entry(location.as_str()).or_default() += 1;
    }

    let mut kept = Vec::with_capacity(locations.len());
    for outcome in outcomes {
        match expected.get_mut(outcome.location.as_str()) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                kept.push(outcome);
            }
            _ => {
                tracing::error!(location = %outcome.location, "Dropping outcome for a location that was not submitted");
            }
        }
    }

    for location in locations {
        if let Some(remaining) = expected.get_mut(location.as_str())
            && *remaining > 0
        {
            *remaining -= 1;
            tracing::error!(location = %location, "No outcome reported for location");
            kept.push(DownloadOutcome::failure(
                location.as_str(),
                filename::resolve(location).ok(),
                "no outcome reported for this location",
                Duration::ZERO,
            ));
        }
    }

    kept
}
