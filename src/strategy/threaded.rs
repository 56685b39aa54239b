//! Thread pool strategy

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{self, BlockingUnit};
use crate::filename;
use crate::types::DownloadOutcome;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs units on a bounded set of scoped OS threads
///
/// Threads pull the next location from a shared atomic cursor and keep their
/// outcomes in a private buffer; buffers are merged after every thread has
/// been joined. All threads share one blocking HTTP client.
#[derive(Clone, Debug)]
pub struct ThreadPool {
    config: Config,
}

impl ThreadPool {
    /// Pool sized from `config.workers` (default: available parallelism)
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Run the batch; returns after every thread has exited
    pub fn run(
        &self,
        locations: &[String],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<DownloadOutcome>> {
        let unit = BlockingUnit::new(&self.config.unit)?;
        let size = self.config.worker_count(locations.len());
        let cursor = AtomicUsize::new(0);

        tracing::debug!(threads = size, units = locations.len(), "Starting thread pool");

        // The scope joins every spawned thread before returning, even on error
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(size);
            for worker in 0..size {
                let spawned = std::thread::Builder::new()
                    .name(format!("imgdl-worker-{}", worker))
                    .spawn_scoped(scope, {
                        let unit = &unit;
                        let cursor = &cursor;
                        move || {
                            drain(worker, cursor, locations, cancel, |location| {
                                unit.execute(location, output_dir, cancel)
                            })
                        }
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) if handles.is_empty() => {
                        return Err(Error::WorkerPool(format!(
                            "Failed to spawn worker thread: {}",
                            e
                        )));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, threads = handles.len(), "Continuing with a smaller thread pool");
                        break;
                    }
                }
            }

            let mut outcomes = Vec::with_capacity(locations.len());
            for handle in handles {
                match handle.join() {
                    Ok(buffer) => outcomes.extend(buffer),
                    Err(_) => tracing::error!("Worker thread panicked outside a unit; its unreported units are marked failed"),
                }
            }
            Ok(outcomes)
        })
    }
}

/// Claim and run locations until the cursor passes the end of the batch
///
/// A unit that panics is recorded as a failed outcome; the thread keeps
/// claiming work and its finished outcomes are preserved.
fn drain<F>(
    worker: usize,
    cursor: &AtomicUsize,
    locations: &[String],
    cancel: &CancellationToken,
    execute: F,
) -> Vec<DownloadOutcome>
where
    F: Fn(&str) -> DownloadOutcome,
{
    let mut outcomes = Vec::new();
    loop {
        let index = cursor.fetch_add(1, Ordering::Relaxed);
        let Some(location) = locations.get(index) else {
            break;
        };
        let outcome = if cancel.is_cancelled() {
            fetch::not_started(location)
        } else {
            let started = Instant::now();
            panic::catch_unwind(AssertUnwindSafe(|| execute(location))).unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                tracing::error!(worker, location = %location, panic = %message, "Download panicked");
                DownloadOutcome::failure(
                    location.as_str(),
                    filename::resolve(location).ok(),
                    format!("download panicked: {}", message),
                    started.elapsed(),
                )
            })
        };
        outcomes.push(outcome);
    }
    tracing::debug!(worker, completed = outcomes.len(), "Worker thread finished");
    outcomes
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn locations() -> Vec<String> {
        ["u/a.jpg", "u/boom.jpg", "u/c.jpg"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_panicking_unit_keeps_finished_outcomes() {
        let locations = locations();
        let cursor = AtomicUsize::new(0);

        let outcomes = drain(0, &cursor, &locations, &CancellationToken::new(), |location| {
            if location.contains("boom") {
                panic!("decoder exploded");
            }
            DownloadOutcome::success(location, "x", 1, Duration::ZERO)
        });

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(outcomes[2].is_success());
        assert_eq!(outcomes[1].location, "u/boom.jpg");
        assert_eq!(outcomes[1].filename.as_deref(), Some("boom.jpg"));
        assert_eq!(
            outcomes[1].failure_reason(),
            Some("download panicked: decoder exploded")
        );
    }

    #[test]
    fn test_drain_stops_running_after_cancel() {
        let locations = locations();
        let cursor = AtomicUsize::new(0);
        let cancel = CancellationToken::new();

        let outcomes = drain(0, &cursor, &locations, &cancel, |location| {
            cancel.cancel();
            DownloadOutcome::success(location, "x", 1, Duration::ZERO)
        });

        assert!(outcomes[0].is_success());
        assert!(
            outcomes[1..]
                .iter()
                .all(|o| o.failure_reason() == Some("cancelled before start"))
        );
    }
}
