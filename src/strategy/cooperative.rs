//! Cooperative single-thread strategy

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::{self, AsyncUnit};
use crate::types::DownloadOutcome;
use futures::stream::{self, StreamExt};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Runs every unit as a future on one current-thread tokio runtime
///
/// At most `config.concurrency` units are in flight; they interleave at body
/// reads and file writes and share one HTTP client (and its connection pool).
/// The runtime is created per batch and dropped before `run` returns.
#[derive(Clone, Debug)]
pub struct Cooperative {
    config: Config,
}

impl Cooperative {
    /// Strategy bounded by `config.concurrency`
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Run the batch on a fresh current-thread runtime
    pub fn run(
        &self,
        locations: &[String],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<DownloadOutcome>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::WorkerPool(format!("Failed to start async runtime: {}", e)))?;

        tracing::debug!(
            concurrency = self.config.concurrency,
            units = locations.len(),
            "Starting cooperative runtime"
        );

        runtime.block_on(async {
            let unit = AsyncUnit::new(&self.config.unit)?;
            let outcomes = stream::iter(locations)
                .map(|location| {
                    let unit = &unit;
                    async move {
                        if cancel.is_cancelled() {
                            return fetch::not_started(location);
                        }
                        unit.execute(location, output_dir, cancel).await
                    }
                })
                .buffer_unordered(self.config.concurrency)
                .collect::<Vec<_>>()
                .await;
            Ok::<_, Error>(outcomes)
        })
    }
}
