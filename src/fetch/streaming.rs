//! Async fetch-and-write unit

use super::{finish, rejected, stage};
use crate::config::UnitSettings;
use crate::error::{Error, FetchError};
use crate::filename;
use crate::types::DownloadOutcome;
use futures::StreamExt;
use std::path::Path;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Cooperative unit backed by the async `reqwest` client
///
/// Clones share one client, so every task in a batch reuses its connections.
#[derive(Clone, Debug)]
pub struct AsyncUnit {
    client: reqwest::Client,
    chunk_size: usize,
}

impl AsyncUnit {
    /// Build a unit (and its HTTP client) from `settings`
    pub fn new(settings: &UnitSettings) -> Result<Self, Error> {
        Ok(Self {
            client: super::async_client(settings)?,
            chunk_size: settings.chunk_size,
        })
    }

    /// Fetch `location` into `output_dir`
    ///
    /// Yields at every body read and file write. Cancellation drops the
    /// transfer at its current suspension point, which removes the temp file.
    pub async fn execute(
        &self,
        location: &str,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        let filename = match filename::resolve(location) {
            Ok(name) => name,
            Err(e) => return rejected(location, e),
        };

        let started = Instant::now();
        tracing::debug!(location, filename = %filename, "Starting download");
        let target = output_dir.join(&filename);
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.transfer(location, &target, output_dir) => result,
        };
        finish(location, filename, result, started)
    }

    async fn transfer(
        &self,
        location: &str,
        target: &Path,
        output_dir: &Path,
    ) -> Result<u64, FetchError> {
        let response = self
            .client
            .get(location)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status));
        }

        let (file, temp_path) = stage(output_dir)?.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut body = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(FetchError::from_reqwest)?;
            for piece in chunk.chunks(self.chunk_size) {
                file.write_all(piece)
                    .await
                    .map_err(|e| FetchError::filesystem(&*temp_path, e))?;
            }
            written += chunk.len() as u64;
        }

        // tokio::fs::File completes writes in the background; flush before rename
        file.flush()
            .await
            .map_err(|e| FetchError::filesystem(&*temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| FetchError::filesystem(&*temp_path, e))?;
        drop(file);

        temp_path
            .persist(target)
            .map_err(|e| FetchError::filesystem(target, e.error))?;

        Ok(written)
    }
}
