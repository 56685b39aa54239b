//! Blocking fetch-and-write unit

use super::{finish, rejected, stage};
use crate::config::UnitSettings;
use crate::error::{Error, FetchError};
use crate::filename;
use crate::types::DownloadOutcome;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Synchronous unit backed by `reqwest::blocking`
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct BlockingUnit {
    client: reqwest::blocking::Client,
    chunk_size: usize,
}

impl BlockingUnit {
    /// Build a unit (and its HTTP client) from `settings`
    ///
    /// Must not be called from inside an async runtime.
    pub fn new(settings: &UnitSettings) -> Result<Self, Error> {
        Ok(Self {
            client: super::blocking_client(settings)?,
            chunk_size: settings.chunk_size,
        })
    }

    /// Fetch `location` into `output_dir`
    ///
    /// Cancellation is observed between chunks.
    pub fn execute(
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
        let result = self.transfer(location, &output_dir.join(&filename), output_dir, cancel);
        finish(location, filename, result, started)
    }

    fn transfer(
        &self,
        location: &str,
        target: &Path,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let mut response = self
            .client
            .get(location)
            .send()
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status));
        }

        let mut staged = stage(output_dir)?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut written = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let n = match response.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(FetchError::Network(format!(
                        "failed to read response body: {}",
                        e
                    )));
                }
            };
            staged
                .write_all(&buf[..n])
                .map_err(|e| FetchError::filesystem(staged.path(), e))?;
            written += n as u64;
        }

        staged
            .flush()
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|e| FetchError::filesystem(staged.path(), e))?;
        staged
            .persist(target)
            .map_err(|e| FetchError::filesystem(target, e.error))?;

        Ok(written)
    }
}
