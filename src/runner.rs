//! Batch orchestration
//!
//! [`BatchRunner`] checks the batch, hands every location to one
//! [`ExecutionStrategy`] and times the whole run.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::strategy::ExecutionStrategy;
use crate::types::{BatchReport, Strategy};
use std::path::Path;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runs batches of locations with a fixed configuration
///
/// ```no_run
/// use imgdl::{BatchRunner, Config, Strategy};
/// use tokio_util::sync::CancellationToken;
///
/// # fn main() -> imgdl::Result<()> {
/// let runner = BatchRunner::new(Config::default())?;
/// let locations = vec!["https://example.com/images/cat.jpg".to_string()];
/// let report = runner.run_batch(
///     &locations,
///     std::path::Path::new("."),
///     Strategy::Async,
///     &CancellationToken::new(),
/// )?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct BatchRunner {
    config: Config,
}

impl BatchRunner {
    /// Create a runner; fails if the configuration is invalid
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Configuration this runner was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a batch with the configured output directory and strategy
    pub fn run(&self, locations: &[String], cancel: &CancellationToken) -> Result<BatchReport> {
        self.run_batch(
            locations,
            &self.config.output_dir,
            self.config.strategy,
            cancel,
        )
    }

    /// Run every location with `kind` and collect the report
    ///
    /// Nothing is fetched or written when the batch is empty or `output_dir`
    /// is unusable. The total time covers the strategy call, including failed
    /// units and pool startup.
    ///
    /// Blocks the calling thread; do not call from inside an async runtime.
    pub fn run_batch(
        &self,
        locations: &[String],
        output_dir: &Path,
        kind: Strategy,
        cancel: &CancellationToken,
    ) -> Result<BatchReport> {
        if locations.is_empty() {
            return Err(Error::EmptyBatch);
        }
        check_output_dir(output_dir)?;

        tracing::info!(
            strategy = %kind,
            units = locations.len(),
            output_dir = %output_dir.display(),
            "Starting batch"
        );

        let strategy = ExecutionStrategy::new(kind, &self.config);
        let started = Instant::now();
        let outcomes = strategy.run(locations, output_dir, cancel)?;
        let total_elapsed = started.elapsed();

        let report = BatchReport {
            strategy: kind,
            outcomes,
            total_elapsed,
            cancelled: cancel.is_cancelled(),
        };

        tracing::info!(
            strategy = %kind,
            succeeded = report.succeeded(),
            failed = report.failed(),
            bytes = report.total_bytes(),
            elapsed_ms = total_elapsed.as_millis() as u64,
            cancelled = report.cancelled,
            "Batch finished"
        );
        Ok(report)
    }
}

fn check_output_dir(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::OutputDir {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        }),
        Err(e) => Err(Error::OutputDir {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EXIT_UNIT_FAILURE;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner() -> BatchRunner {
        BatchRunner::new(Config {
            workers: Some(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = Config {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            BatchRunner::new(config),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_empty_batch_is_rejected_before_any_work() {
        let dir = TempDir::new().unwrap();
        for kind in Strategy::ALL {
            let result = runner().run_batch(&[], dir.path(), kind, &CancellationToken::new());
            assert!(matches!(result, Err(Error::EmptyBatch)), "{kind}");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_output_dir_is_rejected() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let result = runner().run_batch(
            &["http://127.0.0.1:9/a.jpg".to_string()],
            &missing,
            Strategy::Threaded,
            &CancellationToken::new(),
        );
        match result {
            Err(Error::OutputDir { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected OutputDir error, got {other:?}"),
        }
    }

    #[test]
    fn test_output_dir_must_be_a_directory() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let result = runner().run_batch(
            &["http://127.0.0.1:9/a.jpg".to_string()],
            file.path(),
            Strategy::Async,
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(Error::OutputDir { .. })));
    }

    #[tokio::test]
    async fn test_report_covers_every_location() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"meow".to_vec())
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let ok = format!("{}/cat.jpg", server.uri());
        let missing = format!("{}/dog.jpg", server.uri());
        let locations = vec![ok.clone(), missing.clone()];
        let output_dir = dir.path().to_path_buf();

        let report = tokio::task::spawn_blocking(move || {
            runner().run_batch(
                &locations,
                &output_dir,
                Strategy::Threaded,
                &CancellationToken::new(),
            )
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(report.strategy, Strategy::Threaded);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcome_for(&ok).unwrap().is_success());
        assert!(!report.outcome_for(&missing).unwrap().is_success());
        assert!(report.total_elapsed >= report.max_unit_elapsed());
        assert!(!report.cancelled);
        assert_eq!(report.exit_code(), EXIT_UNIT_FAILURE);
        assert!(
            report
                .to_string()
                .lines()
                .last()
                .unwrap()
                .starts_with("Total execution time: ")
        );
    }

    #[test]
    fn test_cancelled_token_marks_report() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = runner()
            .run_batch(
                &["http://127.0.0.1:9/a.jpg".to_string()],
                dir.path(),
                Strategy::Threaded,
                &cancel,
            )
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_code(), crate::types::EXIT_INTERRUPTED);
    }
}
