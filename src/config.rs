//! Configuration types for imgdl

use crate::error::{Error, Result};
use crate::types::Strategy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings every fetch-and-write unit in a batch shares
///
/// Travels with each job to worker processes, so it has to stay plain data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSettings {
    /// Whole-request timeout, connect through last body byte (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Connect timeout (default: 10 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Size of each body read and file write, in bytes (default: 64 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Redirects followed before giving up (default: 10)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UnitSettings {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            chunk_size: default_chunk_size(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration
///
/// Unit settings are flattened, so a JSON config file is a single flat object:
///
/// ```json
/// { "output_dir": "./images", "strategy": "async", "request_timeout": 15 }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Directory files are written into (default: current directory)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Concurrency model (default: threaded)
    #[serde(default)]
    pub strategy: Strategy,

    /// Threads or worker processes in the pool (None = available parallelism)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Maximum units in flight for the async strategy (default: 64)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Program spawned for multiprocess workers (None = the running executable)
    ///
    /// The program is started with `--worker` and must speak the worker protocol.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,

    /// How long cancelled worker processes may take to report before they are killed (default: 5 seconds)
    #[serde(default = "default_cancel_grace", with = "duration_serde")]
    pub cancel_grace: Duration,

    /// Per-unit network and transfer settings
    #[serde(flatten)]
    pub unit: UnitSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            strategy: Strategy::default(),
            workers: None,
            concurrency: default_concurrency(),
            worker_program: None,
            cancel_grace: default_cancel_grace(),
            unit: UnitSettings::default(),
        }
    }
}

impl Config {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no strategy can run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(Error::config("workers", "worker count must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(Error::config(
                "concurrency",
                "async concurrency must be at least 1",
            ));
        }
        if self.unit.chunk_size == 0 {
            return Err(Error::config("chunk_size", "chunk size must be at least 1 byte"));
        }
        if self.unit.request_timeout.is_zero() {
            return Err(Error::config(
                "request_timeout",
                "request timeout must be greater than zero",
            ));
        }
        if self.unit.connect_timeout.is_zero() {
            return Err(Error::config(
                "connect_timeout",
                "connect timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Pool size for a batch of `batch_len` units
    ///
    /// Never larger than the batch and never zero.
    pub fn worker_count(&self, batch_len: usize) -> usize {
        let wanted = self.workers.unwrap_or_else(available_parallelism);
        wanted.min(batch_len).max(1)
    }
}

/// Number of CPUs the process may use, falling back to 4
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(4)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_concurrency() -> usize {
    64
}

fn default_cancel_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    concat!("imgdl/", env!("CARGO_PKG_VERSION")).to_string()
}

// Duration serialization helper (fractional seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.strategy, Strategy::Threaded);
        assert_eq!(config.workers, None);
        assert_eq!(config.concurrency, 64);
        assert_eq!(config.cancel_grace, Duration::from_secs(5));
        assert_eq!(config.unit.request_timeout, Duration::from_secs(30));
        assert_eq!(config.unit.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.unit.chunk_size, 65536);
        assert_eq!(config.unit.max_redirects, 10);
        assert!(config.unit.user_agent.starts_with("imgdl/"));
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_json_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.unit, UnitSettings::default());
        assert_eq!(config.strategy, Strategy::Threaded);
    }

    #[test]
    fn test_flat_json_fields() {
        let json = r#"{
            "output_dir": "/tmp/images",
            "strategy": "async",
            "workers": 3,
            "request_timeout": 2.5,
            "chunk_size": 1024
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/images"));
        assert_eq!(config.strategy, Strategy::Async);
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.unit.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.unit.chunk_size, 1024);
        assert_eq!(config.unit.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"request_timeout": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unit_settings_roundtrip_keeps_subsecond_timeouts() {
        let settings = UnitSettings {
            request_timeout: Duration::from_millis(750),
            ..Default::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        let back: UnitSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let cases: Vec<(Config, &str)> = vec![
            (
                Config {
                    workers: Some(0),
                    ..Default::default()
                },
                "workers",
            ),
            (
                Config {
                    concurrency: 0,
                    ..Default::default()
                },
                "concurrency",
            ),
            (
                Config {
                    unit: UnitSettings {
                        chunk_size: 0,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                "chunk_size",
            ),
            (
                Config {
                    unit: UnitSettings {
                        request_timeout: Duration::ZERO,
                        ..Default::default()
                    },
                    ..Default::default()
                },
                "request_timeout",
            ),
        ];

        for (config, expected_key) in cases {
            match config.validate() {
                Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some(expected_key)),
                other => panic!("expected config error for {expected_key}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_worker_count_bounded_by_batch() {
        let config = Config {
            workers: Some(8),
            ..Default::default()
        };
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.worker_count(20), 8);
        assert_eq!(config.worker_count(0), 1);

        let auto = Config::default();
        assert!(auto.worker_count(1000) >= 1);
        assert!(auto.worker_count(1000) <= available_parallelism());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"strategy": "multiprocess", "workers": 2}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.strategy, Strategy::Multiprocess);
        assert_eq!(config.workers, Some(2));
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"workers": 0}}"#).unwrap();

        assert!(matches!(
            Config::from_file(file.path()),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_from_missing_file() {
        let result = Config::from_file(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
