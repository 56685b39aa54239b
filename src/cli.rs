//! Command line interface definition

use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::Strategy;
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

/// imgdl - download images concurrently and report per-file timings
#[derive(Debug, Parser)]
#[command(name = "imgdl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Download images concurrently and report per-file timings")]
#[command(long_about = None)]
pub struct Cli {
    /// Image URLs; each file is saved under the last path segment of its URL
    #[arg(value_name = "URL", required_unless_present = "worker")]
    pub urls: Vec<String>,

    /// Concurrency model used for the batch
    #[arg(short, long, value_enum)]
    pub approach: Option<Strategy>,

    /// Directory files are written into
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Threads or worker processes in the pool (default: available parallelism)
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Maximum downloads in flight for the async approach
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Per-request timeout, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Connect timeout, in seconds
    #[arg(long, value_name = "SECS")]
    pub connect_timeout: Option<f64>,

    /// Bytes read and written per chunk
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// User-Agent header sent with every request
    #[arg(long)]
    pub user_agent: Option<String>,

    /// JSON config file; flags given here override it
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Serve jobs from stdin as a process pool worker
    #[arg(long, hide = true, conflicts_with = "urls")]
    pub worker: bool,
}

impl Cli {
    /// Build the effective configuration: config file (or defaults), then flags
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(approach) = self.approach {
            config.strategy = approach;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(secs) = self.timeout {
            config.unit.request_timeout = seconds("timeout", secs)?;
        }
        if let Some(secs) = self.connect_timeout {
            config.unit.connect_timeout = seconds("connect_timeout", secs)?;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.unit.chunk_size = chunk_size;
        }
        if let Some(user_agent) = &self.user_agent {
            config.unit.user_agent = user_agent.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Default log filter for the requested verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::config(key, format!("invalid number of seconds {secs}: {e}")))
}
