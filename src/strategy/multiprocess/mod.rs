//! Process pool strategy
//!
//! The parent starts `min(workers, batch)` long-lived worker processes (the
//! running executable with [`WORKER_FLAG`], unless `worker_program` overrides
//! it) and feeds them jobs over stdin using the [`protocol`]. Each worker
//! handles one job at a time; the parent hands out the next queued job as
//! soon as a worker answers.
//!
//! Children run with [`WORKER_ENV`] set. A program embedding the library must
//! hand control to [`worker::serve_if_worker`] at the top of `main`, or point
//! `worker_program` at a binary that does. A process that carries the marker
//! refuses to start a pool of its own.
//!
//! Orchestration runs on a current-thread tokio runtime. Children are spawned
//! with `kill_on_drop`, and every child is reaped before `run` returns.
//!
//! Fault handling:
//! - a worker that exits or garbles its reply fails the job it was holding and
//!   is replaced once; a second fault retires that slot
//! - jobs still queued when every slot has retired fail with
//!   "no worker process available"
//! - on cancellation, in-flight workers get `cancel_grace` to report (they
//!   receive the terminal's interrupt too) before they are killed

pub mod protocol;
pub mod worker;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch;
use crate::filename;
use crate::types::{DownloadOutcome, FetchJob};
use protocol::ProtocolError;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;

/// Command-line flag that switches the binary into worker mode
pub const WORKER_FLAG: &str = "--worker";

/// Environment variable set on every worker process
pub const WORKER_ENV: &str = "IMGDL_WORKER";

/// How long a worker may take to exit after its stdin is closed
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs units in a pool of worker processes
#[derive(Clone, Debug)]
pub struct ProcessPool {
    config: Config,
}

impl ProcessPool {
    /// Pool sized from `config.workers` (default: available parallelism)
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Program started for each worker
    pub fn worker_program(&self) -> Result<PathBuf> {
        match &self.config.worker_program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe().map_err(|e| {
                Error::WorkerPool(format!("Failed to locate worker executable: {}", e))
            }),
        }
    }

    /// Run the batch; returns after every worker process has exited
    pub fn run(
        &self,
        locations: &[String],
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<DownloadOutcome>> {
        refuse_nested(std::env::var_os(WORKER_ENV).as_deref())?;
        let program = self.worker_program()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::WorkerPool(format!("Failed to start async runtime: {}", e)))?;

        let queue: VecDeque<FetchJob> = locations
            .iter()
            .map(|location| FetchJob {
                location: location.clone(),
                output_dir: output_dir.to_path_buf(),
                settings: self.config.unit.clone(),
            })
            .collect();
        let size = self.config.worker_count(locations.len());

        runtime.block_on(async {
            let mut workers = Vec::with_capacity(size);
            for slot in 0..size {
                match WorkerProcess::spawn(&program, slot) {
                    Ok(worker) => workers.push(worker),
                    Err(e) if workers.is_empty() => return Err(e),
                    Err(e) => {
                        tracing::warn!(error = %e, processes = workers.len(), "Continuing with a smaller process pool");
                        break;
                    }
                }
            }
            tracing::debug!(processes = workers.len(), units = locations.len(), program = %program.display(), "Started process pool");

            let queue = RefCell::new(queue);
            let drained = futures::future::join_all(
                workers
                    .into_iter()
                    .map(|worker| drive(worker, &queue, &program, self.config.cancel_grace, cancel)),
            )
            .await;

            let mut outcomes: Vec<DownloadOutcome> = drained.into_iter().flatten().collect();
            for job in queue.into_inner() {
                outcomes.push(if cancel.is_cancelled() {
                    fetch::not_started(&job.location)
                } else {
                    job_failure(&job, "no worker process available", Duration::ZERO)
                });
            }
            Ok(outcomes)
        })
    }
}

/// Workers must never grow pools of their own
fn refuse_nested(marker: Option<&OsStr>) -> Result<()> {
    match marker {
        Some(_) => Err(Error::WorkerPool(format!(
            "refusing to start a process pool inside a worker process ({} is set)",
            WORKER_ENV
        ))),
        None => Ok(()),
    }
}

/// Feed queued jobs to one worker slot until the queue is empty
async fn drive(
    mut worker: WorkerProcess,
    queue: &RefCell<VecDeque<FetchJob>>,
    program: &Path,
    grace: Duration,
    cancel: &CancellationToken,
) -> Vec<DownloadOutcome> {
    let mut outcomes = Vec::new();
    let mut replaced = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Some(job) = queue.borrow_mut().pop_front() else {
            break;
        };
        let started = Instant::now();

        let reply = match worker.send(&job).await {
            Ok(()) => {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        // The worker saw the interrupt too; give it a chance to clean up and report
                        match tokio::time::timeout(grace, worker.recv()).await {
                            Ok(reply) => reply,
                            Err(_) => Err(WorkerFault::Unresponsive),
                        }
                    }
                    reply = worker.recv() => reply,
                }
            }
            Err(fault) => Err(fault),
        };

        match reply {
            Ok(outcome) if outcome.location == job.location => {
                worker.answered += 1;
                outcomes.push(outcome);
            }
            Ok(outcome) => {
                tracing::error!(worker = worker.slot, expected = %job.location, got = %outcome.location, "Worker answered for the wrong job");
                outcomes.push(job_failure(
                    &job,
                    format!(
                        "worker protocol error: {}",
                        outcome.failure_reason().unwrap_or("reply did not match job")
                    ),
                    started.elapsed(),
                ));
            }
            Err(fault) => {
                if worker.answered == 0 && matches!(fault, WorkerFault::Exited) {
                    tracing::error!(
                        worker = worker.slot,
                        program = %program.display(),
                        "Worker exited before its first reply; the program must call worker::serve_if_worker() or be set as worker_program"
                    );
                }
                tracing::warn!(worker = worker.slot, location = %job.location, error = %fault, "Worker process failed");
                outcomes.push(job_failure(&job, fault.to_string(), started.elapsed()));
                worker.kill().await;

                if replaced || cancel.is_cancelled() {
                    return outcomes;
                }
                replaced = true;
                match WorkerProcess::spawn(program, worker.slot) {
                    Ok(fresh) => worker = fresh,
                    Err(e) => {
                        tracing::warn!(worker = worker.slot, error = %e, "Could not replace worker process");
                        return outcomes;
                    }
                }
            }
        }
    }

    worker.shutdown().await;
    outcomes
}

fn job_failure(job: &FetchJob, reason: impl Into<String>, elapsed: Duration) -> DownloadOutcome {
    DownloadOutcome::failure(
        job.location.as_str(),
        filename::resolve(&job.location).ok(),
        reason,
        elapsed,
    )
}

/// Why a worker could not deliver an outcome
#[derive(Debug, Error)]
enum WorkerFault {
    #[error("worker process I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker process exited unexpectedly")]
    Exited,

    #[error("worker process did not respond after cancellation")]
    Unresponsive,

    #[error("worker protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// One child process and its stdio pipes
struct WorkerProcess {
    slot: usize,
    answered: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl WorkerProcess {
    fn spawn(program: &Path, slot: usize) -> Result<Self> {
        let mut child = Command::new(program)
            .arg(WORKER_FLAG)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::WorkerPool(format!(
                    "Failed to spawn worker process '{}': {}",
                    program.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::WorkerPool("Missing worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::WorkerPool("Missing worker stdout".to_string()))?;

        tracing::debug!(worker = slot, pid = ?child.id(), "Spawned worker process");
        Ok(Self {
            slot,
            answered: 0,
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn send(&mut self, job: &FetchJob) -> std::result::Result<(), WorkerFault> {
        let stdin = self.stdin.as_mut().ok_or(WorkerFault::Exited)?;
        let mut line = protocol::encode_job(job)?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Next reply; cancel-safe
    async fn recv(&mut self) -> std::result::Result<DownloadOutcome, WorkerFault> {
        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(WorkerFault::Exited);
            };
            if line.trim().is_empty() {
                continue;
            }
            return Ok(protocol::parse_outcome(&line)?);
        }
    }

    async fn kill(&mut self) {
        self.stdin.take();
        if let Err(e) = self.child.kill().await {
            tracing::debug!(worker = self.slot, error = %e, "Worker process already gone");
        }
    }

    /// Close stdin and wait for the worker to exit on its own
    async fn shutdown(mut self) {
        self.stdin.take();
        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                tracing::debug!(worker = self.slot, "Worker process exited");
            }
            Ok(Ok(status)) => {
                tracing::warn!(worker = self.slot, %status, "Worker process exited with failure");
            }
            Ok(Err(e)) => {
                tracing::warn!(worker = self.slot, error = %e, "Failed to wait for worker process");
            }
            Err(_) => {
                tracing::warn!(worker = self.slot, "Worker process did not exit, killing it");
                self.kill().await;
            }
        }
    }
}
