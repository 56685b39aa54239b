//! imgdl command line entry point

use clap::Parser;
use imgdl::cli::Cli;
use imgdl::strategy::multiprocess::worker;
use imgdl::{BatchRunner, Error};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive
const LOG_ENV: &str = "IMGDL_LOG";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level());

    let cancel = CancellationToken::new();
    if let Err(e) = imgdl::shutdown::cancel_on_signal(cancel.clone()) {
        tracing::warn!(error = %e, "Could not install signal handlers");
    }

    let result = if cli.worker {
        run_worker(&cancel)
    } else {
        run(&cli, &cancel)
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::debug!(code = e.error_code(), "Batch aborted");
            eprintln!("imgdl: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli, cancel: &CancellationToken) -> Result<u8, Error> {
    let config = cli.to_config()?;
    let runner = BatchRunner::new(config)?;
    let report = runner.run(&cli.urls, cancel)?;
    println!("{report}");
    Ok(report.exit_code())
}

fn run_worker(cancel: &CancellationToken) -> Result<u8, Error> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    worker::serve(stdin.lock(), stdout.lock(), cancel)?;
    Ok(imgdl::types::EXIT_SUCCESS)
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
