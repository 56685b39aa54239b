//! Interrupt handling
//!
//! The first SIGINT/SIGTERM cancels the batch: units that have not started are
//! reported as cancelled and in-flight units stop at their next chunk. A
//! second signal exits immediately with status 130.

use crate::types::EXIT_INTERRUPTED;
use tokio_util::sync::CancellationToken;

/// Cancel `cancel` on the first termination signal
///
/// Signals are watched from a dedicated background thread running its own
/// current-thread runtime, so this works from synchronous code and does not
/// interfere with the runtimes strategies create.
pub fn cancel_on_signal(cancel: CancellationToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("imgdl-signals".to_string())
        .spawn(move || {
            runtime.block_on(async {
                let first = wait_for_signal().await;
                tracing::warn!(signal = first, "Cancelling unfinished downloads; send it again to abort now");
                cancel.cancel();

                let second = wait_for_signal().await;
                tracing::warn!(signal = second, "Aborting without waiting for downloads");
                std::process::exit(i32::from(EXIT_INTERRUPTED));
            })
        })?;
    Ok(())
}

/// Resolve once the process is asked to stop; returns the signal's name
#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::SignalKind;

    let term = listen(SignalKind::terminate(), "SIGTERM");
    let int = listen(SignalKind::interrupt(), "SIGINT");

    let name = match (term, int) {
        (Some((mut term, term_name)), Some((mut int, int_name))) => {
            tokio::select! {
                _ = term.recv() => term_name,
                _ = int.recv() => int_name,
            }
        }
        (Some((mut only, name)), None) | (None, Some((mut only, name))) => {
            only.recv().await;
            name
        }
        (None, None) => {
            tracing::error!("No signal handler could be installed, falling back to ctrl_c");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "ctrl_c listener failed, interrupts are ignored");
                std::future::pending::<()>().await;
            }
            "ctrl-c"
        }
    };
    tracing::info!(signal = name, "Stop requested");
    name
}

#[cfg(unix)]
fn listen(
    kind: tokio::signal::unix::SignalKind,
    name: &'static str,
) -> Option<(tokio::signal::unix::Signal, &'static str)> {
    match tokio::signal::unix::signal(kind) {
        Ok(stream) => Some((stream, name)),
        Err(e) => {
            // Containers and sandboxes can refuse registration
            tracing::warn!(signal = name, error = %e, "Signal handler unavailable");
            None
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl_c listener failed, interrupts are ignored");
        std::future::pending::<()>().await;
    }
    tracing::info!(signal = "ctrl-c", "Stop requested");
    "ctrl-c"
}
