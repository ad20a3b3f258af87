//! Interrupt handling: SIGINT / SIGTERM cancel the fleet's root token.

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Wait for Ctrl-C, or SIGTERM on unix.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub async fn interrupted() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("cannot install SIGINT handler")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("cannot install Ctrl-C handler")?;
    }
    Ok(())
}

/// Cancel `token` on the first interrupt.
///
/// Installed before any provisioning work starts so an interrupt during
/// fan-out still reaches every flow.
#[must_use]
pub fn install_interrupt_handler(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            res = interrupted() => {
                match res {
                    Ok(()) => tracing::info!("interrupt received"),
                    Err(e) => {
                        tracing::warn!(error = %format!("{e:#}"), "signal handler unavailable");
                        return;
                    }
                }
                token.cancel();
            }
            () = token.cancelled() => {}
        }
    })
}
