//! # Stop conditions of the supervisor loop.
//!
//! [`stop_requested`] resolves when either the caller's cancellation token
//! fires or the process receives a termination signal:
//! - **Unix:** `SIGINT`, `SIGTERM`, `SIGQUIT` (and Ctrl-C)
//! - **Other platforms:** Ctrl-C via [`tokio::signal::ctrl_c`]
//!
//! If signal handlers cannot be installed, only the token can stop the loop.

use std::fmt;

use tokio_util::sync::CancellationToken;

/// Why the supervisor loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// The cancellation token passed to `Supervisor::run` fired.
    Cancelled,
    /// An OS termination signal arrived.
    Signal,
}

impl StopCause {
    pub fn as_str(self) -> &'static str {
        match self {
            StopCause::Cancelled => "cancelled",
            StopCause::Signal => "signal",
        }
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Resolves once the loop should stop.
pub async fn stop_requested(token: &CancellationToken) -> StopCause {
    tokio::select! {
        biased;
        _ = token.cancelled() => StopCause::Cancelled,
        res = termination_signal() => match res {
            Ok(()) => StopCause::Signal,
            Err(error) => {
                tracing::warn!(%error, "signal handlers unavailable; waiting for cancellation only");
                token.cancelled().await;
                StopCause::Cancelled
            }
        },
    }
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
