//! OS signal handling.
//!
//! - SIGHUP → operator bootstrap (clears holds and FAILED domains)
//! - SIGTERM / SIGINT → graceful shutdown

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lifecycle::Shutdown;
use crate::orchestrator::Trigger;

/// Translate signals until shutdown. Returns once a terminating signal arrives.
#[cfg(unix)]
pub async fn listen(triggers: mpsc::UnboundedSender<Trigger>, shutdown: Arc<Shutdown>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, scheduling bootstrap");
                if triggers.send(Trigger::Operator).is_err() {
                    tracing::warn!("Scheduler is gone, ignoring SIGHUP");
                }
            }
            _ = terminate.recv() => {
                tracing::info!("SIGTERM received, shutting down");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("SIGINT received, shutting down");
                break;
            }
        }
    }

    shutdown.trigger();
    Ok(())
}

#[cfg(not(unix))]
pub async fn listen(_triggers: mpsc::UnboundedSender<Trigger>, shutdown: Arc<Shutdown>) -> io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl-C received, shutting down");
    shutdown.trigger();
    Ok(())
}
