//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT / SIGTERM → graceful shutdown
//! - SIGHUP → re-render and apply the registry (`Generate`)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP never shuts down, even when the apply fails

use std::sync::Arc;

use crate::lifecycle::shutdown::Shutdown;
use crate::rpc::Dispatcher;

/// Wait for signals until a shutdown signal arrives, then trigger `shutdown`.
#[cfg(unix)]
pub async fn listen(dispatcher: Arc<Dispatcher>, shutdown: Shutdown) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!(signal = "SIGINT", "Signal received");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!(signal = "SIGTERM", "Signal received");
                break;
            }
            _ = hangup.recv() => {
                tracing::info!(signal = "SIGHUP", "Signal received; regenerating configuration");
                regenerate(&dispatcher).await;
            }
        }
    }

    shutdown.trigger();
    Ok(())
}

#[cfg(not(unix))]
pub async fn listen(_dispatcher: Arc<Dispatcher>, shutdown: Shutdown) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "Signal received");
    shutdown.trigger();
    Ok(())
}

/// Run a `Generate` outside of any RPC call.
pub async fn regenerate(dispatcher: &Dispatcher) {
    match dispatcher.generate().await {
        Ok(report) => tracing::info!(
            outcome = %report.outcome,
            version = report.version,
            services = report.services,
            "Regenerated configuration"
        ),
        Err(e) => tracing::error!(error = %e.to_wire(), "Regeneration failed"),
    }
}
