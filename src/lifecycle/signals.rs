//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT forces an immediate exit
//! - SIGHUP triggers config reload, not shutdown

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;
use crate::reload::ReloadTrigger;

/// Exit code used when a second interrupt arrives during draining.
const FORCED_EXIT_CODE: i32 = 130;

/// Spawn the task that turns OS signals into shutdown and reload events.
pub fn spawn_signal_handlers(
    shutdown: Shutdown,
    triggers: mpsc::UnboundedSender<ReloadTrigger>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let (mut terminate, mut hangup) =
                match (signal(SignalKind::terminate()), signal(SignalKind::hangup())) {
                    (Ok(terminate), Ok(hangup)) => (terminate, hangup),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::error!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => on_interrupt(&shutdown, "SIGINT"),
                    _ = terminate.recv() => on_interrupt(&shutdown, "SIGTERM"),
                    _ = hangup.recv() => {
                        tracing::info!("SIGHUP received, reloading configuration");
                        if triggers.send(ReloadTrigger::Signal).is_err() {
                            tracing::warn!("Reload controller is not running");
                        }
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = triggers;
            loop {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                on_interrupt(&shutdown, "Ctrl-C");
            }
        }
    })
}

fn on_interrupt(shutdown: &Shutdown, signal: &str) {
    if shutdown.is_triggered() {
        tracing::warn!(signal, "Second interrupt, forcing exit");
        std::process::exit(FORCED_EXIT_CODE);
    }
    tracing::info!(signal, "Starting graceful shutdown");
    shutdown.trigger();
}
