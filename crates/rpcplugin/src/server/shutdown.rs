//! Graceful shutdown plumbing for plugin servers.

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Clonable handle that stops the running server when fired.
///
/// Handed to the controller-service factory so the host's `Shutdown` RPC
/// can stop the serve loop; also fired on process signals.
#[derive(Clone, Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Idempotent; later calls are no-ops.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Create a trigger and the receiver the serve loop waits on.
pub(crate) fn shutdown_channel() -> (ShutdownTrigger, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, rx)
}

/// Resolves once the paired [`ShutdownTrigger`] fires.
pub(crate) async fn triggered(mut rx: watch::Receiver<bool>) {
    // Also stop if every trigger has been dropped
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// Handles both Ctrl+C and SIGTERM (on Unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        }
    }
}
