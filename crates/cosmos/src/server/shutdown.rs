//! Graceful shutdown utilities.

use tokio::signal;
use tracing::{error, info};

use crate::tracing::prefix::PULSE_CLOSE;

/// Returns a future that resolves when a shutdown signal is received.
///
/// Handles both Ctrl+C and SIGTERM (on Unix).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("{} Received Ctrl+C, shutting down", PULSE_CLOSE);
        }
        _ = terminate => {
            info!("{} Received terminate signal, shutting down", PULSE_CLOSE);
        }
    }
}
