//! HTTP server builder.

use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use super::shutdown::shutdown_signal;
use crate::error::{Error, Result};
use crate::tracing::prefix;

/// Builder for running a cosmos HTTP service.
pub struct HttpServer {
    addr: SocketAddr,
    name: String,
    version: String,
}

impl HttpServer {
    /// Create a new server builder listening on `0.0.0.0:8000`.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Set the server address.
    pub fn address(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Run the server with the provided router.
    ///
    /// This method handles:
    /// - Logging startup/shutdown
    /// - Graceful shutdown on SIGTERM/Ctrl+C
    pub async fn serve(self, router: Router) -> Result<()> {
        info!(
            "{} Starting {} v{}",
            prefix::PULSE_OPEN,
            self.name,
            self.version
        );

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| Error::context(format!("failed to bind {}", self.addr), e))?;
        info!("  Address: http://{}", listener.local_addr()?);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("{} {} shutdown complete", prefix::PULSE_CLOSE, self.name);
        Ok(())
    }
}
