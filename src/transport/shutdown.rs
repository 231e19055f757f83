//! Draining the session registry on process termination.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use super::registry::SessionRegistry;
use super::session::SessionTransport;
use super::ManagedTransport;

/// Outcome of a drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub closed: usize,
    pub failed: usize,
}

/// Closes every registered transport exactly once
pub struct ShutdownCoordinator<T: ManagedTransport + ?Sized = SessionTransport> {
    registry: Arc<SessionRegistry<T>>,
}

impl<T: ManagedTransport + ?Sized> ShutdownCoordinator<T> {
    pub fn new(registry: Arc<SessionRegistry<T>>) -> Self {
        Self { registry }
    }

    /// Close and remove every session in a single pass.
    ///
    /// A failing close is logged and counted; the entry is removed anyway.
    pub async fn drain(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();

        for (id, transport) in self.registry.snapshot() {
            info!("Closing transport for session {}", id);
            match transport.close().await {
                Ok(()) => report.closed += 1,
                Err(e) => {
                    error!("Error closing transport for session {}: {}", id, e);
                    report.failed += 1;
                }
            }
            self.registry.remove(&id);
        }

        info!(
            closed = report.closed,
            failed = report.failed,
            "Server shutdown complete"
        );
        report
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
