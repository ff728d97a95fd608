//! Graceful shutdown handling
//!
//! SIGINT or SIGTERM drains the server: in-flight turns and maintenance
//! get their abort signal, streams finalize with an error event, and the
//! HTTP listener stops accepting.

use willow_agent::AbortHandle;

/// Shutdown coordinator for graceful termination
#[derive(Clone, Debug, Default)]
pub struct ShutdownCoordinator {
    signal: AbortHandle,
}

impl ShutdownCoordinator {
    pub fn new() -> ShutdownCoordinator {
        ShutdownCoordinator::default()
    }

    pub fn request_shutdown(&self) {
        self.signal.abort();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.signal.is_aborted()
    }

    pub async fn wait_for_shutdown(&self) {
        self.signal.aborted().await;
    }

    /// Listen for SIGINT and SIGTERM on a background task.
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut sigterm = match tokio::signal::unix::signal(
                    tokio::signal::unix::SignalKind::terminate(),
                ) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to install SIGTERM handler");
                        return;
                    }
                };
                tokio::select! {
                    _ = ctrl_c => tracing::info!("SIGINT received"),
                    _ = sigterm.recv() => tracing::info!("SIGTERM received"),
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
                tracing::info!("Ctrl-C received");
            }
            coordinator.request_shutdown();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_unblocks_waiters() {
        let coordinator = ShutdownCoordinator::new();
        let waiter = coordinator.clone();
        let task = tokio::spawn(async move {
            waiter.wait_for_shutdown().await;
        });
        assert!(!coordinator.is_shutdown_requested());
        coordinator.request_shutdown();
        task.await.unwrap();
        assert!(coordinator.is_shutdown_requested());
    }
}
