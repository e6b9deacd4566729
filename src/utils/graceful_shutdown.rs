use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use eyre::{Result, WrapErr};
use tokio::{signal, sync::broadcast};

/// Represents different shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Graceful shutdown requested (SIGTERM, SIGINT)
    Graceful,
    /// The shutdown channel went away without a signal
    Force,
}

/// Broadcasts a single shutdown notification to every subscriber.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a receiver for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Relaxed)
    }

    /// Manually trigger shutdown. Only the first call broadcasts.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            tracing::info!("Shutdown triggered: {:?}", reason);
            // No receivers is fine: nobody is waiting yet.
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::warn!("Shutdown already initiated, ignoring {:?}", reason);
        }
    }

    /// Listen for SIGINT / SIGTERM and broadcast a graceful shutdown.
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::debug!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            res = signal::ctrl_c() => {
                res.wrap_err("Failed to listen for Ctrl+C")?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            res = wait_for_sigterm() => {
                res?;
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        self.trigger_shutdown(ShutdownReason::Graceful);
        Ok(())
    }

    /// Resolve once shutdown has been requested, even if that happened before the call.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        let mut receiver = self.subscribe();
        if self.is_shutdown_initiated() {
            return ShutdownReason::Graceful;
        }

        match receiver.recv().await {
            Ok(reason) => reason,
            Err(_) => {
                tracing::warn!("Shutdown channel closed unexpectedly");
                ShutdownReason::Force
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("Failed to register SIGTERM handler")?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    // On non-Unix systems, we only have Ctrl+C
    std::future::pending::<()>().await;
    Ok(())
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}
