use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use eyre::{Result, WrapErr};
use tokio::{signal, sync::broadcast};

/// Represents different shutdown reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// OS signal (SIGTERM, SIGINT)
    Signal,
    /// Requested from inside the process
    Requested,
    /// Channel closed without a reason
    Force,
}

/// Broadcasts a single shutdown event to every interested task.
pub struct GracefulShutdown {
    shutdown_tx: broadcast::Sender<ShutdownReason>,
    shutdown_initiated: Arc<AtomicBool>,
    /// How long in-flight requests may take to drain once shutdown starts.
    drain_timeout: Duration,
}

impl GracefulShutdown {
    /// Create a new GracefulShutdown manager with default 30-second drain window
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(drain_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);
        Self {
            shutdown_tx,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            drain_timeout,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Get a receiver for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.shutdown_tx.subscribe()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    /// Start shutdown from code. Only the first call has any effect.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::info!("Shutdown triggered: {:?}", reason);
            // No receivers just means nobody is waiting yet.
            let _ = self.shutdown_tx.send(reason);
        } else {
            tracing::debug!("Shutdown already initiated, ignoring {:?}", reason);
        }
    }

    /// Wait for SIGINT or SIGTERM and broadcast the shutdown.
    pub async fn run_signal_handler(&self) -> Result<()> {
        tracing::info!("Signal handler started. Listening for SIGTERM and SIGINT");

        tokio::select! {
            result = signal::ctrl_c() => {
                result.wrap_err("Failed to listen for SIGINT")?;
                tracing::info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            result = Self::wait_for_sigterm() => {
                result?;
                tracing::info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }

        self.trigger_shutdown(ShutdownReason::Signal);
        Ok(())
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
        std::future::pending::<()>().await;
        Ok(())
    }

    /// Resolve once shutdown has been initiated, including when it happened
    /// before this call.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        let mut receiver = self.subscribe();
        if self.is_shutdown_initiated() {
            return ShutdownReason::Requested;
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

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}
