//! Graceful shutdown on termination signals
//!
//! The coordinator holds a handle to the peer and closes it when a signal
//! arrives. Closing wakes the dispatcher, which then returns normally.

use crate::transport::{CloseReason, Peer};
use log::{error, info};
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Resolves on SIGINT, SIGTERM or SIGHUP (Ctrl-C on other platforms).
pub async fn termination_signal() -> io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;

        tokio::select! {
            _ = interrupt.recv() => info!("Received SIGINT"),
            _ = terminate.recv() => info!("Received SIGTERM"),
            _ = hangup.recv() => info!("Received SIGHUP"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
        Ok(())
    }
}

pub struct ShutdownCoordinator<P: Peer> {
    peer: Arc<P>,
}

impl<P: Peer> ShutdownCoordinator<P> {
    pub fn new(peer: Arc<P>) -> Self {
        Self { peer }
    }

    pub fn spawn<F>(self, signal: F) -> JoinHandle<()>
    where
        F: Future<Output = io::Result<()>> + Send + 'static,
    {
        tokio::spawn(self.run(signal))
    }

    /// Waits for `signal`, then closes the connection.
    pub async fn run<F>(self, signal: F)
    where
        F: Future<Output = io::Result<()>>,
    {
        match signal.await {
            Ok(()) => {
                info!("Shutting down, closing connection");
                self.peer.close(CloseReason::Shutdown);
            }
            Err(e) => error!("Failed to listen for termination signals: {}", e),
        }
    }
}
