//! Connection establishment
//!
//! Datagrams get lost, so the initial handshake is retransmitted on a fixed
//! interval until the session leaves `Created`. A watchdog running next to
//! the retry loop closes the transport if that never happens. Both tasks
//! share one `CancellationToken`: whichever finishes first cancels it, and
//! the other stops. Cancelling twice is harmless.

use crate::config::BotConfig;
use crate::session::SessionState;
use crate::transport::{CloseReason, Peer};
use log::{debug, warn};
use shared::ToServer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishOutcome {
    /// The server answered and the session moved past `Created`
    Progressed,
    /// The watchdog fired and closed the connection
    TimedOut,
    /// Stopped from outside, or the connection went away first
    Abandoned,
}

pub struct Establisher<P: Peer> {
    peer: Arc<P>,
    state: watch::Receiver<SessionState>,
    init: ToServer,
    retry_interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
}

impl<P: Peer> Establisher<P> {
    pub fn new(
        peer: Arc<P>,
        state: watch::Receiver<SessionState>,
        player_name: &str,
        config: &BotConfig,
    ) -> Self {
        Self {
            peer,
            state,
            init: ToServer::init(player_name),
            retry_interval: config.retry_interval,
            timeout: config.establish_timeout,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops both the retry loop and the watchdog.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(self) -> JoinHandle<EstablishOutcome> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> EstablishOutcome {
        let watchdog = tokio::spawn(watchdog(
            Arc::clone(&self.peer),
            self.cancel.clone(),
            self.timeout,
        ));

        let progressed = self.retry_until_progress().await;
        self.cancel.cancel();

        match watchdog.await {
            Ok(true) => EstablishOutcome::TimedOut,
            Ok(false) if progressed => EstablishOutcome::Progressed,
            Ok(false) => EstablishOutcome::Abandoned,
            Err(e) => {
                warn!("Establishment watchdog failed: {}", e);
                EstablishOutcome::Abandoned
            }
        }
    }

    /// Returns true once the session has left `Created`.
    async fn retry_until_progress(&mut self) -> bool {
        let mut ticker = interval(self.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.state.borrow_and_update() != SessionState::Created {
                debug!("Server answered, stopping handshake retries");
                return true;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                changed = self.state.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.peer.send(self.init.clone()) {
                        debug!("Stopping handshake retries: {}", e);
                        return false;
                    }
                }
            }
        }
    }
}

/// Returns true if it had to close the connection.
async fn watchdog<P: Peer>(peer: Arc<P>, done: CancellationToken, timeout: Duration) -> bool {
    tokio::select! {
        _ = done.cancelled() => false,
        _ = sleep(timeout) => {
            warn!("No answer from server after {:?}, giving up", timeout);
            peer.close(CloseReason::EstablishTimeout);
            done.cancel();
            true
        }
    }
}
