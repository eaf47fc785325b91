//! Packet dispatcher: the receive loop that drives a session
//!
//! Every inbound command goes to the session state machine first; its
//! actions are executed in order. Chat messages are then written to the
//! sink whatever the session state. The loop ends when the transport
//! closes, when the server denies access, or when the sink fails.

use crate::chat::{ChatRecord, ChatSink};
use crate::config::{BotConfig, Credentials};
use crate::error::{BotError, TransportError};
use crate::establish::Establisher;
use crate::session::{Session, SessionAction};
use crate::transport::{CloseReason, Peer};
use log::{debug, info, warn};
use shared::ToClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The server refused us; nothing more may be sent
    Denied { reason: String },
    /// The transport's idle timeout fired
    TimedOut,
    /// The server never answered the initial handshake
    EstablishTimeout,
    /// A termination signal closed the connection
    Shutdown,
    /// The session closed the connection itself
    Aborted { reason: String },
    Disconnected,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denied { reason } => write!(f, "access denied: {}", reason),
            Self::TimedOut => write!(f, "timeout"),
            Self::EstablishTimeout => write!(f, "timeout while connecting"),
            Self::Shutdown => write!(f, "shutdown"),
            Self::Aborted { reason } => write!(f, "aborted: {}", reason),
            Self::Disconnected => write!(f, "disconnect"),
        }
    }
}

pub struct Dispatcher<P: Peer, S: ChatSink> {
    peer: Arc<P>,
    session: Session,
    sink: S,
}

impl<P: Peer, S: ChatSink> Dispatcher<P, S> {
    pub fn new(peer: Arc<P>, session: Session, sink: S) -> Self {
        Self {
            peer,
            session,
            sink,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Receives and handles commands until the session ends.
    ///
    /// # Errors
    ///
    /// Only a chat sink failure is an error; every other way the session can
    /// stop is reported as a `SessionEnd`.
    pub async fn run(&mut self) -> Result<SessionEnd, BotError> {
        loop {
            let cmd = match self.peer.recv().await {
                Ok(cmd) => cmd,
                Err(TransportError::Closed) => return Ok(self.closed()),
                Err(TransportError::Io(e)) => {
                    warn!("Error receiving packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
                Err(e) => {
                    warn!("Dropping packet: {}", e);
                    continue;
                }
            };

            debug!("Received {}", cmd.kind());
            if let Some(end) = self.apply(&cmd) {
                return Ok(end);
            }

            if let ToClient::ChatMsg { text, .. } = &cmd {
                self.sink.record(&ChatRecord::now(text.as_str()))?;
            }
        }
    }

    fn apply(&mut self, cmd: &ToClient) -> Option<SessionEnd> {
        for action in self.session.handle(cmd) {
            match action {
                SessionAction::Send(out) => {
                    let kind = out.kind();
                    if let Err(e) = self.peer.send(out) {
                        warn!("Failed to send {}: {}", kind, e);
                    }
                }
                SessionAction::Close { reason } => {
                    warn!("Closing connection: {}", reason);
                    self.peer.close(CloseReason::Aborted(reason));
                }
                SessionAction::Terminate { reason } => {
                    // Stops the handshake retries before anything else goes out
                    self.peer.close(CloseReason::Denied(reason.clone()));
                    return Some(SessionEnd::Denied { reason });
                }
            }
        }
        None
    }

    fn closed(&self) -> SessionEnd {
        let end = match self.peer.closed_reason() {
            Some(CloseReason::TimedOut) => SessionEnd::TimedOut,
            Some(CloseReason::EstablishTimeout) => SessionEnd::EstablishTimeout,
            Some(CloseReason::Shutdown) => SessionEnd::Shutdown,
            Some(CloseReason::Aborted(reason)) => SessionEnd::Aborted { reason },
            Some(CloseReason::Denied(reason)) => SessionEnd::Denied { reason },
            Some(CloseReason::RemoteClosed) | None => SessionEnd::Disconnected,
        };
        info!("{}", end);
        end
    }
}

/// Runs one connection: establisher in the background, dispatcher in the
/// foreground. The establisher is stopped when the dispatcher returns.
pub async fn run_session<P: Peer, S: ChatSink>(
    peer: Arc<P>,
    credentials: Credentials,
    config: &BotConfig,
    sink: S,
) -> Result<SessionEnd, BotError> {
    let session = Session::new(credentials.clone(), config);
    let establisher = Establisher::new(
        Arc::clone(&peer),
        session.subscribe(),
        &credentials.name,
        config,
    );
    let stop_establishing = establisher.cancel_token();
    let establishing = establisher.spawn();

    let mut dispatcher = Dispatcher::new(peer, session, sink);
    let result = dispatcher.run().await;

    stop_establishing.cancel();
    match establishing.await {
        Ok(outcome) => debug!("Connection establishment finished: {:?}", outcome),
        Err(e) => warn!("Connection establishment task failed: {}", e),
    }

    result
}
