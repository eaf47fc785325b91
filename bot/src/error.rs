//! Error types for the bot
//!
//! Failures are split by layer so callers can decide what is absorbed
//! (a single undecodable packet) and what ends the session (closure,
//! protocol violation, chat persistence).

use crate::auth::AuthMethod;
use shared::srp::SrpError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the authentication engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// A method is already negotiated and the context has not been reset
    #[error("authentication already in progress using {0:?}")]
    AlreadyPending(AuthMethod),

    /// The server advertised no method this client implements
    #[error("server offered no supported authentication method (mask {0:#x})")]
    Unsupported(u32),

    /// Challenge received without a pending SRP exchange
    #[error("no SRP exchange is pending")]
    NotPending,

    /// Client proof came back empty
    #[error("SRP safety check failed")]
    SafetyCheck,

    #[error(transparent)]
    Srp(#[from] SrpError),
}

/// Errors surfaced by a transport peer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection is closed; see `Peer::closed_reason`
    #[error("connection closed")]
    Closed,

    /// A single datagram could not be decoded
    #[error("failed to decode packet: {0}")]
    Decode(#[from] bincode::Error),

    #[error("could not resolve server address {0}")]
    Resolve(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors that end the bot.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Writing to the chat log failed; records must not be dropped silently
    #[error("failed to persist chat record to {path}: {source}")]
    ChatSink {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
