//! # Chat Bot Library
//!
//! This library implements a headless game client that logs into a server,
//! walks through the join handshake and then sits in the world recording
//! every chat message it observes to a local log file.
//!
//! ## Architecture Overview
//!
//! The bot never renders or simulates anything. Its whole job is to keep a
//! session alive and persist chat, so it is built from a few small pieces
//! that talk through narrow interfaces:
//!
//! ### Session State Machine
//! A `Session` consumes inbound commands one at a time and answers with a
//! list of actions (send a command, close the link, stop). It never touches
//! the network itself, which keeps every protocol rule testable without
//! sockets. Its state only moves forward:
//! `Created -> Initializing -> Active -> Steady`.
//!
//! ### Connection Establishment
//! Datagrams are unreliable, so the initial handshake is resent every
//! 500ms until the server answers. A watchdog closes the connection if the
//! server stays silent for 10 seconds.
//!
//! ### Dispatch
//! A single receive loop feeds the session, executes its actions and hands
//! chat messages to the sink.
//!
//! ## Module Organization
//!
//! ### Authentication (`auth`)
//! - Method negotiation from the server's advertised mask
//! - SRP ephemeral exchange and client proof
//! - First-time registration of a salted verifier
//!
//! ### Session (`session`)
//! - Handshake transitions and protocol violation checks
//! - Respawn on death, position tracking
//!
//! ### Establishment (`establish`)
//! - Handshake retransmission and the establishment watchdog
//!
//! ### Dispatch (`dispatch`)
//! - Receive loop and action execution
//! - Classification of how a session ended
//!
//! ### Chat (`chat`)
//! - Timestamped, append-only chat log
//!
//! ### Shutdown (`shutdown`)
//! - Signal handling and orderly connection close
//!
//! ### Transport (`transport`)
//! - `Peer` abstraction with a UDP implementation and an in-memory pair
//!   used by tests
//!
//! ## Usage Example
//!
//! ```no_run
//! use chatbot::chat::FileChatSink;
//! use chatbot::config::{BotConfig, Credentials};
//! use chatbot::dispatch::run_session;
//! use chatbot::transport::UdpPeer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BotConfig::from_env()?;
//! let credentials = Credentials::new("chatbot", "secret", "127.0.0.1:30000");
//!
//! let sink = FileChatSink::open(&config.chat_log)?;
//! let peer = UdpPeer::connect(&credentials.server, config.idle_timeout).await?;
//!
//! let end = run_session(peer, credentials, &config, sink).await?;
//! println!("session ended: {}", end);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod chat;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod establish;
pub mod session;
pub mod shutdown;
pub mod transport;
