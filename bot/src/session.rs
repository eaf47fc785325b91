//! Session state machine for one server connection
//!
//! The machine owns everything that changes while a connection is alive:
//! the `SessionState`, the authentication context and the last known player
//! position. It performs no I/O. Each inbound command yields a list of
//! `SessionAction`s that the dispatcher executes in order.
//!
//! ```text
//! ┌─────────┐  Hello   ┌──────────────┐  AcceptAuth + TimeOfDay  ┌────────┐  Breath  ┌────────┐
//! │ Created │─────────>│ Initializing │─────────────────────────>│ Active │─────────>│ Steady │
//! └─────────┘          └──────────────┘                          └────────┘          └────────┘
//! ```
//!
//! State only moves forward. Observers subscribe to it through a watch
//! channel, which is how the establisher learns that the server answered.

use crate::auth::{AuthEngine, AuthMethod};
use crate::config::{BotConfig, Credentials, VersionMismatchPolicy};
use log::{debug, error, info, warn};
use shared::{PlayerPos, ToClient, ToServer, SERIALIZE_VER};
use tokio::sync::watch;

const CLIENT_MAJOR: u8 = 5;
const CLIENT_MINOR: u8 = 5;
const CLIENT_PATCH: u8 = 0;
const FORMSPEC_VERSION: u16 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Connection opened, waiting for the server greeting
    Created,
    /// Greeting received, authentication in progress
    Initializing,
    /// Authenticated and announced ready
    Active,
    /// Fully joined; chat is being logged
    Steady,
}

/// Side effects requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    Send(ToServer),
    /// Close the connection; the session cannot continue
    Close { reason: String },
    /// Authoritative rejection by the server; stop the process
    Terminate { reason: String },
}

fn close(reason: impl Into<String>) -> SessionAction {
    SessionAction::Close {
        reason: reason.into(),
    }
}

/// Last position the server put us at
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerPosition {
    pub pos: PlayerPos,
    pub pitch: f32,
    pub yaw: f32,
}

pub struct Session {
    state: watch::Sender<SessionState>,
    auth: AuthEngine,
    position: PlayerPosition,
    accepted: bool,
    lang: String,
    version_policy: VersionMismatchPolicy,
    version_mismatches: u32,
}

impl Session {
    pub fn new(credentials: Credentials, config: &BotConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Created);

        Self {
            state,
            auth: AuthEngine::new(credentials),
            position: PlayerPosition::default(),
            accepted: false,
            lang: config.lang.clone(),
            version_policy: config.version_policy,
            version_mismatches: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn auth(&self) -> &AuthEngine {
        &self.auth
    }

    pub fn position(&self) -> PlayerPosition {
        self.position
    }

    fn advance(&mut self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if next > *current {
                debug!("Session state {:?} -> {:?}", *current, next);
                *current = next;
                true
            } else {
                false
            }
        });
    }

    /// Processes one inbound command and returns the actions to execute.
    pub fn handle(&mut self, cmd: &ToClient) -> Vec<SessionAction> {
        match cmd {
            ToClient::Hello {
                serialize_ver,
                proto_ver,
                auth_methods,
                username,
            } => self.on_hello(*serialize_ver, *proto_ver, *auth_methods, username),

            ToClient::SrpBytesSaltB { salt, b } => self.on_salt_b(salt, b),

            ToClient::Denied { reason, reconnect } => {
                warn!("Access denied: {} (reconnect allowed: {})", reason, reconnect);
                vec![SessionAction::Terminate {
                    reason: reason.clone(),
                }]
            }

            ToClient::AcceptAuth { player_pos, .. } => self.on_accept(*player_pos),

            ToClient::TimeOfDay { .. } => self.on_time_of_day(),

            ToClient::DeathScreen { .. } => {
                info!("Player died, requesting respawn");
                vec![SessionAction::Send(ToServer::Respawn)]
            }

            ToClient::MovePlayer { pos, pitch, yaw } => {
                self.position = PlayerPosition {
                    pos: *pos,
                    pitch: *pitch,
                    yaw: *yaw,
                };
                Vec::new()
            }

            ToClient::Breath { .. } => self.on_breath(),

            // Chat is routed to the sink by the dispatcher
            ToClient::ChatMsg { .. } => Vec::new(),
        }
    }

    fn on_hello(
        &mut self,
        serialize_ver: u8,
        proto_ver: u16,
        advertised: u32,
        username: &str,
    ) -> Vec<SessionAction> {
        if let Some(method) = self.auth.method() {
            warn!("Unexpected authentication: {:?} already in progress", method);
            return vec![close("unexpected authentication")];
        }
        if self.state() != SessionState::Created {
            warn!("Unexpected authentication in state {:?}", self.state());
            return vec![close("unexpected authentication")];
        }

        if serialize_ver != SERIALIZE_VER {
            self.version_mismatches += 1;
            warn!(
                "Ignoring greeting with serialization version {} (expected {})",
                serialize_ver, SERIALIZE_VER
            );

            if let VersionMismatchPolicy::GiveUpAfter(limit) = self.version_policy {
                if self.version_mismatches >= limit {
                    return vec![close(format!(
                        "no compatible greeting after {} attempts",
                        self.version_mismatches
                    ))];
                }
            }
            return Vec::new();
        }

        self.advance(SessionState::Initializing);
        info!(
            "Server greeted {} (protocol {}), auth methods {:#x}",
            username, proto_ver, advertised
        );

        match self.auth.begin(advertised) {
            Ok(cmd) => {
                debug!("Authenticating with {:?}", self.auth.method());
                vec![SessionAction::Send(cmd)]
            }
            Err(e) => {
                error!("Authentication failed: {}", e);
                vec![close(e.to_string())]
            }
        }
    }

    fn on_salt_b(&mut self, salt: &[u8], b: &[u8]) -> Vec<SessionAction> {
        if self.state() != SessionState::Initializing
            || self.auth.method() != Some(AuthMethod::Srp)
        {
            warn!("Multiple authentication attempts, ignoring SRP challenge");
            return Vec::new();
        }

        match self.auth.respond(salt, b) {
            Ok(cmd) => vec![SessionAction::Send(cmd)],
            Err(e) => {
                error!("Authentication failed: {}", e);
                vec![close(e.to_string())]
            }
        }
    }

    fn on_accept(&mut self, player_pos: PlayerPos) -> Vec<SessionAction> {
        self.auth.reset();
        self.position.pos = player_pos;

        if self.state() != SessionState::Initializing {
            warn!("Ignoring authentication acceptance in state {:?}", self.state());
            return Vec::new();
        }

        info!("Authentication accepted");
        self.accepted = true;
        vec![SessionAction::Send(ToServer::Init2 {
            lang: self.lang.clone(),
        })]
    }

    fn on_time_of_day(&mut self) -> Vec<SessionAction> {
        if self.state() != SessionState::Initializing || !self.accepted {
            return Vec::new();
        }

        self.advance(SessionState::Active);
        vec![SessionAction::Send(ToServer::CltReady {
            major: CLIENT_MAJOR,
            minor: CLIENT_MINOR,
            patch: CLIENT_PATCH,
            reserved: 0,
            version: format!("chatbot {}", env!("CARGO_PKG_VERSION")),
            formspec: FORMSPEC_VERSION,
        })]
    }

    fn on_breath(&mut self) -> Vec<SessionAction> {
        if self.state() == SessionState::Active {
            self.advance(SessionState::Steady);
            info!("Logging chat messages");
        }
        Vec::new()
    }
}
