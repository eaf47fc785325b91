//! Startup configuration: credentials from the command line, tunables with
//! defaults that can be overridden from the environment.

use crate::error::BotError;
use std::path::PathBuf;
use std::time::Duration;

pub const CHAT_LOG_ENV: &str = "CHATBOT_CHAT_LOG";
pub const MAX_VERSION_MISMATCHES_ENV: &str = "CHATBOT_MAX_VERSION_MISMATCHES";

/// Identity, secret and server endpoint. Fixed for the process lifetime.
#[derive(Clone)]
pub struct Credentials {
    pub name: String,
    pub password: String,
    pub server: String,
}

impl Credentials {
    pub fn new(
        name: impl Into<String>,
        password: impl Into<String>,
        server: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            server: server.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("server", &self.server)
            .finish()
    }
}

/// What to do with greetings whose serialization version we do not speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMismatchPolicy {
    /// Drop each mismatched greeting and keep waiting for a compatible one
    Wait,
    /// Close the connection once this many greetings have been dropped
    GiveUpAfter(u32),
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Interval between initial handshake retransmissions
    pub retry_interval: Duration,
    /// How long the session may stay in `Created` before the watchdog fires
    pub establish_timeout: Duration,
    /// Receive inactivity after which the transport closes itself
    pub idle_timeout: Duration,
    pub chat_log: PathBuf,
    pub lang: String,
    pub version_policy: VersionMismatchPolicy,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(500),
            establish_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30),
            chat_log: PathBuf::from("chat_log.txt"),
            lang: shared::DEFAULT_LANG.to_string(),
            version_policy: VersionMismatchPolicy::Wait,
        }
    }
}

impl BotConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, BotError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BotError> {
        let mut config = Self::default();

        if let Some(path) = lookup(CHAT_LOG_ENV) {
            if path.trim().is_empty() {
                return Err(BotError::Config(format!("{} is empty", CHAT_LOG_ENV)));
            }
            config.chat_log = PathBuf::from(path);
        }

        if let Some(raw) = lookup(MAX_VERSION_MISMATCHES_ENV) {
            let limit: u32 = raw.trim().parse().map_err(|_| {
                BotError::Config(format!(
                    "{} must be a non-negative integer, got {:?}",
                    MAX_VERSION_MISMATCHES_ENV, raw
                ))
            })?;
            config.version_policy = if limit == 0 {
                VersionMismatchPolicy::Wait
            } else {
                VersionMismatchPolicy::GiveUpAfter(limit)
            };
        }

        Ok(config)
    }
}
