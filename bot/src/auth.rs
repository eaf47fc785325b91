//! Password-proof authentication engine
//!
//! Two SRP variants are supported, chosen once from the bitmask the server
//! advertises in its greeting:
//! - `FirstSrp`: first login to a fresh account; the client registers a salt
//!   and verifier directly, no ephemeral round trip.
//! - `Srp`: existing account; the client sends `A`, receives `(s, B)` and
//!   answers with the proof `M`.

use crate::config::Credentials;
use crate::error::AuthError;
use shared::{auth_methods, srp, ToServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Srp,
    FirstSrp,
}

impl AuthMethod {
    /// Picks a method from the advertised bitmask, preferring `FirstSrp`.
    pub fn select(advertised: u32) -> Option<Self> {
        if advertised & auth_methods::FIRST_SRP != 0 {
            Some(AuthMethod::FirstSrp)
        } else if advertised & auth_methods::SRP != 0 {
            Some(AuthMethod::Srp)
        } else {
            None
        }
    }
}

/// In-progress handshake state. Empty until the greeting arrives and
/// emptied again as soon as the server accepts.
#[derive(Default)]
pub struct AuthContext {
    method: Option<AuthMethod>,
    srp_a: Vec<u8>,
    a: Vec<u8>,
    session_key: Vec<u8>,
}

impl AuthContext {
    pub fn method(&self) -> Option<AuthMethod> {
        self.method
    }

    pub fn public_ephemeral(&self) -> &[u8] {
        &self.srp_a
    }

    pub fn has_private_ephemeral(&self) -> bool {
        !self.a.is_empty()
    }

    pub fn has_session_key(&self) -> bool {
        !self.session_key.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.method.is_none()
            && self.srp_a.is_empty()
            && self.a.is_empty()
            && self.session_key.is_empty()
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("method", &self.method)
            .field("srp_a_len", &self.srp_a.len())
            .field("has_private_ephemeral", &self.has_private_ephemeral())
            .field("has_session_key", &self.has_session_key())
            .finish()
    }
}

pub struct AuthEngine {
    credentials: Credentials,
    context: AuthContext,
}

impl AuthEngine {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            context: AuthContext::default(),
        }
    }

    pub fn method(&self) -> Option<AuthMethod> {
        self.context.method
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    /// Starts the handshake and returns the first proof command to send.
    ///
    /// # Errors
    ///
    /// `AlreadyPending` if a method is already negotiated, `Unsupported` if
    /// the bitmask offers nothing usable, `Srp` if key generation fails.
    pub fn begin(&mut self, advertised: u32) -> Result<ToServer, AuthError> {
        if let Some(method) = self.context.method {
            return Err(AuthError::AlreadyPending(method));
        }

        let method = AuthMethod::select(advertised).ok_or(AuthError::Unsupported(advertised))?;
        self.context.method = Some(method);

        let name = self.credentials.name.as_bytes();
        let password = self.credentials.password.as_bytes();

        match method {
            AuthMethod::Srp => {
                let (srp_a, a) = srp::initiate_handshake()?;
                self.context.srp_a = srp_a.clone();
                self.context.a = a;

                Ok(ToServer::SrpBytesA {
                    a: srp_a,
                    no_sha1: true,
                })
            }
            AuthMethod::FirstSrp => {
                let (salt, verifier) = srp::new_client(name, password)?;

                Ok(ToServer::FirstSrp {
                    salt,
                    verifier,
                    empty_passwd: password.is_empty(),
                })
            }
        }
    }

    /// Answers the server's salt and public ephemeral with the client proof.
    ///
    /// Nothing is returned unless the proof passed its safety check.
    pub fn respond(&mut self, salt: &[u8], b_pub: &[u8]) -> Result<ToServer, AuthError> {
        if self.context.method != Some(AuthMethod::Srp) || !self.context.has_private_ephemeral() {
            return Err(AuthError::NotPending);
        }

        let name = self.credentials.name.as_bytes();
        let password = self.credentials.password.as_bytes();

        let key = srp::complete_handshake(
            &self.context.srp_a,
            &self.context.a,
            name,
            password,
            salt,
            b_pub,
        )?;

        let m = srp::client_proof(name, salt, &self.context.srp_a, b_pub, &key)
            .ok_or(AuthError::SafetyCheck)?;
        self.context.session_key = key;

        Ok(ToServer::SrpBytesM { m })
    }

    pub fn reset(&mut self) {
        self.context = AuthContext::default();
    }
}
