//! Authentication types for the WebSocket handshake.
//!
//! Protocol flow:
//!   1. Client connects to wss://host/ws
//!   2. Server sends: { event: "auth:required", data: { serverVersion, timeout } }
//!   3. Client sends: { event: "auth:handshake", data: { token, client } }
//!   4. Server replies with auth:ok or auth:error
//!   5. Normal event traffic begins
//!
//! The bearer token is carried once at connection-open time, never per event.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Client → Server
// ─────────────────────────────────────────────────────────────────────────────

/// Client information sent during handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client type identifier (e.g., "marketplace-web", "headless-test")
    pub name: String,
    /// Client version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ClientInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }
}

/// Payload of the auth:handshake event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandshakeParams {
    /// The bearer credential (shared secret for this session)
    pub token: String,
    /// Optional client information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientInfo>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Server → Client
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of the auth:required event (sent on connect).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequiredParams {
    /// Server version
    pub server_version: String,
    /// Milliseconds until an unauthenticated connection is closed
    pub timeout: u64,
}

/// Payload of the auth:ok event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthOkParams {
    /// Session identifier assigned by the server
    pub session_id: String,
    /// Server version
    pub server_version: String,
}

/// Payload of the auth:error event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthErrorParams {
    pub code: i32,
    pub message: String,
}

/// Authentication failure codes (4000-range, close-code style).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    /// Invalid or expired bearer token
    InvalidToken,
    /// Handshake not completed within the server's window
    HandshakeTimeout,
    /// Connection refused for policy reasons
    ConnectionRejected,
}

impl AuthErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidToken => 4001,
            Self::HandshakeTimeout => 4002,
            Self::ConnectionRejected => 4003,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Credential store
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only holder of the session's bearer credential.
///
/// This core never writes or refreshes the token; the owning session does.
#[derive(Clone, Default)]
pub struct CredentialStore {
    token: Option<SecretString>,
}

impl CredentialStore {
    /// A store with no credential. Connection attempts fail fast against it.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(SecretString::from(token.into())),
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// The raw token, if present. Callers must not log the value.
    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("token", &self.token.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}
