//! Tradewire - Protocol Types
//!
//! Wire-level types for the marketplace messaging channel. This crate is
//! the single source of truth for event envelopes, the message model,
//! the auth handshake, and the error taxonomy that drives retry policy.
//! It performs no I/O.

pub mod auth;
pub mod error;
pub mod events;
pub mod message;

pub use auth::{
    AuthErrorCode, AuthErrorParams, AuthOkParams, AuthRequiredParams, ClientInfo, CredentialStore,
    HandshakeParams,
};
pub use error::{ClientError, ErrorClass};
pub use events::{ClientEvent, ConversationRef, ServerEvent};
pub use message::{Message, TypingSignal};
