//! Tradewire Client
//!
//! The conversation layer of the marketplace messaging core. Composes the
//! shared connection manager with:
//! - room membership tracking (join/leave with replay across reconnects)
//! - message reconciliation (REST history + live pushes, de-duplicated
//!   and ordered per conversation)
//! - the REST collaborator wrapper (history, send, read receipts)
//! - ephemeral typing indicators with defensive expiry
//!
//! `MessagingClient` is the entry point; it owns exactly one connection
//! per session and hands out per-conversation handles that share it.

pub mod api;
pub mod client;
pub mod conversation;
pub mod rooms;
pub mod typing;

pub use api::MessagesApi;
pub use client::{ClientConfig, MessagingClient};
pub use conversation::Conversation;
pub use rooms::RoomTracker;
pub use typing::TypingRelay;
