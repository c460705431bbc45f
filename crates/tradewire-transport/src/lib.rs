//! Tradewire Transport Layer
//!
//! Client-side WebSocket transport for the marketplace push channel.
//! The transport layer handles:
//! - Connection lifecycle (connect, disconnect, automatic reconnect)
//! - Authentication handshake at connection-open time
//! - Backoff scheduling for retryable failures
//! - Push fan-out to subscribers over a broadcast channel
//!
//! Exactly one `ConnectionManager` exists per authenticated session; every
//! conversation view shares it.

pub mod backoff;
pub mod connection;

pub use backoff::BackoffPolicy;
pub use connection::{ConnectionConfig, ConnectionManager, ConnectionState};
