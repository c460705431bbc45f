//! Event envelopes for the push channel.
//!
//! Every frame on the wire is a JSON envelope `{ "event": <name>, "data": <payload> }`.
//! Join/leave and typing events are fire-and-forget: no acknowledgement
//! events exist in the protocol.

use serde::{Deserialize, Serialize};

use crate::auth::{AuthErrorParams, AuthOkParams, AuthRequiredParams, HandshakeParams};
use crate::message::{Message, TypingSignal};

/// Reference to a conversation, the payload of join/leave and outbound
/// typing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRef {
    pub conversation_id: i64,
}

/// Events emitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "auth:handshake")]
    AuthHandshake(HandshakeParams),
    #[serde(rename = "conversation:join")]
    ConversationJoin(ConversationRef),
    #[serde(rename = "conversation:leave")]
    ConversationLeave(ConversationRef),
    #[serde(rename = "typing:start")]
    TypingStart(ConversationRef),
    #[serde(rename = "typing:stop")]
    TypingStop(ConversationRef),
}

impl ClientEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthHandshake(_) => "auth:handshake",
            Self::ConversationJoin(_) => "conversation:join",
            Self::ConversationLeave(_) => "conversation:leave",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
        }
    }

    pub fn join(conversation_id: i64) -> Self {
        Self::ConversationJoin(ConversationRef { conversation_id })
    }

    pub fn leave(conversation_id: i64) -> Self {
        Self::ConversationLeave(ConversationRef { conversation_id })
    }
}

/// Events pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "auth:required")]
    AuthRequired(AuthRequiredParams),
    #[serde(rename = "auth:ok")]
    AuthOk(AuthOkParams),
    #[serde(rename = "auth:error")]
    AuthError(AuthErrorParams),
    #[serde(rename = "message:new")]
    MessageNew(Message),
    #[serde(rename = "typing:start")]
    TypingStart(TypingSignal),
    #[serde(rename = "typing:stop")]
    TypingStop(TypingSignal),
}

impl ServerEvent {
    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthRequired(_) => "auth:required",
            Self::AuthOk(_) => "auth:ok",
            Self::AuthError(_) => "auth:error",
            Self::MessageNew(_) => "message:new",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
        }
    }
}
