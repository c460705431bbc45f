//! Messaging client facade.
//!
//! Wires one connection manager into the room tracker, the REST
//! collaborator and the typing relay, and hands out per-conversation
//! handles. Exactly one `MessagingClient` (and therefore one push
//! connection) exists per authenticated session; it is passed by
//! reference to every consumer rather than living as an ambient global.

use std::time::Duration;

use tradewire_protocol::{ClientError, CredentialStore, auth::ClientInfo};
use tradewire_transport::{ConnectionConfig, ConnectionManager, ConnectionState};

use crate::api::MessagesApi;
use crate::conversation::Conversation;
use crate::rooms::RoomTracker;
use crate::typing::{DEFAULT_TYPING_EXPIRY, TypingRelay};

/// Session-level configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Push channel endpoint (ws:// or wss://)
    pub ws_url: String,
    /// REST collaborator base URL
    pub api_url: String,
    /// Client identifier sent with the handshake
    pub client_name: String,
    /// The authenticated user owning this session
    pub user_id: i64,
    /// Defensive expiry for received typing signals
    pub typing_expiry: Duration,
}

impl ClientConfig {
    pub fn new(ws_url: impl Into<String>, api_url: impl Into<String>, user_id: i64) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_url: api_url.into(),
            client_name: "tradewire".into(),
            user_id,
            typing_expiry: DEFAULT_TYPING_EXPIRY,
        }
    }
}

/// The session's messaging core.
pub struct MessagingClient {
    config: ClientConfig,
    conn: ConnectionManager,
    rooms: RoomTracker,
    api: MessagesApi,
    typing: TypingRelay,
}

impl MessagingClient {
    pub fn new(config: ClientConfig, credentials: CredentialStore) -> Result<Self, ClientError> {
        let mut connection_config = ConnectionConfig::new(config.ws_url.clone());
        connection_config.client = ClientInfo::new(config.client_name.clone());
        let conn = ConnectionManager::new(connection_config, credentials.clone());
        let rooms = RoomTracker::new(conn.clone());
        let api = MessagesApi::new(config.api_url.clone(), credentials)?;
        let typing = TypingRelay::with_expiry(conn.clone(), config.typing_expiry);
        Ok(Self {
            config,
            conn,
            rooms,
            api,
            typing,
        })
    }

    /// Open the push connection. See `ConnectionManager::connect`.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Tear the push connection down. Idempotent.
    pub async fn disconnect(&self) {
        self.conn.disconnect().await;
    }

    /// Open a conversation view: joins its push channel (deferred until
    /// connected if necessary) and returns the handle that owns its
    /// reconciled message list.
    pub fn open_conversation(&self, conversation_id: i64) -> Conversation {
        Conversation::open(
            conversation_id,
            self.config.user_id,
            self.conn.clone(),
            self.rooms.clone(),
            self.api.clone(),
        )
    }

    pub fn typing(&self) -> &TypingRelay {
        &self.typing
    }

    pub fn rooms(&self) -> &RoomTracker {
        &self.rooms
    }

    /// The shared connection, for consumers that subscribe directly.
    pub fn connection(&self) -> &ConnectionManager {
        &self.conn
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    pub fn watch_state(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.conn.watch_state()
    }
}
