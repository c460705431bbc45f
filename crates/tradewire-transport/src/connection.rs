//! Connection lifecycle management for the push channel.
//!
//! One `ConnectionManager` owns the WebSocket for a whole session. It is
//! the sole mutator of `ConnectionState`; consumers observe state through
//! a `watch` channel and receive pushes through a `broadcast` channel.
//! A pump task owns the socket itself — everything else talks to it over
//! channels, so there is exactly one reader and one writer per connection.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, error, info, warn};

use tradewire_protocol::{
    ClientError, ClientEvent, CredentialStore, HandshakeParams, ServerEvent, auth::ClientInfo,
};

use crate::backoff::BackoffPolicy;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Capacity of the push fan-out channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Connection manager configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Push channel endpoint (ws:// or wss://)
    pub ws_url: String,
    /// Client identification sent with the handshake
    pub client: ClientInfo,
    /// Bound on connect + auth handshake (default: 10s)
    pub handshake_timeout: Duration,
    /// Retry schedule for retryable failures
    pub backoff: BackoffPolicy,
}

impl ConnectionConfig {
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            client: ClientInfo::new("tradewire"),
            handshake_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Observable connection state. Invariant: `is_connected` and
/// `is_connecting` are never both true.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub last_error: Option<String>,
    pub connection_attempts: u32,
    pub last_connected_at: Option<DateTime<Utc>>,
}

/// The session's single long-lived connection to the push channel.
///
/// Cheap to clone; all clones share the same underlying connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: ConnectionConfig,
    credentials: CredentialStore,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ServerEvent>,
    pump: Mutex<PumpHandles>,
}

#[derive(Default)]
struct PumpHandles {
    outgoing_tx: Option<mpsc::UnboundedSender<ClientEvent>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

enum PumpExit {
    /// Explicit disconnect; no reconnection.
    Shutdown,
    /// Transport-level drop; eligible for reconnection.
    Dropped(String),
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, credentials: CredentialStore) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                credentials,
                state_tx,
                events_tx,
                pump: Mutex::new(PumpHandles::default()),
            }),
        }
    }

    /// Current connection state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Watch connection state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to server pushes. Each subscriber sees every event.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Fire-and-forget send over the live connection.
    pub fn send(&self, event: ClientEvent) -> Result<(), ClientError> {
        if !self.shared.state_tx.borrow().is_connected {
            return Err(ClientError::NotConnected);
        }
        let pump = self.shared.pump.lock();
        match &pump.outgoing_tx {
            Some(tx) => tx.send(event).map_err(|_| ClientError::NotConnected),
            None => Err(ClientError::NotConnected),
        }
    }

    /// Open the connection and complete the auth handshake.
    ///
    /// No-op when already connected or connecting. Fails fast without any
    /// network I/O when no credential is present or the endpoint is
    /// malformed. Retryable failures are re-attempted per the backoff
    /// policy before the error is returned; terminal failures
    /// (authentication, configuration) are returned immediately.
    pub async fn connect(&self) -> Result<(), ClientError> {
        {
            let state = self.shared.state_tx.borrow();
            if state.is_connected || state.is_connecting {
                return Ok(());
            }
        }

        let token = match self.shared.credentials.token() {
            Some(token) => token.to_owned(),
            None => {
                let err = ClientError::Authentication("no credential present".into());
                self.shared.update(|s| {
                    s.is_connected = false;
                    s.is_connecting = false;
                    s.last_error = Some(err.to_string());
                });
                return Err(err);
            }
        };

        let url = &self.shared.config.ws_url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            let err = ClientError::Configuration(format!("invalid push endpoint: {url}"));
            self.shared.update(|s| s.last_error = Some(err.to_string()));
            return Err(err);
        }

        let policy = self.shared.config.backoff.clone();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.shared.update(|s| {
                s.is_connected = false;
                s.is_connecting = true;
                s.connection_attempts = attempt;
            });

            match self.shared.establish(&token).await {
                Ok(ws) => {
                    self.shared.start_pump(ws);
                    self.shared.mark_connected();
                    return Ok(());
                }
                Err(err) => {
                    self.shared.update(|s| {
                        s.is_connecting = false;
                        s.last_error = Some(err.to_string());
                    });
                    if policy.should_retry(err.class(), attempt) {
                        let delay = policy.jittered(attempt);
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "connect failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    error!(attempt, error = %err, "connect failed");
                    return Err(err);
                }
            }
        }
    }

    /// Tear down the connection immediately. Idempotent; suppresses any
    /// automatic reconnection.
    pub async fn disconnect(&self) {
        let (shutdown_tx, task) = {
            let mut pump = self.shared.pump.lock();
            (pump.shutdown_tx.take(), pump.task.take())
        };
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(()).await;
        }
        if let Some(task) = task {
            let _ = task.await;
        }
        self.shared.update(|s| *s = ConnectionState::default());
        debug!("push channel disconnected");
    }
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut ConnectionState)) {
        self.state_tx.send_modify(f);
    }

    fn mark_connected(&self) {
        self.update(|s| {
            s.is_connecting = false;
            s.is_connected = true;
            s.last_error = None;
            s.connection_attempts = 0;
            s.last_connected_at = Some(Utc::now());
        });
        info!("push channel connected");
    }

    fn clear_pump(&self) {
        let mut pump = self.pump.lock();
        pump.outgoing_tx = None;
        pump.shutdown_tx = None;
        pump.task = None;
    }

    fn start_pump(self: &Arc<Self>, ws: WsStream) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(run_pump(Arc::clone(self), ws, outgoing_rx, shutdown_rx));
        let mut pump = self.pump.lock();
        pump.outgoing_tx = Some(outgoing_tx);
        pump.shutdown_tx = Some(shutdown_tx);
        pump.task = Some(task);
    }

    /// Open the socket and run the auth handshake, bounded by the
    /// configured handshake timeout.
    async fn establish(&self, token: &str) -> Result<WsStream, ClientError> {
        tokio::time::timeout(self.config.handshake_timeout, self.open_and_handshake(token))
            .await
            .map_err(|_| {
                ClientError::Timeout(format!(
                    "handshake exceeded {}ms",
                    self.config.handshake_timeout.as_millis()
                ))
            })?
    }

    async fn open_and_handshake(&self, token: &str) -> Result<WsStream, ClientError> {
        let (mut ws, _) = connect_async(self.config.ws_url.as_str())
            .await
            .map_err(map_ws_error)?;
        debug!(url = %self.config.ws_url, "websocket open, awaiting auth:required");

        // Server greets with auth:required before anything else
        loop {
            match next_event(&mut ws).await? {
                Some(ServerEvent::AuthRequired(_)) => break,
                Some(other) => {
                    warn!(event = other.name(), "unexpected event before auth:required");
                }
                None => {}
            }
        }

        let handshake = ClientEvent::AuthHandshake(HandshakeParams {
            token: token.to_owned(),
            client: Some(self.config.client.clone()),
        });
        send_event(&mut ws, &handshake).await?;

        loop {
            match next_event(&mut ws).await? {
                Some(ServerEvent::AuthOk(ok)) => {
                    info!(session_id = %ok.session_id, "handshake accepted");
                    return Ok(ws);
                }
                Some(ServerEvent::AuthError(err)) => {
                    return Err(ClientError::Authentication(err.message));
                }
                Some(other) => {
                    warn!(event = other.name(), "unexpected event during handshake");
                }
                None => {}
            }
        }
    }
}

/// Socket owner. Pumps until the peer drops or a shutdown is requested;
/// transport drops trigger the reconnect loop, an explicit shutdown ends
/// the task.
async fn run_pump(
    shared: Arc<Shared>,
    mut ws: WsStream,
    mut outgoing_rx: mpsc::UnboundedReceiver<ClientEvent>,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    loop {
        match pump_socket(&shared, &mut ws, &mut outgoing_rx, &mut shutdown_rx).await {
            PumpExit::Shutdown => {
                let _ = ws.close(None).await;
                shared.update(|s| *s = ConnectionState::default());
                break;
            }
            PumpExit::Dropped(reason) => {
                warn!(reason = %reason, "push channel dropped");
                match reconnect(&shared, &mut shutdown_rx).await {
                    Some(new_ws) => {
                        ws = new_ws;
                        shared.mark_connected();
                    }
                    None => break,
                }
            }
        }
    }
    shared.clear_pump();
}

async fn pump_socket(
    shared: &Shared,
    ws: &mut WsStream,
    outgoing_rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    shutdown_rx: &mut mpsc::Receiver<()>,
) -> PumpExit {
    loop {
        tokio::select! {
            msg = ws.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        // No receivers is fine
                        Ok(event) => { let _ = shared.events_tx.send(event); }
                        Err(e) => warn!(error = %e, "skipping unparseable push frame"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return PumpExit::Dropped("closed by peer".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpExit::Dropped(e.to_string()),
            },
            event = outgoing_rx.recv() => match event {
                Some(event) => {
                    if let Err(e) = send_event(ws, &event).await {
                        return PumpExit::Dropped(e.to_string());
                    }
                }
                None => return PumpExit::Shutdown,
            },
            _ = shutdown_rx.recv() => return PumpExit::Shutdown,
        }
    }
}

/// Reconnection loop after a transport drop. Returns the fresh socket, or
/// `None` when retries are exhausted, the failure is terminal, or a
/// shutdown arrives mid-wait.
async fn reconnect(shared: &Arc<Shared>, shutdown_rx: &mut mpsc::Receiver<()>) -> Option<WsStream> {
    let token = match shared.credentials.token() {
        Some(token) => token.to_owned(),
        None => return None,
    };
    let policy = shared.config.backoff.clone();
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        shared.update(|s| {
            s.is_connected = false;
            s.is_connecting = true;
            s.connection_attempts = attempt;
        });

        let delay = policy.jittered(attempt);
        info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        tokio::select! {
            _ = shutdown_rx.recv() => {
                shared.update(|s| *s = ConnectionState::default());
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match shared.establish(&token).await {
            Ok(ws) => return Some(ws),
            Err(err) => {
                shared.update(|s| {
                    s.is_connecting = false;
                    s.last_error = Some(err.to_string());
                });
                if !policy.should_retry(err.class(), attempt) {
                    error!(attempt, error = %err, "reconnect abandoned");
                    return None;
                }
                warn!(attempt, error = %err, "reconnect failed, will retry");
            }
        }
    }
}

async fn next_event(ws: &mut WsStream) -> Result<Option<ServerEvent>, ClientError> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(text.as_str()) {
                Ok(event) => return Ok(Some(event)),
                Err(e) => {
                    warn!(error = %e, "skipping unparseable frame");
                    return Ok(None);
                }
            },
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) | None => {
                return Err(ClientError::Connection(
                    "connection closed during handshake".into(),
                ));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(map_ws_error(e)),
        }
    }
}

async fn send_event(ws: &mut WsStream, event: &ClientEvent) -> Result<(), ClientError> {
    let json = serde_json::to_string(event).map_err(|e| ClientError::Decode(e.to_string()))?;
    ws.send(Message::Text(json.into())).await.map_err(map_ws_error)
}

fn map_ws_error(err: tungstenite::Error) -> ClientError {
    match err {
        tungstenite::Error::Url(e) => ClientError::Configuration(e.to_string()),
        other => ClientError::Connection(other.to_string()),
    }
}
