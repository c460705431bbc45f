//! Typing indicator relay.
//!
//! Typing state is ephemeral: signals are sent fire-and-forget while
//! connected and never queued across a disconnect (a stale signal is
//! meaningless after reconnection). On the consumer side every start
//! signal carries an implicit expiry — if the stop signal is lost, the
//! indicator clears on its own instead of sticking forever.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use tradewire_protocol::{ClientEvent, ConversationRef, ServerEvent, TypingSignal};
use tradewire_transport::ConnectionManager;

/// Defensive expiry for a start signal with no matching stop.
pub const DEFAULT_TYPING_EXPIRY: Duration = Duration::from_secs(8);

/// Sends and consumes typing signals over the shared connection.
#[derive(Clone)]
pub struct TypingRelay {
    inner: Arc<Inner>,
}

struct Inner {
    conn: ConnectionManager,
    /// (conversation, user) → last start signal
    active: DashMap<(i64, i64), Instant>,
    expiry: Duration,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl TypingRelay {
    pub fn new(conn: ConnectionManager) -> Self {
        Self::with_expiry(conn, DEFAULT_TYPING_EXPIRY)
    }

    pub fn with_expiry(conn: ConnectionManager, expiry: Duration) -> Self {
        let inner = Arc::new(Inner {
            conn: conn.clone(),
            active: DashMap::new(),
            expiry,
            listener: Mutex::new(None),
        });
        let task = tokio::spawn(listen(conn, Arc::downgrade(&inner)));
        *inner.listener.lock() = Some(task);
        Self { inner }
    }

    /// Announce that the session user started typing. Dropped silently
    /// while disconnected.
    pub fn start(&self, conversation_id: i64) {
        self.signal(ClientEvent::TypingStart(ConversationRef { conversation_id }));
    }

    /// Announce that the session user stopped typing. Dropped silently
    /// while disconnected.
    pub fn stop(&self, conversation_id: i64) {
        self.signal(ClientEvent::TypingStop(ConversationRef { conversation_id }));
    }

    /// Users currently typing in a conversation. Entries older than the
    /// expiry are swept out before reporting.
    pub fn typists(&self, conversation_id: i64) -> Vec<i64> {
        let expiry = self.inner.expiry;
        self.inner.active.retain(|_, seen| seen.elapsed() < expiry);
        let mut users: Vec<i64> = self
            .inner
            .active
            .iter()
            .filter(|entry| entry.key().0 == conversation_id)
            .map(|entry| entry.key().1)
            .collect();
        users.sort_unstable();
        users
    }

    fn signal(&self, event: ClientEvent) {
        let name = event.name();
        if self.inner.conn.send(event).is_err() {
            debug!(signal = name, "typing signal dropped while disconnected");
        }
    }
}

impl Inner {
    fn ingest(&self, signal: TypingSignal, is_typing: bool) {
        let key = (signal.conversation_id, signal.user_id);
        if is_typing {
            self.active.insert(key, Instant::now());
        } else {
            self.active.remove(&key);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.listener.lock().take() {
            task.abort();
        }
    }
}

async fn listen(conn: ConnectionManager, inner: std::sync::Weak<Inner>) {
    let mut events = conn.subscribe();
    loop {
        let (signal, is_typing) = match events.recv().await {
            Ok(ServerEvent::TypingStart(signal)) => (signal, true),
            Ok(ServerEvent::TypingStop(signal)) => (signal, false),
            Ok(_) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "typing listener lagged; signals were dropped");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        let Some(inner) = inner.upgrade() else { return };
        inner.ingest(signal, is_typing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradewire_protocol::CredentialStore;
    use tradewire_transport::ConnectionConfig;

    fn relay(expiry: Duration) -> TypingRelay {
        let conn = ConnectionManager::new(
            ConnectionConfig::new("ws://127.0.0.1:9/ws"),
            CredentialStore::empty(),
        );
        TypingRelay::with_expiry(conn, expiry)
    }

    fn signal(conversation_id: i64, user_id: i64) -> TypingSignal {
        TypingSignal {
            conversation_id,
            user_id,
        }
    }

    #[tokio::test]
    async fn start_then_stop_clears_the_indicator() {
        let relay = relay(Duration::from_secs(8));
        relay.inner.ingest(signal(3, 11), true);
        assert_eq!(relay.typists(3), vec![11]);
        relay.inner.ingest(signal(3, 11), false);
        assert!(relay.typists(3).is_empty());
    }

    #[tokio::test]
    async fn indicator_expires_without_a_stop_signal() {
        let relay = relay(Duration::from_millis(40));
        relay.inner.ingest(signal(3, 11), true);
        assert_eq!(relay.typists(3), vec![11]);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(relay.typists(3).is_empty());
    }

    #[tokio::test]
    async fn typists_are_scoped_per_conversation() {
        let relay = relay(Duration::from_secs(8));
        relay.inner.ingest(signal(3, 11), true);
        relay.inner.ingest(signal(4, 12), true);
        assert_eq!(relay.typists(3), vec![11]);
        assert_eq!(relay.typists(4), vec![12]);
    }

    #[tokio::test]
    async fn signals_while_disconnected_are_dropped() {
        let relay = relay(Duration::from_secs(8));
        // Not connected; must not panic or queue
        relay.start(3);
        relay.stop(3);
    }
}
