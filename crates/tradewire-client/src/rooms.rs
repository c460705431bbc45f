//! Room membership tracking.
//!
//! The tracker keeps the durable set of conversations the session wants to
//! be subscribed to, independent of connection lifetime. Joins issued
//! while disconnected are deferred intents; a replay task re-announces
//! every desired membership each time the connection transitions into
//! `Connected`, so views opened before (or across) a disconnect keep
//! receiving pushes transparently.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use tradewire_protocol::ClientEvent;
use tradewire_transport::ConnectionManager;

struct Membership {
    joined_at: DateTime<Utc>,
    /// Whether the join was announced on the current connection.
    announced: bool,
}

/// Durable join/leave tracker layered on the shared connection.
#[derive(Clone)]
pub struct RoomTracker {
    inner: Arc<Inner>,
}

struct Inner {
    conn: ConnectionManager,
    desired: Mutex<HashMap<i64, Membership>>,
    replay_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RoomTracker {
    pub fn new(conn: ConnectionManager) -> Self {
        let inner = Arc::new(Inner {
            conn,
            desired: Mutex::new(HashMap::new()),
            replay_task: Mutex::new(None),
        });
        // The task holds a Weak reference so dropping the last tracker
        // clone ends the loop instead of leaking it.
        let task = tokio::spawn(replay_loop(inner.conn.watch_state(), Arc::downgrade(&inner)));
        *inner.replay_task.lock() = Some(task);
        Self { inner }
    }

    /// Subscribe to a conversation's push channel. Idempotent: a second
    /// join of an announced conversation sends nothing. While
    /// disconnected this records intent; the join is announced on the
    /// next `Connected` transition.
    pub fn join(&self, conversation_id: i64) {
        let mut desired = self.inner.desired.lock();
        let entry = desired.entry(conversation_id).or_insert_with(|| Membership {
            joined_at: Utc::now(),
            announced: false,
        });
        if entry.announced {
            return;
        }
        if self.inner.conn.send(ClientEvent::join(conversation_id)).is_ok() {
            entry.announced = true;
            debug!(conversation_id, "joined conversation channel");
        } else {
            debug!(conversation_id, "join deferred until connected");
        }
    }

    /// Drop a conversation subscription. Only effective while connected;
    /// otherwise there is nothing server-side to leave.
    pub fn leave(&self, conversation_id: i64) {
        let removed = self.inner.desired.lock().remove(&conversation_id);
        match removed {
            Some(m) if m.announced => {
                if self.inner.conn.send(ClientEvent::leave(conversation_id)).is_ok() {
                    debug!(conversation_id, "left conversation channel");
                }
            }
            _ => {}
        }
    }

    /// Whether the conversation is currently desired (joined or pending).
    pub fn is_member(&self, conversation_id: i64) -> bool {
        self.inner.desired.lock().contains_key(&conversation_id)
    }

    /// When the membership was first requested, if it exists.
    pub fn joined_at(&self, conversation_id: i64) -> Option<DateTime<Utc>> {
        self.inner.desired.lock().get(&conversation_id).map(|m| m.joined_at)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.replay_task.lock().take() {
            task.abort();
        }
    }
}

/// Watches connection transitions. Entering `Connected` replays every
/// desired join; leaving it clears the announced marks so the next
/// connection gets a fresh set of joins.
async fn replay_loop(
    mut rx: tokio::sync::watch::Receiver<tradewire_transport::ConnectionState>,
    inner: Weak<Inner>,
) {
    let mut was_connected = rx.borrow().is_connected;
    loop {
        if rx.changed().await.is_err() {
            return;
        }
        let connected = rx.borrow().is_connected;
        if connected == was_connected {
            continue;
        }
        was_connected = connected;

        let Some(inner) = inner.upgrade() else { return };
        let mut desired = inner.desired.lock();
        if connected {
            for (&conversation_id, membership) in desired.iter_mut() {
                if membership.announced {
                    continue;
                }
                match inner.conn.send(ClientEvent::join(conversation_id)) {
                    Ok(()) => {
                        membership.announced = true;
                        debug!(conversation_id, "replayed conversation join");
                    }
                    Err(e) => warn!(conversation_id, error = %e, "join replay failed"),
                }
            }
        } else {
            for membership in desired.values_mut() {
                membership.announced = false;
            }
        }
    }
}
