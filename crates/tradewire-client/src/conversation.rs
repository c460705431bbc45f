//! Per-conversation message reconciliation.
//!
//! One `Conversation` exists per open conversation view. It merges the
//! REST history page with live pushes into a single list, unique by
//! server-assigned id and ordered ascending by creation time. The list
//! has exactly one mutation path: pushes. A send never appends locally —
//! the authoritative record arrives back over the push channel, so a
//! failed send can never strand a phantom message.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use tradewire_protocol::{ClientError, Message, ServerEvent};
use tradewire_transport::ConnectionManager;

use crate::api::MessagesApi;
use crate::rooms::RoomTracker;

/// Handle to one open conversation. Cheap to clone; all clones share the
/// message list. The room is left and the push listener stopped when the
/// handle is closed (or the last clone is dropped).
#[derive(Clone)]
pub struct Conversation {
    inner: Arc<Inner>,
}

struct Inner {
    conversation_id: i64,
    /// The session user; their own messages are excluded from read receipts.
    user_id: i64,
    conn: ConnectionManager,
    rooms: RoomTracker,
    api: MessagesApi,
    messages: Mutex<Vec<Message>>,
    /// Bumped by every history load and by close; a response only lands
    /// if its generation is still current.
    generation: AtomicU64,
    closed: AtomicBool,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Conversation {
    pub(crate) fn open(
        conversation_id: i64,
        user_id: i64,
        conn: ConnectionManager,
        rooms: RoomTracker,
        api: MessagesApi,
    ) -> Self {
        rooms.join(conversation_id);
        let inner = Arc::new(Inner {
            conversation_id,
            user_id,
            conn: conn.clone(),
            rooms,
            api,
            messages: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            listener: Mutex::new(None),
        });
        let task = tokio::spawn(listen(conn, Arc::downgrade(&inner)));
        *inner.listener.lock() = Some(task);
        Self { inner }
    }

    pub fn conversation_id(&self) -> i64 {
        self.inner.conversation_id
    }

    /// Snapshot of the reconciled message list.
    pub fn messages(&self) -> Vec<Message> {
        self.inner.messages.lock().clone()
    }

    /// Fetch the persisted history page and replace the list wholesale.
    ///
    /// Concurrent loads cancel-and-replace: each call bumps the
    /// generation, and a response whose generation is no longer current is
    /// discarded rather than clobbering newer data. Failure leaves the
    /// previous list untouched and is retryable by the caller.
    pub async fn load_history(&self) -> Result<(), ClientError> {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut page = self.inner.api.history(self.inner.conversation_id).await?;
        if self.inner.generation.load(Ordering::SeqCst) != generation
            || self.inner.closed.load(Ordering::SeqCst)
        {
            debug!(
                conversation_id = self.inner.conversation_id,
                "discarding stale history response"
            );
            return Ok(());
        }
        let mut seen = std::collections::HashSet::new();
        page.retain(|m| seen.insert(m.id));
        page.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        *self.inner.messages.lock() = page;
        Ok(())
    }

    /// Submit a new message.
    ///
    /// Content must be non-empty after trimming; that is rejected locally
    /// before any network call. A send while disconnected fails fast with
    /// `NotConnected` instead of hanging until a timeout. The returned
    /// record is the REST echo — it is not appended here; the list picks
    /// it up from the push channel.
    pub async fn send(&self, content: &str) -> Result<Message, ClientError> {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(ClientError::Validation("message content is empty".into()));
        }
        if !self.inner.conn.state().is_connected {
            return Err(ClientError::NotConnected);
        }
        self.inner.api.send(self.inner.conversation_id, trimmed).await
    }

    /// Acknowledge messages as read. Ids authored by the session user are
    /// filtered out; local `is_read` flags flip only after the backend
    /// accepts the batch.
    pub async fn mark_read(&self, message_ids: &[i64]) -> Result<(), ClientError> {
        let eligible: Vec<i64> = {
            let messages = self.inner.messages.lock();
            message_ids
                .iter()
                .copied()
                .filter(|id| {
                    messages
                        .iter()
                        .any(|m| m.id == *id && m.sender_id != self.inner.user_id)
                })
                .collect()
        };
        if eligible.is_empty() {
            return Ok(());
        }
        self.inner
            .api
            .mark_read(self.inner.conversation_id, &eligible)
            .await?;
        let mut messages = self.inner.messages.lock();
        for message in messages.iter_mut() {
            if eligible.contains(&message.id) {
                message.is_read = true;
            }
        }
        Ok(())
    }

    /// Leave the room and stop applying pushes. In-flight history loads
    /// are invalidated. Idempotent.
    pub fn close(&self) {
        self.inner.close();
    }
}

impl Inner {
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.rooms.leave(self.conversation_id);
        if let Some(task) = self.listener.lock().take() {
            task.abort();
        }
        debug!(conversation_id = self.conversation_id, "conversation closed");
    }

    /// Apply one pushed message: drop foreign conversations, de-duplicate
    /// by id, keep the list stable-sorted by creation time.
    fn apply_push(&self, message: Message) {
        if message.conversation_id != self.conversation_id {
            return;
        }
        let mut messages = self.messages.lock();
        if messages.iter().any(|m| m.id == message.id) {
            debug!(
                conversation_id = self.conversation_id,
                message_id = message.id,
                "dropping duplicate push"
            );
            return;
        }
        messages.push(message);
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

async fn listen(conn: ConnectionManager, inner: std::sync::Weak<Inner>) {
    let mut events = conn.subscribe();
    loop {
        match events.recv().await {
            Ok(ServerEvent::MessageNew(message)) => {
                let Some(inner) = inner.upgrade() else { return };
                if inner.closed.load(Ordering::SeqCst) {
                    return;
                }
                inner.apply_push(message);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "push listener lagged; events were dropped");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tradewire_protocol::CredentialStore;
    use tradewire_transport::{ConnectionConfig, ConnectionManager};

    fn message(id: i64, conversation_id: i64, minute: u32) -> Message {
        Message {
            id,
            conversation_id,
            sender_id: 2,
            content: format!("m{id}"),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, minute, 0).unwrap(),
            is_read: false,
        }
    }

    fn inner(conversation_id: i64) -> Inner {
        let conn = ConnectionManager::new(
            ConnectionConfig::new("ws://127.0.0.1:9/ws"),
            CredentialStore::empty(),
        );
        Inner {
            conversation_id,
            user_id: 1,
            conn: conn.clone(),
            rooms: RoomTracker::new(conn),
            api: MessagesApi::new("http://127.0.0.1:9", CredentialStore::empty()).unwrap(),
            messages: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    #[tokio::test]
    async fn duplicate_push_is_dropped() {
        let inner = inner(5);
        inner.apply_push(message(1, 5, 0));
        inner.apply_push(message(2, 5, 1));
        inner.apply_push(message(2, 5, 1));
        assert_eq!(inner.messages.lock().len(), 2);
    }

    #[tokio::test]
    async fn foreign_conversation_push_is_ignored() {
        let inner = inner(5);
        inner.apply_push(message(1, 6, 0));
        assert!(inner.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn out_of_order_arrival_is_sorted_by_created_at() {
        let inner = inner(5);
        inner.apply_push(message(3, 5, 30));
        inner.apply_push(message(1, 5, 10));
        inner.apply_push(message(2, 5, 20));
        let ids: Vec<i64> = inner.messages.lock().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
