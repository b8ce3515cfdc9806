//! Subscriber registry: the set of connections that receive broadcasts.
//!
//! Transport layers register a [`MessageSink`] per connection and remove
//! it when the connection ends. The broadcast loop takes a point-in-time
//! member list with [`SubscriberRegistry::snapshot_members`] and never
//! holds the registry lock while sending.
//!
//! A subscriber's registration and its connection end together: removing
//! a member calls [`MessageSink::disconnect`] on its sink, which asks the
//! transport to close the connection.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use fleetcast_types::SubscriberId;
use futures::future::BoxFuture;
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

/// Errors returned when delivering a frame to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection is already closed.
    #[error("connection closed")]
    Closed,

    /// The send did not complete within the timeout.
    #[error("send timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that expired.
        timeout_ms: u64,
    },

    /// The transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound side of one subscriber connection.
pub trait MessageSink: Send + Sync {
    /// Deliver one UTF-8 text frame.
    ///
    /// The same buffer is handed to every subscriber of a round, so
    /// implementations should not copy it.
    fn send_text(&self, frame: Bytes) -> BoxFuture<'_, Result<(), SendError>>;

    /// Called once when the registry drops this subscriber.
    ///
    /// Transports close the underlying connection here. Must not block.
    fn disconnect(&self) {}
}

/// Shared handle to a subscriber's sink.
pub type SinkHandle = Arc<dyn MessageSink>;

/// A registered subscriber as seen by one broadcast round.
#[derive(Clone)]
pub struct Member {
    /// Registry identity.
    pub id: SubscriberId,
    /// Where frames for this subscriber go.
    pub sink: SinkHandle,
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Concurrent set of live subscribers.
#[derive(Default)]
pub struct SubscriberRegistry {
    members: RwLock<BTreeMap<SubscriberId, SinkHandle>>,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry").finish_non_exhaustive()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink and return its new identity.
    pub async fn add(&self, sink: SinkHandle) -> SubscriberId {
        let id = SubscriberId::new();
        let count = {
            let mut members = self.members.write().await;
            let _ = members.insert(id, sink);
            members.len()
        };
        debug!(subscriber = %id, subscribers = count, "subscriber added");
        id
    }

    /// Remove a subscriber and disconnect its sink.
    ///
    /// Returns `false` if it was not registered; only the call that
    /// actually removes a member disconnects it.
    pub async fn remove(&self, id: SubscriberId) -> bool {
        let Some(sink) = self.members.write().await.remove(&id) else {
            return false;
        };
        sink.disconnect();
        debug!(subscriber = %id, "subscriber removed");
        true
    }

    /// Whether a subscriber is currently registered.
    pub async fn contains(&self, id: SubscriberId) -> bool {
        self.members.read().await.contains_key(&id)
    }

    /// Point-in-time copy of the member list.
    pub async fn snapshot_members(&self) -> Vec<Member> {
        self.members
            .read()
            .await
            .iter()
            .map(|(id, sink)| Member {
                id: *id,
                sink: Arc::clone(sink),
            })
            .collect()
    }

    /// Drop members that have been removed since `members` was taken.
    pub async fn retain_registered(&self, members: &mut Vec<Member>) {
        let current = self.members.read().await;
        members.retain(|member| current.contains_key(&member.id));
    }

    /// Number of registered subscribers.
    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    /// Whether no subscribers are registered.
    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}

/// A sink that forwards frames into a bounded channel.
///
/// Used for in-process subscribers. A send fails with
/// [`SendError::Closed`] once the receiver is dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Create a sink and the receiver that reads its frames.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl MessageSink for ChannelSink {
    fn send_text(&self, frame: Bytes) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(async move { self.tx.send(frame).await.map_err(|_closed| SendError::Closed) })
    }
}
