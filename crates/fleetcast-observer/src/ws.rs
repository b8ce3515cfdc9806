//! `WebSocket` subscriber connections.
//!
//! Clients connect to `GET /ws` (or `/ws/fleet`). The socket is split:
//! the write half becomes a [`MessageSink`] registered with the
//! subscriber registry, so the broadcast coordinator writes to it
//! directly; the read half stays here to answer control messages.
//!
//! Inbound protocol:
//!
//! - text `ping` is answered with text `pong`
//! - any other text or binary frame is ignored
//! - `WebSocket` Ping frames are answered with Pong by the protocol layer
//!
//! A connection is deregistered when the client closes it, when a read
//! fails, or when nothing has been received for the idle timeout. The
//! server pings quiet clients every keepalive interval so a healthy
//! client never reaches the idle timeout.
//!
//! The reverse also holds: when the broadcast coordinator drops a
//! subscriber after a failed send, the registry disconnects its sink and
//! the connection is closed. Every write the connection makes on its own
//! is bounded by the send timeout, so a client that stops reading cannot
//! pin the task.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use fleetcast_core::{MessageSink, SendError};
use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Mutex, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::state::{AppState, ConnectionSettings};

/// Text control message a client sends to check liveness.
pub const PING: &str = "ping";

/// Reply to [`PING`].
pub const PONG: &str = "pong";

/// Upgrade an HTTP request and register the connection as a subscriber.
///
/// # Route
///
/// `GET /ws`, `GET /ws/fleet`
pub async fn ws_fleet(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Write half of a connection, shared between the broadcast coordinator
/// and the control loop.
struct WsSink {
    tx: Mutex<SplitSink<WebSocket, Message>>,
    dropped: Notify,
}

impl WsSink {
    fn new(tx: SplitSink<WebSocket, Message>) -> Self {
        Self {
            tx: Mutex::new(tx),
            dropped: Notify::new(),
        }
    }

    async fn send(&self, message: Message) -> Result<(), SendError> {
        self.tx
            .lock()
            .await
            .send(message)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))
    }

    async fn send_within(&self, message: Message, limit: Duration) -> Result<(), SendError> {
        tokio::time::timeout(limit, self.send(message))
            .await
            .unwrap_or_else(|_elapsed| {
                Err(SendError::Timeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }

    async fn close_within(&self, limit: Duration) {
        let _ = tokio::time::timeout(limit, async { self.tx.lock().await.close().await }).await;
    }
}

impl MessageSink for WsSink {
    fn send_text(&self, frame: Bytes) -> BoxFuture<'_, Result<(), SendError>> {
        Box::pin(async move {
            let text =
                Utf8Bytes::try_from(frame).map_err(|e| SendError::Transport(e.to_string()))?;
            self.send(Message::Text(text)).await
        })
    }

    fn disconnect(&self) {
        self.dropped.notify_one();
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disconnect {
    Closed,
    ReadError,
    WriteError,
    IdleTimeout,
    Dropped,
}

async fn handle_ws(socket: WebSocket, state: Arc<AppState>) {
    let (tx, rx) = socket.split();
    let sink = Arc::new(WsSink::new(tx));
    let id = state.registry.add(Arc::clone(&sink) as Arc<dyn MessageSink>).await;
    debug!(subscriber = %id, "WebSocket subscriber connected");

    let reason = control_loop(rx, &sink, state.connection).await;

    // The coordinator may already have removed a subscriber whose send failed.
    let removed = state.registry.remove(id).await;
    sink.close_within(state.connection.send_timeout).await;
    debug!(subscriber = %id, ?reason, removed, "WebSocket subscriber disconnected");
}

async fn control_loop(
    mut rx: SplitStream<WebSocket>,
    sink: &WsSink,
    settings: ConnectionSettings,
) -> Disconnect {
    let mut keepalive = tokio::time::interval(settings.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.reset();
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = rx.next() => {
                let msg = match msg {
                    Some(Ok(Message::Close(_))) | None => return Disconnect::Closed,
                    Some(Err(e)) => {
                        debug!("WebSocket read error: {e}");
                        return Disconnect::ReadError;
                    }
                    Some(Ok(msg)) => msg,
                };
                last_seen = Instant::now();
                if matches!(&msg, Message::Text(text) if text.as_str() == PING)
                    && sink
                        .send_within(
                            Message::Text(Utf8Bytes::from_static(PONG)),
                            settings.send_timeout,
                        )
                        .await
                        .is_err()
                {
                    return Disconnect::WriteError;
                }
            }
            _ = keepalive.tick() => {
                if sink
                    .send_within(Message::Ping(Bytes::new()), settings.send_timeout)
                    .await
                    .is_err()
                {
                    return Disconnect::WriteError;
                }
            }
            () = tokio::time::sleep(settings.idle_timeout.saturating_sub(last_seen.elapsed())) => {
                return Disconnect::IdleTimeout;
            }
            () = sink.dropped.notified() => return Disconnect::Dropped,
        }
    }
}
