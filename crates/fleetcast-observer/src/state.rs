//! Shared application state for the server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetcast_core::{BroadcastSettings, ListenerConfig, SnapshotGenerator, SubscriberRegistry};

/// Per-connection timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// How often the server pings an otherwise quiet client.
    pub keepalive_interval: Duration,
    /// A connection with no inbound frame for this long is closed.
    pub idle_timeout: Duration,
    /// Upper bound on a pong, keepalive ping, or close written by the
    /// connection itself.
    pub send_timeout: Duration,
}

impl ConnectionSettings {
    /// Replace the write bound, normally with the broadcast send timeout.
    #[must_use]
    pub const fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }
}

impl From<&ListenerConfig> for ConnectionSettings {
    fn from(config: &ListenerConfig) -> Self {
        Self {
            keepalive_interval: config.keepalive_interval(),
            idle_timeout: config.idle_timeout(),
            send_timeout: BroadcastSettings::default().send_timeout,
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ListenerConfig::default())
    }
}

/// State shared by every handler.
#[derive(Debug)]
pub struct AppState {
    /// Live subscribers; shared with the broadcast coordinator.
    pub registry: Arc<SubscriberRegistry>,
    /// Renders views for the REST endpoints.
    pub generator: SnapshotGenerator,
    /// Keepalive, idle timeout, and write bound for `WebSocket` connections.
    pub connection: ConnectionSettings,
    /// When the server state was created.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create the shared state.
    pub fn new(
        registry: Arc<SubscriberRegistry>,
        generator: SnapshotGenerator,
        connection: ConnectionSettings,
    ) -> Self {
        Self {
            registry,
            generator,
            connection,
            started_at: Utc::now(),
        }
    }
}
