//! Server lifecycle: bind the listener, then serve the router on it.
//!
//! Binding and serving are separate steps so callers (and tests) can bind
//! to port 0 and learn the real address before any request is accepted.

use std::net::SocketAddr;
use std::sync::Arc;

use fleetcast_core::ListenerConfig;
use tokio::net::{TcpListener, TcpSocket};
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured host could not be resolved.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        /// The `host:port` that was looked up.
        addr: String,
        /// The resolver error.
        source: std::io::Error,
    },

    /// The configured host resolved to no addresses.
    #[error("{addr} did not resolve to any address")]
    NoAddress {
        /// The `host:port` that was looked up.
        addr: String,
    },

    /// Failed to bind or listen on the resolved address.
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: SocketAddr,
        /// The socket error.
        source: std::io::Error,
    },

    /// The server hit a fatal I/O error while running.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the configured host and open a listening socket with the
/// configured pending-connection backlog.
///
/// # Errors
///
/// Returns [`ServerError`] if the host cannot be resolved or the socket
/// cannot be bound.
pub async fn bind(config: &ListenerConfig) -> Result<TcpListener, ServerError> {
    let target = format!("{}:{}", config.host, config.port);
    let mut resolved = tokio::net::lookup_host(target.clone())
        .await
        .map_err(|source| ServerError::Resolve {
            addr: target.clone(),
            source,
        })?;
    let addr = resolved
        .next()
        .ok_or_else(|| ServerError::NoAddress { addr: target })?;

    let bind_error = |source| ServerError::Bind { addr, source };
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_error)?;
    socket.set_reuseaddr(true).map_err(bind_error)?;
    socket.bind(addr).map_err(bind_error)?;
    let listener = socket
        .listen(config.max_pending_connections)
        .map_err(bind_error)?;

    info!(
        addr = %listener.local_addr()?,
        backlog = config.max_pending_connections,
        "Listening for subscribers"
    );
    Ok(listener)
}

/// Serve the router on an already bound listener until the task is
/// cancelled.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the server fails while running.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port_with_backlog() {
        let config = ListenerConfig {
            host: String::from("127.0.0.1"),
            port: 0,
            max_pending_connections: 16,
            ..ListenerConfig::default()
        };
        let listener = bind(&config).await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_ne!(addr.port(), 0);
    }
}
