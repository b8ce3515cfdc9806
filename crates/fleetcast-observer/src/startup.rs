//! Startup helper for embedding the server in the engine binary.
//!
//! [`spawn_observer`] binds eagerly, so a bad address or a port already in
//! use fails start-up instead of a background task, then serves on a
//! background Tokio task.

use std::net::SocketAddr;
use std::sync::Arc;

use fleetcast_core::ListenerConfig;
use tokio::task::JoinHandle;

use crate::server::{ServerError, bind, serve};
use crate::state::AppState;

/// Bind the listener and serve on a background task.
///
/// Returns the bound address together with the task handle; the caller
/// aborts the handle on shutdown.
///
/// # Errors
///
/// Returns [`ServerError`] if the listener cannot be bound.
pub async fn spawn_observer(
    config: &ListenerConfig,
    state: Arc<AppState>,
) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
    let listener = bind(config).await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, state).await {
            tracing::error!(error = %e, "Server exited with error");
        }
    });

    tracing::info!(%addr, "Server spawned on background task");
    Ok((addr, handle))
}
