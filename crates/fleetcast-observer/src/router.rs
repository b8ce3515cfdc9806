//! Axum router construction.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete router.
///
/// - `GET /` -- minimal HTML status page
/// - `GET /ws`, `GET /ws/fleet` -- `WebSocket` broadcast stream
/// - `GET /api/health` -- liveness with subscriber and unit counts
/// - `GET /api/views/{view}` -- one freshly generated view envelope
///
/// CORS allows any origin so a dashboard served elsewhere can connect.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::index))
        .route("/ws", get(ws::ws_fleet))
        .route("/ws/fleet", get(ws::ws_fleet))
        .route("/api/health", get(handlers::health))
        .route("/api/views/{view}", get(handlers::get_view))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
