//! REST endpoint handlers.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/api/health` | Liveness, subscriber count, unit count |
//! | `GET` | `/api/views/{view}` | One freshly generated view envelope |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse};
use fleetcast_core::RoundContext;
use fleetcast_types::{ViewEnvelope, ViewKind};
use serde::Serialize;

use crate::error::ObserverError;
use crate::state::AppState;

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server answers.
    pub status: &'static str,
    /// Registered subscribers.
    pub subscribers: usize,
    /// Units reported by the simulator.
    pub units: usize,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page with live counts and endpoint links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let subscribers = state.registry.len().await;
    let units = state
        .generator
        .unit_count()
        .map_or_else(|_| String::from("n/a"), |count| count.to_string());
    let started = state.started_at.to_rfc3339();
    let views = ViewKind::ALL
        .iter()
        .map(|kind| {
            let name = kind.wire_name();
            format!(r#"        <li><a href="/api/views/{name}">/api/views/{name}</a></li>"#)
        })
        .collect::<Vec<_>>()
        .join("\n");

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Fleetcast</title>
    <style>
        body {{
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }}
        h1 {{ color: #58a6ff; margin-bottom: 0.25rem; }}
        .subtitle {{ color: #8b949e; margin-top: 0; }}
        .metric {{
            display: inline-block;
            background: #161b22;
            border: 1px solid #30363d;
            border-radius: 6px;
            padding: 1rem 1.5rem;
            margin: 0.5rem 0.5rem 0.5rem 0;
        }}
        .metric .label {{ color: #8b949e; font-size: 0.85rem; }}
        .metric .value {{ color: #58a6ff; font-size: 1.5rem; font-weight: bold; }}
        a {{ color: #58a6ff; text-decoration: none; }}
        ul {{ list-style: none; padding: 0; }}
        li {{ padding: 0.3rem 0; }}
    </style>
</head>
<body>
    <h1>Fleetcast</h1>
    <p class="subtitle">Fleet state broadcast server, up since {started}</p>

    <div class="metric">
        <div class="label">Subscribers</div>
        <div class="value">{subscribers}</div>
    </div>
    <div class="metric">
        <div class="label">Units</div>
        <div class="value">{units}</div>
    </div>

    <h2>WebSocket</h2>
    <ul>
        <li><code>ws://host:port/ws</code> -- live view stream (send <code>ping</code> for <code>pong</code>)</li>
    </ul>

    <h2>API Endpoints</h2>
    <ul>
        <li><a href="/api/health">/api/health</a></li>
{views}
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /api/health
// ---------------------------------------------------------------------------

/// Report liveness with subscriber and unit counts.
///
/// # Errors
///
/// Returns [`ObserverError::Unavailable`] if the unit source cannot be
/// read right now.
pub async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ObserverError> {
    let units = state.generator.unit_count()?;
    Ok(Json(HealthResponse {
        status: "ok",
        subscribers: state.registry.len().await,
        units,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/views/{view}
// ---------------------------------------------------------------------------

/// Generate one view on demand and return it in the broadcast envelope.
///
/// On-demand reads have no previous round, so `responseTime` in the
/// metrics view is reported as zero.
///
/// # Errors
///
/// Returns [`ObserverError::NotFound`] for an unknown view name and
/// [`ObserverError::Unavailable`] if the view cannot be generated.
pub async fn get_view(
    State(state): State<Arc<AppState>>,
    Path(view): Path<String>,
) -> Result<Json<ViewEnvelope>, ObserverError> {
    let kind = ViewKind::from_wire_name(&view)
        .ok_or_else(|| ObserverError::NotFound(format!("unknown view: {view}")))?;
    let data = state.generator.generate(kind, &RoundContext::default())?;
    Ok(Json(ViewEnvelope::now(data)))
}
