//! Error types for the HTTP surface.
//!
//! [`ObserverError`] converts into an Axum response with a JSON body of
//! the form `{"error": ..., "status": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fleetcast_core::{SourceError, ViewGenerationError};

/// Errors that can occur while serving a REST request.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A collaborator could not be read right now.
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl From<ViewGenerationError> for ObserverError {
    fn from(e: ViewGenerationError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl From<SourceError> for ObserverError {
    fn from(e: SourceError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
