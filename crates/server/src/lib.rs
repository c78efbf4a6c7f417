//! DFIR Assistant Server
//!
//! HTTP API in front of the query orchestrator.

pub mod auth;
pub mod http;
pub mod metrics;
pub mod state;

pub use auth::auth_middleware;
pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler};
pub use state::{AppState, InflightGuard};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Assistant(#[from] dfir_core::Error),
}

/// nginx's "client closed request"; the closest fit for a cancelled query
const CLIENT_CLOSED_REQUEST: u16 = 499;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        use dfir_core::Error;
        match self {
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Assistant(err) => match err {
                Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
                Error::Retrieval(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Generation(_) => StatusCode::BAD_GATEWAY,
                Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                Error::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                    .unwrap_or(StatusCode::BAD_REQUEST),
                Error::Io(_) | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Kind label for logs, metrics and the response body
    pub fn kind(&self) -> &'static str {
        match self {
            ServerError::InvalidRequest(_) => "invalid_request",
            ServerError::Auth(_) => "auth",
            ServerError::NotFound(_) => "not_found",
            ServerError::Conflict(_) => "conflict",
            ServerError::Assistant(err) => err.kind(),
        }
    }
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        err.status()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Assistant errors never leak internals; only the fixed user message goes out
        let message = match &self {
            ServerError::Assistant(err) => {
                tracing::warn!(kind = err.kind(), error = %err, "Request failed");
                err.user_message().render()
            },
            other => other.to_string(),
        };
        (
            status,
            Json(serde_json::json!({
                "error": message,
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}
