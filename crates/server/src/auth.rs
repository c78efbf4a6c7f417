//! API key authentication
//!
//! Accepts `Authorization: Bearer <key>` or `X-API-Key: <key>`. Paths listed in
//! `server.auth.public_paths` bypass the check.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;
use crate::ServerError;

pub async fn auth_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let auth = &state.config.server.auth;
    if !auth.enabled {
        return next.run(req).await;
    }

    let path = req.uri().path();
    if auth.public_paths.iter().any(|public| public == path) {
        return next.run(req).await;
    }

    let Some(expected) = auth.api_key.as_deref().filter(|key| !key.is_empty()) else {
        tracing::error!("Authentication enabled without an API key; rejecting request");
        return ServerError::Auth("server has no API key configured".into()).into_response();
    };

    match presented_key(req.headers()) {
        Some(key) if constant_time_eq(key.as_bytes(), expected.as_bytes()) => next.run(req).await,
        Some(_) => {
            tracing::warn!(path = %path, "Rejected request with invalid API key");
            ServerError::Auth("invalid API key".into()).into_response()
        },
        None => ServerError::Auth("missing API key".into()).into_response(),
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim());
        }
    }
    headers.get("x-api-key").and_then(|v| v.to_str().ok()).map(str::trim)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_and_header_keys() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(presented_key(&headers), Some("s3cret"));

        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("other"));
        assert_eq!(presented_key(&headers), Some("other"));

        assert_eq!(presented_key(&HeaderMap::new()), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
