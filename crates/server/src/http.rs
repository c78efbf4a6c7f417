//! HTTP Endpoints
//!
//! REST API for the DFIR assistant.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Json, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, OwnedSemaphorePermit};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use dfir_core::{AssistantResponse, CancelToken, Document, Error};
use dfir_rag::{IndexStats, IngestReport};

use crate::auth::auth_middleware;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::ServerError;

/// Token channel depth for streamed answers
const STREAM_BUFFER: usize = 64;

const DEFAULT_ORIGIN: &str = "http://localhost:3000";

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let timeout = Duration::from_secs(server.timeout_seconds.max(1));

    Router::new()
        // Queries
        .route("/api/query", post(query))
        .route("/api/query/stream", post(query_stream))
        .route("/api/query/:request_id/cancel", post(cancel_query))
        // Knowledge base
        .route("/api/ingest", post(ingest))
        .route("/api/index/stats", get(index_stats))
        // Health check
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // Prometheus metrics
        .route("/metrics", get(metrics_handler))
        // Middleware (auth runs after CORS and tracing, before handlers)
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - If cors_origins is empty or all invalid, allows localhost:3000 only
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins (NOT FOR PRODUCTION)");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        if !origins.is_empty() {
            tracing::error!("All configured CORS origins are invalid, falling back to localhost");
        } else {
            tracing::info!("No CORS origins configured, defaulting to {}", DEFAULT_ORIGIN);
        }
        return CorsLayer::new()
            .allow_origin(HeaderValue::from_static(DEFAULT_ORIGIN))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);
    }

    tracing::info!("CORS configured with {} origins", parsed_origins.len());
    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Query request
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Client-chosen id, needed to cancel the request later
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

impl QueryRequest {
    fn validated(self) -> Result<(Uuid, String), ServerError> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(ServerError::InvalidRequest("query must not be empty".into()));
        }
        Ok((self.request_id.unwrap_or_else(Uuid::new_v4), query.to_string()))
    }
}

/// Query response
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub response: AssistantResponse,
    /// Chat-ready rendering with confidence indicator and sources
    pub markdown: String,
}

/// Wait for a query slot, giving up if the request is cancelled meanwhile
async fn acquire_permit(state: &AppState, cancel: &CancelToken) -> Result<OwnedSemaphorePermit, Error> {
    let permits = state.query_permits.clone();
    cancel
        .run(async move {
            permits
                .acquire_owned()
                .await
                .map_err(|_| Error::Configuration("query semaphore closed".into()))
        })
        .await
}

/// Answer a query
async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ServerError> {
    let (request_id, query) = request.validated()?;
    let (_guard, cancel) = state.begin(request_id)?;
    let _permit = acquire_permit(&state, &cancel).await?;

    let response = state.assistant.answer(request_id, &query, cancel).await?;
    let markdown = state.formatter.render(&response);
    Ok(Json(QueryResponse { response, markdown }))
}

/// Answer a query as server-sent events
///
/// Emits `token` events while the model generates, then one `response`
/// event carrying the annotated [`QueryResponse`], or an `error` event.
/// Closing the connection cancels the request.
async fn query_stream(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
    let (request_id, query) = request.validated()?;
    let (guard, cancel) = state.begin(request_id)?;

    let (tx, mut rx) = mpsc::channel::<String>(STREAM_BUFFER);
    let worker_state = state.clone();
    let worker = tokio::spawn(async move {
        let _permit = acquire_permit(&worker_state, &cancel).await?;
        worker_state
            .assistant
            .answer_stream(request_id, &query, tx, cancel)
            .await
    });

    let stream = async_stream::stream! {
        // Dropping the stream drops the guard, which cancels the worker
        let _guard = guard;
        while let Some(token) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().event("token").data(token));
        }

        let outcome = match worker.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Streaming worker panicked");
                Err(Error::Generation("streaming worker failed".into()))
            },
        };
        let event = match outcome {
            Ok(response) => {
                let markdown = state.formatter.render(&response);
                Event::default()
                    .event("response")
                    .json_data(QueryResponse { response, markdown })
                    .unwrap_or_else(|e| error_event(&Error::Generation(e.to_string())))
            },
            Err(err) => error_event(&err),
        };
        yield Ok::<_, Infallible>(event);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn error_event(err: &Error) -> Event {
    let body = serde_json::json!({
        "error": err.user_message().render(),
        "kind": err.kind(),
    });
    Event::default().event("error").data(body.to_string())
}

/// Cancel an in-flight query
async fn cancel_query(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), ServerError> {
    if !state.cancel(&request_id) {
        return Err(ServerError::NotFound(format!("no in-flight request {}", request_id)));
    }
    tracing::info!(request_id = %request_id, "Cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "request_id": request_id, "cancelled": true })),
    ))
}

/// Ingest request
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub document: Document,
}

/// Ingest one document into the knowledge base
async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestReport>, ServerError> {
    let document = request.document;
    if document.id.trim().is_empty() {
        return Err(ServerError::InvalidRequest("document id must not be empty".into()));
    }
    if document.text.trim().is_empty() {
        return Err(ServerError::InvalidRequest("document text must not be empty".into()));
    }

    let report = state.assistant.ingest(&document).await?;
    Ok(Json(report))
}

async fn index_stats(State(state): State<AppState>) -> Result<Json<IndexStats>, ServerError> {
    Ok(Json(state.assistant.index_stats().await?))
}

/// Liveness: the process is up and serving
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "inflight": state.inflight_count(),
    }))
}

/// Readiness: the LLM and the index both respond
async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let readiness = state.assistant.readiness().await;
    let mut checks = serde_json::Map::new();

    checks.insert(
        "llm".to_string(),
        serde_json::json!({ "status": if readiness.llm { "ok" } else { "unavailable" } }),
    );
    checks.insert(
        "index".to_string(),
        serde_json::json!({
            "status": if readiness.index { "ok" } else { "unavailable" },
            "documents": readiness.documents,
        }),
    );
    if readiness.documents == 0 {
        // Every query will come back LOW until something is ingested
        checks.insert("corpus".to_string(), serde_json::json!({ "status": "empty" }));
    }

    let status = if readiness.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if readiness.is_ready() { "ready" } else { "not_ready" },
            "checks": checks,
        })),
    )
}
