//! HTTP API tests against a stub assistant

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use dfir_agent::{Assistant, Readiness};
use dfir_config::Settings;
use dfir_core::{
    AssistantResponse, CancelToken, ConfidenceAssessment, Document, Error, Outcome, QueryIntent,
    Result, SearchWeights, ValidationSummary,
};
use dfir_rag::{IndexStats, IngestReport};
use dfir_server::{create_router, AppState};

const BLOCKING_QUERY: &str = "block until cancelled";

struct StubAssistant {
    ready: bool,
}

fn response_for(request_id: Uuid, query: &str) -> AssistantResponse {
    AssistantResponse {
        request_id,
        query: query.to_string(),
        intent: QueryIntent::Concept,
        answer: "**Process hollowing** replaces the image of a suspended process.".into(),
        body: None,
        citations: Vec::new(),
        confidence: ConfidenceAssessment::none(),
        weights: SearchWeights::DEFAULT,
        commands: Vec::new(),
        validation: ValidationSummary::from_commands(&[]),
        disclaimer: None,
        outcome: Outcome::Answered,
        context_trimmed: false,
        latency_ms: 3,
        timestamp: chrono::Utc::now(),
    }
}

#[async_trait]
impl Assistant for StubAssistant {
    async fn answer(&self, request_id: Uuid, query: &str, cancel: CancelToken) -> Result<AssistantResponse> {
        if query == BLOCKING_QUERY {
            cancel.cancelled().await;
            return Err(Error::Cancelled);
        }
        if query.contains("qdrant down") {
            return Err(Error::Retrieval("connection refused to 10.0.0.5:6333".into()));
        }
        Ok(response_for(request_id, query))
    }

    async fn answer_stream(
        &self,
        request_id: Uuid,
        query: &str,
        tx: mpsc::Sender<String>,
        _cancel: CancelToken,
    ) -> Result<AssistantResponse> {
        for token in ["Process ", "hollowing"] {
            let _ = tx.send(token.to_string()).await;
        }
        Ok(response_for(request_id, query))
    }

    async fn ingest(&self, _document: &Document) -> Result<IngestReport> {
        Err(Error::Configuration("Ingestion is not enabled".into()))
    }

    async fn index_stats(&self) -> Result<IndexStats> {
        Ok(IndexStats {
            backend: "memory",
            documents: 1,
            chunks: 4,
            sparse_docs: 4,
            embedding_model: Some("simple-hash-256".into()),
            dimension: Some(256),
        })
    }

    async fn readiness(&self) -> Readiness {
        Readiness {
            llm: self.ready,
            index: true,
            documents: 1,
        }
    }
}

fn state_with(settings: Settings, ready: bool) -> AppState {
    AppState::new(Arc::new(StubAssistant { ready }), settings)
}

fn test_app(ready: bool) -> (Router, AppState) {
    let state = state_with(Settings::default(), ready);
    (create_router(state.clone()), state)
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app(true);
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["inflight"], 0);
}

#[tokio::test]
async fn test_query_returns_response_and_markdown() {
    let (app, state) = test_app(true);
    let id = Uuid::new_v4();
    let response = app
        .oneshot(post_json(
            "/api/query",
            serde_json::json!({ "query": "What is process hollowing?", "request_id": id }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["response"]["request_id"], id.to_string());
    assert_eq!(body["response"]["outcome"], "answered");
    assert!(body["markdown"].as_str().unwrap().contains("Process hollowing"));
    // Guard released once the handler returns
    assert_eq!(state.inflight_count(), 0);
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let (app, _) = test_app(true);
    let response = app
        .oneshot(post_json("/api/query", serde_json::json!({ "query": "   " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "invalid_request");
}

#[tokio::test]
async fn test_retrieval_error_hides_internals() {
    let (app, _) = test_app(true);
    let response = app
        .oneshot(post_json("/api/query", serde_json::json!({ "query": "qdrant down?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "retrieval");
    let message = body["error"].as_str().unwrap();
    assert!(!message.contains("10.0.0.5"));
    assert!(message.contains(dfir_core::INSUFFICIENT_INFORMATION));
}

#[tokio::test]
async fn test_auth_required_except_public_paths() {
    let mut settings = Settings::default();
    settings.server.auth.enabled = true;
    settings.server.auth.api_key = Some("s3cret".into());
    let app = create_router(state_with(settings, true));

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(post_json("/api/query", serde_json::json!({ "query": "pslist?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json("/api/query", serde_json::json!({ "query": "pslist?" }));
    request
        .headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cret".parse().unwrap());
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_unknown_request_is_not_found() {
    let (app, _) = test_app(true);
    let uri = format!("/api/query/{}/cancel", Uuid::new_v4());
    let response = app.oneshot(post_json(&uri, serde_json::json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_in_flight_query() {
    let (app, state) = test_app(true);
    let id = Uuid::new_v4();

    let pending = tokio::spawn(app.clone().oneshot(post_json(
        "/api/query",
        serde_json::json!({ "query": BLOCKING_QUERY, "request_id": id }),
    )));

    for _ in 0..200 {
        if state.inflight_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(state.inflight_count(), 1);

    let uri = format!("/api/query/{}/cancel", id);
    let response = app.oneshot(post_json(&uri, serde_json::json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let cancelled = pending.await.unwrap().unwrap();
    assert_eq!(cancelled.status().as_u16(), 499);
    assert_eq!(body_json(cancelled).await["kind"], "cancelled");
    assert_eq!(state.inflight_count(), 0);
}

#[tokio::test]
async fn test_stream_emits_tokens_then_response() {
    let (app, _) = test_app(true);
    let response = app
        .oneshot(post_json(
            "/api/query/stream",
            serde_json::json!({ "query": "What is process hollowing?" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let first_token = text.find("event: token").unwrap();
    let final_event = text.find("event: response").unwrap();
    assert!(first_token < final_event);
    assert!(text.contains("data: hollowing"));
}

#[tokio::test]
async fn test_ingest_error_maps_to_status() {
    let (app, _) = test_app(true);
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/ingest",
            serde_json::json!({ "document": { "id": "", "title": "t", "text": "x" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/api/ingest",
            serde_json::json!({ "document": { "id": "amf-ch6", "title": "AMF", "text": "Processes..." } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["kind"], "configuration");
}

#[tokio::test]
async fn test_readiness_reflects_llm_availability() {
    let (app, _) = test_app(false);
    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["checks"]["llm"]["status"], "unavailable");
    assert_eq!(body["checks"]["index"]["documents"], 1);

    let (app, _) = test_app(true);
    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_index_stats() {
    let (app, _) = test_app(true);
    let response = app.oneshot(get("/api/index/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["chunks"], 4);
}
