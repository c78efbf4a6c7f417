//! Prometheus Metrics
//!
//! Installs the Prometheus recorder behind the `metrics` facade and serves
//! the rendered exposition at `GET /metrics`.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use dfir_agent::metrics as names;

use crate::state::AppState;

/// Install the global recorder
///
/// Returns None when a recorder is already installed (tests building several
/// routers in one process); recording then goes to that recorder instead.
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            describe();
            tracing::info!("Prometheus metrics recorder installed");
            Some(handle)
        },
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        },
    }
}

fn describe() {
    metrics::describe_counter!(names::QUERIES_TOTAL, "Queries answered, by confidence level");
    metrics::describe_histogram!(
        names::QUERY_LATENCY_MS,
        Unit::Milliseconds,
        "End-to-end query latency"
    );
    metrics::describe_counter!(
        names::GENERATION_RETRIES_TOTAL,
        "Structured generation attempts beyond the first"
    );
    metrics::describe_counter!(
        names::INVALID_COMMANDS_TOTAL,
        "Generated commands that failed registry validation"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Request errors, by kind");
    metrics::describe_counter!(names::DOCUMENTS_INGESTED_TOTAL, "Documents ingested");
}

pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "# metrics disabled\n".to_string(),
        ),
    }
}
