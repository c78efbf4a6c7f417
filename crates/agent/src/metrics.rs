//! Metric names and recording helpers
//!
//! Recorded through the `metrics` facade; the server installs the Prometheus
//! recorder. Without a recorder every call is a no-op.

use dfir_core::AssistantResponse;

pub const QUERIES_TOTAL: &str = "dfir_queries_total";
pub const QUERY_LATENCY_MS: &str = "dfir_query_latency_ms";
pub const GENERATION_RETRIES_TOTAL: &str = "dfir_generation_retries_total";
pub const INVALID_COMMANDS_TOTAL: &str = "dfir_invalid_commands_total";
pub const ERRORS_TOTAL: &str = "dfir_errors_total";
pub const DOCUMENTS_INGESTED_TOTAL: &str = "dfir_documents_ingested_total";

pub fn record_response(response: &AssistantResponse) {
    metrics::counter!(QUERIES_TOTAL, "confidence" => response.confidence.level.as_str()).increment(1);
    metrics::histogram!(QUERY_LATENCY_MS).record(response.latency_ms as f64);
    if response.validation.invalid > 0 {
        metrics::counter!(INVALID_COMMANDS_TOTAL).increment(response.validation.invalid as u64);
    }
}

pub fn record_error(kind: &'static str) {
    metrics::counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_retries(retries: u32) {
    if retries > 0 {
        metrics::counter!(GENERATION_RETRIES_TOTAL).increment(retries as u64);
    }
}

pub fn record_ingest() {
    metrics::counter!(DOCUMENTS_INGESTED_TOTAL).increment(1);
}
