//! Assistant trait for abstraction and testability
//!
//! The HTTP layer only sees `dyn Assistant`, so handlers can be exercised
//! against a stub without Ollama or Qdrant.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use dfir_core::{AssistantResponse, CancelToken, Document, Result};
use dfir_rag::{IndexStats, IngestReport};

/// Dependency check results for `/ready`
#[derive(Debug, Clone, Default, Serialize)]
pub struct Readiness {
    pub llm: bool,
    pub index: bool,
    pub documents: usize,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.llm && self.index
    }
}

#[async_trait]
pub trait Assistant: Send + Sync {
    /// Answer one query
    ///
    /// Low confidence, retrieval failures and generation failures all come
    /// back as `Ok` with the matching pre-approved message. Only
    /// misconfiguration and cancellation are errors.
    async fn answer(&self, request_id: Uuid, query: &str, cancel: CancelToken) -> Result<AssistantResponse>;

    /// Like [`answer`](Self::answer), forwarding raw model tokens to `tx` as they arrive
    async fn answer_stream(
        &self,
        request_id: Uuid,
        query: &str,
        tx: mpsc::Sender<String>,
        cancel: CancelToken,
    ) -> Result<AssistantResponse>;

    async fn ingest(&self, document: &Document) -> Result<IngestReport>;

    async fn index_stats(&self) -> Result<IndexStats>;

    async fn readiness(&self) -> Readiness;
}
