//! Ingestion: chunk, prefix, check quality, embed, index

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use dfir_core::Document;

use crate::chunker::DocumentChunker;
use crate::embeddings::Embedder;
use crate::index::KnowledgeIndex;
use crate::prefixer::ContextualPrefixer;
use crate::quality::QualityReport;
use crate::RagError;

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks: usize,
    pub oversized_chunks: usize,
    pub quality: QualityReport,
    /// Chunks superseded from a previous ingestion of the same document
    pub replaced_chunks: usize,
    pub duration_ms: u64,
}

pub struct IngestionPipeline {
    chunker: DocumentChunker,
    prefixer: ContextualPrefixer,
    embedder: Arc<dyn Embedder>,
    index: Arc<KnowledgeIndex>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: DocumentChunker,
        prefixer: ContextualPrefixer,
        embedder: Arc<dyn Embedder>,
        index: Arc<KnowledgeIndex>,
    ) -> Self {
        Self {
            chunker,
            prefixer,
            embedder,
            index,
        }
    }

    pub fn index(&self) -> &Arc<KnowledgeIndex> {
        &self.index
    }

    pub async fn ingest(&self, document: &Document) -> Result<IngestReport, RagError> {
        let started = Instant::now();
        if document.id.trim().is_empty() {
            return Err(RagError::Chunking("Document id is empty".to_string()));
        }

        // Fail before any embedding work if the index belongs to another model
        self.index
            .check_model(self.embedder.model_id(), self.embedder.dimension())?;

        let mut chunks = self.chunker.chunk(document);
        self.prefixer.apply(&mut chunks);

        let quality = QualityReport::evaluate(&chunks);
        if !quality.passed {
            tracing::warn!(
                document = %document.id,
                average_score = quality.average_score,
                issues = quality.chunks_with_issues,
                "Chunk quality below threshold"
            );
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.index_text().to_string()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        let replaced_chunks = self
            .index
            .ingest(
                document,
                &chunks,
                &embeddings,
                self.embedder.model_id(),
                self.embedder.dimension(),
            )
            .await?;

        let report = IngestReport {
            document_id: document.id.clone(),
            chunks: chunks.len(),
            oversized_chunks: chunks.iter().filter(|c| c.oversized).count(),
            quality,
            replaced_chunks,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        tracing::info!(
            document = %report.document_id,
            chunks = report.chunks,
            oversized = report.oversized_chunks,
            replaced = report.replaced_chunks,
            quality = report.quality.average_score,
            duration_ms = report.duration_ms,
            "Ingested document"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::SimpleEmbedder;
    use crate::memory_store::MemoryVectorIndex;
    use crate::sparse_search::{SparseConfig, SparseIndex};

    fn pipeline() -> IngestionPipeline {
        let index = KnowledgeIndex::open(
            Arc::new(MemoryVectorIndex::new()),
            SparseIndex::new(SparseConfig::default()).unwrap(),
            None,
        )
        .unwrap();
        IngestionPipeline::new(
            DocumentChunker::default(),
            ContextualPrefixer::default(),
            Arc::new(SimpleEmbedder::default()),
            Arc::new(index),
        )
    }

    #[tokio::test]
    async fn test_report_counts() {
        let pipeline = pipeline();
        let doc = Document::new("aomf", "AOMF", "# Processes\n\nEPROCESS blocks link processes.");
        let first = pipeline.ingest(&doc).await.unwrap();
        assert_eq!(first.chunks, 1);
        assert_eq!(first.replaced_chunks, 0);
        assert!(first.quality.passed);

        let second = pipeline.ingest(&doc).await.unwrap();
        assert_eq!(second.replaced_chunks, 1);
    }

    #[tokio::test]
    async fn test_empty_id_rejected() {
        let err = pipeline()
            .ingest(&Document::new(" ", "T", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Chunking(_)));
    }
}
