//! Retrieval for the DFIR assistant
//!
//! Features:
//! - Structure-aware chunking that keeps code blocks, tables and commands whole
//! - Contextual prefixes so chunks embed with their book/chapter/section
//! - Dense vector search via Qdrant (or in memory)
//! - Sparse BM25 search via Tantivy
//! - Hybrid fusion with query-dependent weights
//! - Lexical cross-encoder-style reranking
//! - Confidence scoring that gates generation
//! - Token-budgeted context assembly with citations
//! - Golden-dataset retrieval evaluation

pub mod chunker;
pub mod confidence;
pub mod context;
pub mod embeddings;
pub mod evaluation;
pub mod index;
pub mod ingest;
pub mod memory_store;
pub mod ollama_embeddings;
pub mod prefixer;
pub mod quality;
pub mod query_analyzer;
pub mod reranker;
pub mod retriever;
pub mod sparse_search;
pub mod text;
pub mod vector_store;

pub use chunker::{estimate_tokens, ChunkConfig, DocumentChunker};
pub use confidence::ConfidenceScorer;
pub use context::{BuiltContext, ContextBuilder, TrimmedChunk};
pub use embeddings::{Embedder, SimpleEmbedder};
pub use evaluation::{
    precision_at_k, recall_at_k, reciprocal_rank, DatasetStatistics, GoldenDataset, GoldenQuery,
    QueryEvaluation, RetrievalEvaluator, RetrievalReport,
};
pub use index::{DocumentEntry, IndexManifest, IndexStats, KnowledgeIndex};
pub use ingest::{IngestReport, IngestionPipeline};
pub use memory_store::MemoryVectorIndex;
pub use ollama_embeddings::{OllamaEmbedder, OllamaEmbeddingConfig};
pub use prefixer::ContextualPrefixer;
pub use quality::{IssueKind, QualityIssue, QualityReport};
pub use query_analyzer::{QueryAnalysis, QueryAnalyzer};
pub use reranker::{LexicalReranker, Reranker};
pub use retriever::{HybridRetriever, RetrieverConfig};
pub use sparse_search::{SparseConfig, SparseHit, SparseIndex};
pub use vector_store::{DenseHit, DenseIndex, QdrantIndex, SearchFilter, VectorStoreConfig};

use thiserror::Error;

/// RAG errors
#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Embedding model mismatch: index built with {expected}, got {actual}")]
    ModelMismatch { expected: String, actual: String },

    #[error("Chunking error: {0}")]
    Chunking(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl RagError {
    /// Network and timeout failures; worth a retry with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::Connection(_) | RagError::Timeout(_))
    }
}

impl From<RagError> for dfir_core::Error {
    fn from(err: RagError) -> Self {
        match err {
            RagError::ModelMismatch { .. } => dfir_core::Error::Configuration(err.to_string()),
            other => dfir_core::Error::Retrieval(other.to_string()),
        }
    }
}
