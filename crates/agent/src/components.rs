//! Production wiring from [`Settings`]

use std::path::PathBuf;
use std::sync::Arc;

use dfir_config::{IndexBackend, IndexSettings, Settings};
use dfir_core::Result;
use dfir_llm::{IntentSchemas, LlmBackend, LlmConfig, OllamaBackend, StructuredGenerator};
use dfir_rag::{
    ChunkConfig, ConfidenceScorer, ContextBuilder, ContextualPrefixer, DenseIndex,
    DocumentChunker, Embedder, HybridRetriever, IngestionPipeline, KnowledgeIndex,
    LexicalReranker, MemoryVectorIndex, OllamaEmbedder, OllamaEmbeddingConfig, QdrantIndex,
    QueryAnalyzer, RetrieverConfig, SparseConfig, SparseIndex, VectorStoreConfig,
};
use dfir_validation::{CommandValidator, PluginRegistry};

use crate::assistant::{AssistantComponents, DfirAssistant};

/// Build the assistant against Ollama, the configured index and the plugin registry
///
/// A missing registry, an unreadable manifest or a manifest recorded for a
/// different embedding model are fatal here, before any query is served.
pub async fn build_assistant(settings: &Settings) -> Result<DfirAssistant> {
    let embedder: Arc<dyn Embedder> =
        Arc::new(OllamaEmbedder::new(OllamaEmbeddingConfig::from(&settings.embedding)));
    let index = Arc::new(open_index(&settings.index, embedder.as_ref())?);

    let registry = Arc::new(PluginRegistry::load(&settings.validation.registry_path)?);
    let validator = CommandValidator::new(registry.clone())
        .with_max_suggestion_distance(settings.validation.max_suggestion_distance);
    let analyzer = QueryAnalyzer::with_plugin_keywords(registry.keywords());

    let retriever = HybridRetriever::new(
        RetrieverConfig::from(&settings.retrieval),
        embedder.clone(),
        index.clone(),
        Arc::new(LexicalReranker::new()),
    );

    let backend: Arc<dyn LlmBackend> = Arc::new(OllamaBackend::new(LlmConfig::from(&settings.llm))?);
    let generator = StructuredGenerator::new(
        backend,
        Arc::new(IntentSchemas::new()?),
        settings.llm.structured_retries,
    );

    let ingestion = IngestionPipeline::new(
        DocumentChunker::new(ChunkConfig::from(&settings.chunking)),
        ContextualPrefixer::new(settings.chunking.include_page),
        embedder,
        index,
    );

    let audit = dfir_persistence::open(&settings.audit).await?;

    tracing::info!(
        llm = %settings.llm.model,
        embedding = %settings.embedding.model,
        backend = ?settings.index.backend,
        plugins = registry.len(),
        audit = audit.is_some(),
        "Assistant components ready"
    );

    Ok(DfirAssistant::new(AssistantComponents {
        analyzer,
        retriever,
        scorer: ConfidenceScorer::from(&settings.confidence),
        context_builder: ContextBuilder::from(&settings.context),
        generator,
        validator,
        ingestion: Some(ingestion),
        audit,
    }))
}

/// Dense + sparse index for the configured backend, checked against the embedder
pub fn open_index(settings: &IndexSettings, embedder: &dyn Embedder) -> Result<KnowledgeIndex> {
    let dense: Arc<dyn DenseIndex> = match settings.backend {
        IndexBackend::Qdrant => Arc::new(QdrantIndex::new(VectorStoreConfig::from_settings(
            settings,
            embedder.dimension(),
        ))?),
        IndexBackend::Memory => Arc::new(MemoryVectorIndex::new()),
    };
    // The in-memory backend keeps nothing on disk
    let (sparse_path, manifest_path) = match settings.backend {
        IndexBackend::Qdrant => (
            Some(settings.sparse_index_dir.clone()),
            Some(PathBuf::from(&settings.manifest_path)),
        ),
        IndexBackend::Memory => (None, None),
    };

    let sparse = SparseIndex::new(SparseConfig {
        index_path: sparse_path,
        ..SparseConfig::default()
    })?;

    Ok(KnowledgeIndex::open_for(
        dense,
        sparse,
        manifest_path,
        embedder.model_id(),
        embedder.dimension(),
    )?)
}
