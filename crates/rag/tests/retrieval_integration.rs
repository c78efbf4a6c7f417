//! End-to-end retrieval over in-memory and on-disk indexes

use std::sync::Arc;

use dfir_core::{ConfidenceLevel, Document, SearchWeights};
use dfir_rag::{
    ConfidenceScorer, ContextBuilder, ContextualPrefixer, DocumentChunker, Embedder,
    HybridRetriever, IngestionPipeline, KnowledgeIndex, LexicalReranker, MemoryVectorIndex,
    QueryAnalyzer, RagError, RetrieverConfig, SearchFilter, SimpleEmbedder, SparseConfig,
    SparseIndex,
};

const MALFIND_CHAPTER: &str = "# Code Injection\n\n\
Malfind scans process memory for VAD regions that are executable and private.\n\n\
```\n\
vol -f memory.raw windows.malfind --pid 1234\n\
vol -f memory.raw windows.malfind --dump\n\
```\n\n\
Review each hit for an MZ header or shellcode.";

fn memory_index() -> Arc<KnowledgeIndex> {
    Arc::new(
        KnowledgeIndex::open(
            Arc::new(MemoryVectorIndex::new()),
            SparseIndex::new(SparseConfig::default()).unwrap(),
            None,
        )
        .unwrap(),
    )
}

fn pipeline(index: Arc<KnowledgeIndex>, embedder: Arc<dyn Embedder>) -> IngestionPipeline {
    IngestionPipeline::new(
        DocumentChunker::default(),
        ContextualPrefixer::default(),
        embedder,
        index,
    )
}

fn retriever(index: Arc<KnowledgeIndex>, embedder: Arc<dyn Embedder>) -> HybridRetriever {
    HybridRetriever::new(
        RetrieverConfig::default(),
        embedder,
        index,
        Arc::new(LexicalReranker::new()),
    )
}

#[tokio::test]
async fn test_short_chapter_is_one_chunk_with_whole_code_block() {
    let embedder: Arc<dyn Embedder> = Arc::new(SimpleEmbedder::new(256));
    let index = memory_index();
    let doc = Document::new("aomf", "The Art of Memory Forensics", MALFIND_CHAPTER)
        .with_chapter("Code Injection");

    let report = pipeline(index.clone(), embedder.clone()).ingest(&doc).await.unwrap();
    assert_eq!(report.chunks, 1);
    assert_eq!(report.oversized_chunks, 0);

    let results = retriever(index, embedder)
        .search("windows.malfind dump", SearchWeights::COMMAND, &SearchFilter::default())
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].text.contains(
        "```\nvol -f memory.raw windows.malfind --pid 1234\nvol -f memory.raw windows.malfind --dump\n```"
    ));
}

#[tokio::test]
async fn test_reingestion_replaces_chunks() {
    let embedder: Arc<dyn Embedder> = Arc::new(SimpleEmbedder::new(256));
    let index = memory_index();
    let pipeline = pipeline(index.clone(), embedder);
    let doc = Document::new("aomf", "The Art of Memory Forensics", MALFIND_CHAPTER);

    let first = pipeline.ingest(&doc).await.unwrap();
    let second = pipeline.ingest(&doc).await.unwrap();
    assert_eq!(first.replaced_chunks, 0);
    assert_eq!(second.replaced_chunks, first.chunks);

    let stats = index.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, first.chunks);
    assert_eq!(stats.sparse_docs as usize, first.chunks);
}

#[tokio::test]
async fn test_case_variant_document_ids_keep_separate_chunks() {
    let embedder: Arc<dyn Embedder> = Arc::new(SimpleEmbedder::new(256));
    let index = memory_index();
    let pipeline = pipeline(index.clone(), embedder);

    let upper = pipeline
        .ingest(&Document::new("AOMF", "The Art of Memory Forensics", MALFIND_CHAPTER))
        .await
        .unwrap();
    let lower = pipeline
        .ingest(&Document::new("aomf", "AoMF field notes", "Run windows.pslist before windows.psscan."))
        .await
        .unwrap();
    assert_eq!(lower.replaced_chunks, 0);

    let stats = index.stats().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, upper.chunks + lower.chunks);
    assert_eq!(stats.sparse_docs as usize, upper.chunks + lower.chunks);

    // Removing one variant leaves the other intact
    index.remove_document("aomf").await.unwrap();
    let stats = index.stats().await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.chunks, upper.chunks);
}

#[tokio::test]
async fn test_model_mismatch_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = dir.path().join("index_manifest.json");

    let index = Arc::new(
        KnowledgeIndex::open(
            Arc::new(MemoryVectorIndex::new()),
            SparseIndex::new(SparseConfig::default()).unwrap(),
            Some(manifest.clone()),
        )
        .unwrap(),
    );
    let built_with: Arc<dyn Embedder> = Arc::new(SimpleEmbedder::new(256));
    pipeline(index, built_with)
        .ingest(&Document::new("aomf", "AoMF", MALFIND_CHAPTER))
        .await
        .unwrap();

    let err = match KnowledgeIndex::open_for(
        Arc::new(MemoryVectorIndex::new()),
        SparseIndex::new(SparseConfig::default()).unwrap(),
        Some(manifest),
        "mxbai-embed-large",
        1024,
    ) {
        Ok(_) => panic!("mismatched model accepted"),
        Err(e) => e,
    };
    assert!(matches!(err, RagError::ModelMismatch { .. }));
    assert_eq!(dfir_core::Error::from(err).kind(), "configuration");
}

#[tokio::test]
async fn test_command_query_uses_sparse_biased_weights() {
    let analysis = QueryAnalyzer::new().analyze("What Volatility command lists processes?");
    assert_eq!(analysis.weights, SearchWeights::COMMAND);
    assert!((analysis.weights.dense - 0.3).abs() < 1e-6);
    assert!((analysis.weights.sparse - 0.7).abs() < 1e-6);
}

#[tokio::test]
async fn test_empty_index_scores_low() {
    let embedder: Arc<dyn Embedder> = Arc::new(SimpleEmbedder::new(256));
    let index = memory_index();
    let results = retriever(index.clone(), embedder)
        .search("How do I detect process hollowing?", SearchWeights::BALANCED, &SearchFilter::default())
        .await
        .unwrap();
    assert!(results.is_empty());

    let confidence = ConfidenceScorer::default().assess(&results, index.document_count());
    assert_eq!(confidence.level, ConfidenceLevel::Low);
}

#[tokio::test]
async fn test_single_weak_document_scores_low() {
    let embedder: Arc<dyn Embedder> = Arc::new(SimpleEmbedder::new(256));
    let index = memory_index();
    pipeline(index.clone(), embedder.clone())
        .ingest(&Document::new("shellbags", "Registry Forensics", "Shellbags record folder access."))
        .await
        .unwrap();

    let results = retriever(index.clone(), embedder)
        .search("kernel callback rootkit", SearchWeights::DEFAULT, &SearchFilter::default())
        .await
        .unwrap();
    let confidence = ConfidenceScorer::default().assess(&results, index.document_count());
    assert_eq!(confidence.level, ConfidenceLevel::Low);
}

#[tokio::test]
async fn test_context_cites_retrieved_chunks() {
    let embedder: Arc<dyn Embedder> = Arc::new(SimpleEmbedder::new(256));
    let index = memory_index();
    pipeline(index.clone(), embedder.clone())
        .ingest(
            &Document::new("aomf", "The Art of Memory Forensics", MALFIND_CHAPTER)
                .with_chapter("Code Injection"),
        )
        .await
        .unwrap();

    let results = retriever(index, embedder)
        .search("malfind executable private VAD", SearchWeights::BALANCED, &SearchFilter::default())
        .await
        .unwrap();
    let context = ContextBuilder::default().build(&results);
    assert_eq!(context.included, results.len());
    assert!(context.text.starts_with("[Source 1: The Art of Memory Forensics | Chapter: Code Injection"));
    assert_eq!(context.citations[0].chunk_id, results[0].chunk_id);
}
