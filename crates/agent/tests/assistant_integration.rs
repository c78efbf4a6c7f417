//! End-to-end query handling with in-memory index, scripted LLM and memory audit log

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use dfir_agent::{Assistant, AssistantComponents, DfirAssistant, ResponseFormatter};
use dfir_core::{
    cancel_pair, CancelToken, ConfidenceLevel, Document, Error, Outcome, ResponseBody, UserMessage,
    INSUFFICIENT_INFORMATION, LOW_CONFIDENCE_DISCLAIMER, UNVERIFIED_COMMANDS_DISCLAIMER,
};
use dfir_llm::{IntentSchemas, ScriptedBackend, StructuredGenerator};
use dfir_persistence::{AuditLog, MemoryAuditLog};
use dfir_rag::{
    ConfidenceScorer, ContextBuilder, ContextualPrefixer, DocumentChunker, Embedder,
    HybridRetriever, IngestionPipeline, KnowledgeIndex, LexicalReranker, MemoryVectorIndex,
    QueryAnalyzer, RagError, RetrieverConfig, SimpleEmbedder, SparseConfig, SparseIndex,
};
use dfir_validation::{CommandValidator, PluginRegistry};

const DIM: usize = 256;
const QUERY: &str = "What Volatility command lists processes?";

const PROCESSES_CHAPTER: &str = "# Processes\n\n\
The windows.pslist plugin lists processes by walking the doubly linked list of EPROCESS \
structures.\n\n\
```\n\
vol -f dump.mem windows.pslist\n\
```";

const TOOL_ANSWER: &str = r#"{
    "summary": "Use pslist to list processes",
    "commands": [
        {"command": "vol -f dump.mem windows.pslist", "purpose": "Walk the active process list"},
        {"command": "vol -f dump.mem windows.pzlist", "purpose": "Cross-check"}
    ]
}"#;

const REGISTRY: &str = r#"{"plugins": {
    "windows.pslist": {"version": ["vol3"], "description": "List processes"},
    "windows.psscan": {"version": ["vol3"]},
    "windows.malfind": {"version": ["vol3"]}
}}"#;

struct Harness {
    assistant: DfirAssistant,
    backend: Arc<ScriptedBackend>,
    audit: Arc<MemoryAuditLog>,
}

/// Fails every call, like an unreachable embedding service
struct UnreachableEmbedder;

#[async_trait]
impl Embedder for UnreachableEmbedder {
    fn model_id(&self) -> &str {
        SimpleEmbedder::MODEL_ID
    }

    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
        Err(RagError::Connection("connection refused".into()))
    }
}

/// Thresholds that let a single matching chunk through the gate
fn lenient() -> ConfidenceScorer {
    ConfidenceScorer::new(0.01, 0.95, 5)
}

fn harness(backend: ScriptedBackend, scorer: ConfidenceScorer) -> Harness {
    harness_with(backend, scorer, Arc::new(SimpleEmbedder::new(DIM)))
}

fn harness_with(
    backend: ScriptedBackend,
    scorer: ConfidenceScorer,
    query_embedder: Arc<dyn Embedder>,
) -> Harness {
    let index = Arc::new(
        KnowledgeIndex::open(
            Arc::new(MemoryVectorIndex::new()),
            SparseIndex::new(SparseConfig::default()).unwrap(),
            None,
        )
        .unwrap(),
    );
    let registry = Arc::new(PluginRegistry::from_json(REGISTRY).unwrap());
    let backend = Arc::new(backend);
    let audit = Arc::new(MemoryAuditLog::new());

    let assistant = DfirAssistant::new(AssistantComponents {
        analyzer: QueryAnalyzer::with_plugin_keywords(registry.keywords()),
        retriever: HybridRetriever::new(
            RetrieverConfig::default(),
            query_embedder,
            index.clone(),
            Arc::new(LexicalReranker::new()),
        ),
        scorer,
        context_builder: ContextBuilder::default(),
        generator: StructuredGenerator::new(
            backend.clone(),
            Arc::new(IntentSchemas::new().unwrap()),
            2,
        ),
        validator: CommandValidator::new(registry),
        ingestion: Some(IngestionPipeline::new(
            DocumentChunker::default(),
            ContextualPrefixer::default(),
            Arc::new(SimpleEmbedder::new(DIM)),
            index,
        )),
        audit: Some(audit.clone() as Arc<dyn AuditLog>),
    });

    Harness {
        assistant,
        backend,
        audit,
    }
}

fn processes_doc() -> Document {
    Document::new("aomf", "The Art of Memory Forensics", PROCESSES_CHAPTER).with_chapter("Processes")
}

#[tokio::test]
async fn test_empty_index_answers_insufficient_information() {
    let h = harness(ScriptedBackend::new(vec![TOOL_ANSWER]), ConfidenceScorer::default());

    let response = h
        .assistant
        .answer(Uuid::new_v4(), QUERY, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(response.confidence.level, ConfidenceLevel::Low);
    assert_eq!(response.outcome, Outcome::LowConfidence);
    assert!(response.answer.starts_with(INSUFFICIENT_INFORMATION));
    assert_eq!(response.disclaimer.as_deref(), Some(LOW_CONFIDENCE_DISCLAIMER));
    assert!(response.citations.is_empty());
    assert_eq!(h.backend.calls(), 0);

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, Outcome::LowConfidence);
    assert_eq!(entries[0].level, Some(ConfidenceLevel::Low));
}

#[tokio::test]
async fn test_weak_match_never_reaches_generation() {
    let h = harness(ScriptedBackend::new(vec![TOOL_ANSWER]), ConfidenceScorer::default());
    h.assistant.ingest(&processes_doc()).await.unwrap();

    let response = h
        .assistant
        .answer(Uuid::new_v4(), QUERY, CancelToken::never())
        .await
        .unwrap();

    // One chunk cannot fill the top-5 average
    assert!(response.confidence.is_low());
    assert_eq!(h.backend.calls(), 0);
    match response.body {
        Some(ResponseBody::InsufficientInformation { ref related_topics }) => {
            assert_eq!(related_topics, &vec!["The Art of Memory Forensics › Processes".to_string()]);
        }
        ref other => panic!("unexpected body {:?}", other),
    }
    assert!(response.answer.contains("The Art of Memory Forensics › Processes"));
}

#[tokio::test]
async fn test_answer_annotates_commands() {
    let h = harness(ScriptedBackend::new(vec![TOOL_ANSWER]), lenient());
    h.assistant.ingest(&processes_doc()).await.unwrap();
    let request_id = Uuid::new_v4();

    let response = h
        .assistant
        .answer(request_id, QUERY, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(response.request_id, request_id);
    assert_eq!(response.outcome, Outcome::Answered);
    assert_eq!(response.confidence.level, ConfidenceLevel::Medium);
    assert!(matches!(response.body, Some(ResponseBody::ToolCommand(_))));
    assert_eq!(h.backend.calls(), 1);

    assert_eq!(response.validation.total, 2);
    assert_eq!(response.validation.invalid, 1);
    let typo = response.commands.iter().find(|c| !c.is_valid).unwrap();
    assert_eq!(typo.plugin, "windows.pzlist");
    assert_eq!(typo.suggestion.as_deref(), Some("windows.pslist"));
    assert!(response.answer.contains("vol -f dump.mem windows.pzlist"));
    assert_eq!(response.disclaimer.as_deref(), Some(UNVERIFIED_COMMANDS_DISCLAIMER));

    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].title, "The Art of Memory Forensics");

    let prompt = &h.backend.requests()[0];
    assert!(prompt.iter().any(|m| m.content.contains("## Sources")));
    assert_eq!(prompt.last().unwrap().content, QUERY);

    let entry = &h.audit.entries()[0];
    assert_eq!(entry.request_id, request_id);
    assert_eq!(entry.commands.len(), 2);
    assert_eq!(entry.response, response.answer);

    let markdown = ResponseFormatter::new().render(&response);
    assert!(markdown.starts_with("🟡 Medium Confidence"));
    assert!(markdown.contains("⚠️ *1/2 commands verified*"));
}

#[tokio::test]
async fn test_schema_exhaustion_gives_generation_failure_message() {
    let h = harness(ScriptedBackend::new(vec!["not json", "still not", "{}"]), lenient());
    h.assistant.ingest(&processes_doc()).await.unwrap();

    let response = h
        .assistant
        .answer(Uuid::new_v4(), QUERY, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(h.backend.calls(), 3);
    assert_eq!(response.outcome, Outcome::GenerationFailed);
    assert_eq!(response.answer, UserMessage::GenerationFailed.render());
    assert!(response.body.is_none());
    assert!(response.commands.is_empty());
    assert_eq!(h.audit.entries()[0].error_kind.as_deref(), Some("generation"));
}

#[tokio::test]
async fn test_retrieval_failure_falls_back_to_insufficient_information() {
    let h = harness_with(
        ScriptedBackend::new(vec![TOOL_ANSWER]),
        lenient(),
        Arc::new(UnreachableEmbedder),
    );

    let response = h
        .assistant
        .answer(Uuid::new_v4(), QUERY, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(response.outcome, Outcome::RetrievalFailed);
    assert!(response.answer.starts_with(INSUFFICIENT_INFORMATION));
    assert!(!response.answer.contains("connection refused"));
    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.audit.entries()[0].error_kind.as_deref(), Some("retrieval"));
}

#[tokio::test]
async fn test_embedding_model_mismatch_is_fatal() {
    let h = harness_with(
        ScriptedBackend::new(vec![TOOL_ANSWER]),
        lenient(),
        Arc::new(SimpleEmbedder::with_model_id("another-model", DIM)),
    );
    h.assistant.ingest(&processes_doc()).await.unwrap();

    let err = h
        .assistant
        .answer(Uuid::new_v4(), QUERY, CancelToken::never())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "configuration");
    assert_eq!(h.backend.calls(), 0);
    let entry = &h.audit.entries()[0];
    assert_eq!(entry.outcome, Outcome::RetrievalFailed);
    assert_eq!(entry.error_kind.as_deref(), Some("configuration"));
}

#[tokio::test]
async fn test_cancel_during_generation() {
    let h = harness(
        ScriptedBackend::new(vec![TOOL_ANSWER]).with_delay(Duration::from_secs(30)),
        lenient(),
    );
    h.assistant.ingest(&processes_doc()).await.unwrap();

    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let err = h
        .assistant
        .answer(Uuid::new_v4(), QUERY, token)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(h.backend.calls(), 1);
    let entry = &h.audit.entries()[0];
    assert_eq!(entry.outcome, Outcome::Cancelled);
    assert_eq!(entry.error_kind.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn test_stream_forwards_model_tokens() {
    let h = harness(ScriptedBackend::new(vec![TOOL_ANSWER]), lenient());
    h.assistant.ingest(&processes_doc()).await.unwrap();

    let (tx, mut rx) = mpsc::channel(256);
    let response = h
        .assistant
        .answer_stream(Uuid::new_v4(), QUERY, tx, CancelToken::never())
        .await
        .unwrap();

    let mut streamed = String::new();
    while let Some(token) = rx.recv().await {
        streamed.push_str(&token);
    }
    assert_eq!(streamed, TOOL_ANSWER);
    assert_eq!(response.validation.total, 2);
}

#[tokio::test]
async fn test_stream_receives_low_confidence_text() {
    let h = harness(ScriptedBackend::new(Vec::<String>::new()), ConfidenceScorer::default());

    let (tx, mut rx) = mpsc::channel(8);
    let response = h
        .assistant
        .answer_stream(Uuid::new_v4(), "prefetch timestamps", tx, CancelToken::never())
        .await
        .unwrap();

    assert_eq!(rx.recv().await.unwrap(), response.answer);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_readiness_reports_documents() {
    let h = harness(ScriptedBackend::new(Vec::<String>::new()), ConfidenceScorer::default());
    h.assistant.ingest(&processes_doc()).await.unwrap();

    let readiness = h.assistant.readiness().await;
    assert!(readiness.llm);
    assert!(readiness.index);
    assert_eq!(readiness.documents, 1);
    assert_eq!(h.assistant.index_stats().await.unwrap().documents, 1);
}
