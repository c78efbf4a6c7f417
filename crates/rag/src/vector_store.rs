//! Vector Store using Qdrant
//!
//! Dense vector storage and similarity search. [`DenseIndex`] is the seam
//! between retrieval and the backend; [`QdrantIndex`] is the production
//! implementation and [`crate::MemoryVectorIndex`] the in-process one.

use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        value::Kind, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
        PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
    },
    Qdrant,
};
use std::collections::HashMap;
use uuid::Uuid;

use dfir_config::IndexSettings;
use dfir_core::{Chunk, SourceType};

use crate::RagError;

/// Restricts a search to part of the corpus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub source_type: Option<SourceType>,
    pub document_id: Option<String>,
}

impl SearchFilter {
    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    pub fn document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.source_type.map_or(true, |s| s == chunk.source_type)
            && self
                .document_id
                .as_ref()
                .map_or(true, |d| *d == chunk.document_id)
    }

    fn to_qdrant(&self) -> Option<Filter> {
        let mut conditions = Vec::new();
        if let Some(source_type) = self.source_type {
            conditions.push(Condition::matches(
                "source_type",
                source_type.as_str().to_string(),
            ));
        }
        if let Some(ref document_id) = self.document_id {
            conditions.push(Condition::matches("document_id", document_id.clone()));
        }
        if conditions.is_empty() {
            None
        } else {
            Some(Filter::must(conditions))
        }
    }
}

/// Dense hit; score is cosine similarity clamped to [0, 1]
#[derive(Debug, Clone)]
pub struct DenseHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Dense vector index backend
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    /// Create the collection if needed
    async fn ensure_ready(&self, dimension: usize) -> Result<(), RagError>;

    /// Insert or overwrite chunks; ids are deterministic so re-ingestion replaces
    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), RagError>;

    /// Nearest chunks by cosine similarity, best first
    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<DenseHit>, RagError>;

    /// Remove every chunk of a document
    async fn delete_document(&self, document_id: &str) -> Result<(), RagError>;

    /// Stored vectors
    async fn count(&self) -> Result<u64, RagError>;

    async fn health_check(&self) -> Result<(), RagError>;
}

/// Vector store configuration
#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    /// Qdrant endpoint
    pub endpoint: String,
    /// Collection name
    pub collection: String,
    /// Vector dimension
    pub vector_dim: usize,
    /// API key (optional)
    pub api_key: Option<String>,
}

impl VectorStoreConfig {
    pub fn from_settings(settings: &IndexSettings, vector_dim: usize) -> Self {
        Self {
            endpoint: settings.qdrant_endpoint.clone(),
            collection: settings.qdrant_collection.clone(),
            vector_dim,
            api_key: settings.qdrant_api_key.clone(),
        }
    }
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self::from_settings(
            &IndexSettings::default(),
            dfir_config::constants::models::EMBEDDING_DIM,
        )
    }
}

/// Stable Qdrant point id for a chunk id
pub fn point_id(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
}

/// Qdrant-backed dense index
pub struct QdrantIndex {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl QdrantIndex {
    pub fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
            tracing::info!("Qdrant connection using API key authentication");
        }

        let client = builder
            .build()
            .map_err(|e| RagError::Connection(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }
}

#[async_trait]
impl DenseIndex for QdrantIndex {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn ensure_ready(&self, dimension: usize) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::Connection(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                        VectorParamsBuilder::new(dimension as u64, Distance::Cosine),
                    ),
                )
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
            tracing::info!(
                collection = %self.config.collection,
                dimension,
                "Created Qdrant collection"
            );
        }

        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), RagError> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::VectorStore(
                "Chunk and embedding count mismatch".to_string(),
            ));
        }
        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, emb)| PointStruct::new(point_id(&chunk.id), emb.clone(), to_payload(chunk)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points).wait(true))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<DenseHit>, RagError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut search_builder =
            SearchPointsBuilder::new(&self.config.collection, vector.to_vec(), top_k as u64)
                .with_payload(true);

        if let Some(f) = filter.to_qdrant() {
            search_builder = search_builder.filter(f);
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| RagError::Search(e.to_string()))?;

        results
            .result
            .into_iter()
            .map(|point| {
                Ok(DenseHit {
                    chunk: from_payload(point.payload)?,
                    score: point.score.clamp(0.0, 1.0),
                })
            })
            .collect()
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), RagError> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.collection)
                    .points(Filter::must([Condition::matches(
                        "document_id",
                        document_id.to_string(),
                    )]))
                    .wait(true),
            )
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, RagError> {
        let info = self
            .client
            .collection_info(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(info
            .result
            .map(|r| r.points_count.unwrap_or(0))
            .unwrap_or(0))
    }

    async fn health_check(&self) -> Result<(), RagError> {
        self.client
            .health_check()
            .await
            .map(|_| ())
            .map_err(|e| RagError::Connection(e.to_string()))
    }
}

fn to_payload(chunk: &Chunk) -> HashMap<String, Value> {
    let mut payload: HashMap<String, Value> = HashMap::new();
    payload.insert("chunk_id".to_string(), chunk.id.clone().into());
    payload.insert("document_id".to_string(), chunk.document_id.clone().into());
    payload.insert("index".to_string(), (chunk.index as i64).into());
    payload.insert("title".to_string(), chunk.title.clone().into());
    payload.insert("source_type".to_string(), chunk.source_type.as_str().to_string().into());
    if let Some(ref chapter) = chunk.chapter {
        payload.insert("chapter".to_string(), chapter.clone().into());
    }
    if let Some(ref section) = chunk.section {
        payload.insert("section".to_string(), section.clone().into());
    }
    if let Some(page) = chunk.page {
        payload.insert("page".to_string(), (page as i64).into());
    }
    payload.insert("text".to_string(), chunk.raw_text.clone().into());
    payload.insert("prefixed_text".to_string(), chunk.prefixed_text.clone().into());
    payload.insert("token_count".to_string(), (chunk.token_count as i64).into());
    payload.insert("start".to_string(), (chunk.start as i64).into());
    payload.insert("end".to_string(), (chunk.end as i64).into());
    payload.insert("has_code".to_string(), chunk.has_code.into());
    payload.insert("has_table".to_string(), chunk.has_table.into());
    payload.insert("has_command".to_string(), chunk.has_command.into());
    payload.insert("oversized".to_string(), chunk.oversized.into());
    payload
}

fn from_payload(mut payload: HashMap<String, Value>) -> Result<Chunk, RagError> {
    let mut string = |key: &str| match payload.remove(key).and_then(|v| v.kind) {
        Some(Kind::StringValue(s)) => Some(s),
        _ => None,
    };

    let id = string("chunk_id")
        .ok_or_else(|| RagError::Search("Qdrant point without chunk_id".to_string()))?;
    let document_id = string("document_id").unwrap_or_default();
    let title = string("title").unwrap_or_default();
    let source_type = string("source_type")
        .and_then(|s| s.parse().ok())
        .unwrap_or_default();
    let chapter = string("chapter");
    let section = string("section");
    let raw_text = string("text").unwrap_or_default();
    let prefixed_text = string("prefixed_text").unwrap_or_default();

    let int = |key: &str| match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => Some(*n),
        Some(Kind::DoubleValue(n)) => Some(*n as i64),
        _ => None,
    };
    let flag = |key: &str| matches!(payload.get(key).and_then(|v| v.kind.as_ref()), Some(Kind::BoolValue(true)));

    Ok(Chunk {
        id,
        document_id,
        index: int("index").unwrap_or(0).max(0) as usize,
        title,
        source_type,
        chapter,
        section,
        page: int("page").map(|p| p.max(0) as u32),
        raw_text,
        prefixed_text,
        token_count: int("token_count").unwrap_or(0).max(0) as usize,
        start: int("start").unwrap_or(0).max(0) as usize,
        end: int("end").unwrap_or(0).max(0) as usize,
        has_code: flag("has_code"),
        has_table: flag("has_table"),
        has_command: flag("has_command"),
        oversized: flag("oversized"),
    })
}
