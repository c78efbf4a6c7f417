//! Knowledge index
//!
//! Couples the dense index, the sparse index and a manifest recording which
//! embedding model built them. Ingestion is exclusive; queries may run
//! concurrently with it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use dfir_core::{Chunk, Document, SourceType};

use crate::sparse_search::SparseIndex;
use crate::vector_store::DenseIndex;
use crate::RagError;

/// Per-document bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub title: String,
    pub source_type: SourceType,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
    /// First-ingestion order, kept across re-ingestion
    pub order: u64,
}

/// What the index was built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub documents: BTreeMap<String, DocumentEntry>,
    #[serde(default)]
    pub next_order: u64,
}

impl IndexManifest {
    pub fn new(embedding_model: impl Into<String>, dimension: usize) -> Self {
        let now = Utc::now();
        Self {
            embedding_model: embedding_model.into(),
            dimension,
            created_at: now,
            updated_at: now,
            documents: BTreeMap::new(),
            next_order: 0,
        }
    }

    pub fn load(path: &Path) -> Result<Option<Self>, RagError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                RagError::Index(format!("Malformed manifest {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RagError::Index(format!(
                "Cannot read manifest {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RagError::Index(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(self).map_err(|e| RagError::Index(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| RagError::Index(e.to_string()))
    }

    /// Refuse a model or dimension other than the one the index was built with
    pub fn check(&self, model_id: &str, dimension: usize) -> Result<(), RagError> {
        if self.embedding_model != model_id || self.dimension != dimension {
            return Err(RagError::ModelMismatch {
                expected: format!("{} ({}d)", self.embedding_model, self.dimension),
                actual: format!("{} ({}d)", model_id, dimension),
            });
        }
        Ok(())
    }
}

/// Snapshot for health and admin endpoints
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub backend: &'static str,
    pub documents: usize,
    pub chunks: usize,
    pub sparse_docs: u64,
    pub embedding_model: Option<String>,
    pub dimension: Option<usize>,
}

pub struct KnowledgeIndex {
    dense: Arc<dyn DenseIndex>,
    sparse: Arc<SparseIndex>,
    manifest: RwLock<Option<IndexManifest>>,
    manifest_path: Option<PathBuf>,
    ingest_lock: Mutex<()>,
}

impl KnowledgeIndex {
    /// Open with an existing manifest if one is on disk
    pub fn open(
        dense: Arc<dyn DenseIndex>,
        sparse: SparseIndex,
        manifest_path: Option<PathBuf>,
    ) -> Result<Self, RagError> {
        let manifest = match manifest_path {
            Some(ref path) => IndexManifest::load(path)?,
            None => None,
        };

        if let Some(ref m) = manifest {
            tracing::info!(
                model = %m.embedding_model,
                dimension = m.dimension,
                documents = m.documents.len(),
                "Loaded index manifest"
            );
        }

        Ok(Self {
            dense,
            sparse: Arc::new(sparse),
            manifest: RwLock::new(manifest),
            manifest_path,
            ingest_lock: Mutex::new(()),
        })
    }

    /// Open and verify the manifest against the configured embedder
    pub fn open_for(
        dense: Arc<dyn DenseIndex>,
        sparse: SparseIndex,
        manifest_path: Option<PathBuf>,
        model_id: &str,
        dimension: usize,
    ) -> Result<Self, RagError> {
        let index = Self::open(dense, sparse, manifest_path)?;
        index.check_model(model_id, dimension)?;
        Ok(index)
    }

    /// An index without a manifest accepts any model
    pub fn check_model(&self, model_id: &str, dimension: usize) -> Result<(), RagError> {
        match self.manifest.read().as_ref() {
            Some(manifest) => manifest.check(model_id, dimension),
            None => Ok(()),
        }
    }

    pub fn dense(&self) -> &Arc<dyn DenseIndex> {
        &self.dense
    }

    /// Shared handle; BM25 search runs on the blocking pool
    pub fn sparse(&self) -> &Arc<SparseIndex> {
        &self.sparse
    }

    pub fn manifest(&self) -> Option<IndexManifest> {
        self.manifest.read().clone()
    }

    pub fn document_count(&self) -> usize {
        self.manifest
            .read()
            .as_ref()
            .map(|m| m.documents.len())
            .unwrap_or(0)
    }

    /// Ingestion order of a document; unknown documents sort last
    pub fn document_order(&self, document_id: &str) -> u64 {
        self.manifest
            .read()
            .as_ref()
            .and_then(|m| m.documents.get(document_id))
            .map(|d| d.order)
            .unwrap_or(u64::MAX)
    }

    /// Replace all chunks of `document` with `chunks`
    ///
    /// Returns how many chunks the previous ingestion had.
    pub async fn ingest(
        &self,
        document: &Document,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
        model_id: &str,
        dimension: usize,
    ) -> Result<usize, RagError> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::Index(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let _guard = self.ingest_lock.lock().await;
        self.check_model(model_id, dimension)?;

        self.dense.ensure_ready(dimension).await?;
        self.dense.delete_document(&document.id).await?;
        self.dense.upsert(chunks, embeddings).await?;
        self.sparse.replace_document(&document.id, chunks)?;

        let replaced = {
            let mut guard = self.manifest.write();
            let manifest = guard.get_or_insert_with(|| IndexManifest::new(model_id, dimension));
            let previous = manifest.documents.get(&document.id).cloned();
            let order = match previous {
                Some(ref entry) => entry.order,
                None => {
                    manifest.next_order += 1;
                    manifest.next_order - 1
                }
            };
            manifest.documents.insert(
                document.id.clone(),
                DocumentEntry {
                    title: document.title.clone(),
                    source_type: document.source_type,
                    chunk_count: chunks.len(),
                    ingested_at: Utc::now(),
                    order,
                },
            );
            manifest.updated_at = Utc::now();

            if let Some(ref path) = self.manifest_path {
                manifest.save(path)?;
            }
            previous.map(|p| p.chunk_count).unwrap_or(0)
        };

        tracing::info!(
            document = %document.id,
            chunks = chunks.len(),
            replaced,
            "Indexed document"
        );
        Ok(replaced)
    }

    /// Remove a document from both indexes and the manifest
    pub async fn remove_document(&self, document_id: &str) -> Result<bool, RagError> {
        let _guard = self.ingest_lock.lock().await;
        self.dense.delete_document(document_id).await?;
        self.sparse.delete_document(document_id)?;

        let mut guard = self.manifest.write();
        let removed = match guard.as_mut() {
            Some(manifest) => {
                let removed = manifest.documents.remove(document_id).is_some();
                manifest.updated_at = Utc::now();
                if let Some(ref path) = self.manifest_path {
                    manifest.save(path)?;
                }
                removed
            }
            None => false,
        };
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<IndexStats, RagError> {
        let vectors = self.dense.count().await?;
        let manifest = self.manifest.read();
        Ok(IndexStats {
            backend: self.dense.name(),
            documents: manifest.as_ref().map(|m| m.documents.len()).unwrap_or(0),
            chunks: vectors as usize,
            sparse_docs: self.sparse.doc_count(),
            embedding_model: manifest.as_ref().map(|m| m.embedding_model.clone()),
            dimension: manifest.as_ref().map(|m| m.dimension),
        })
    }

    pub async fn health_check(&self) -> Result<(), RagError> {
        self.dense.health_check().await
    }
}
