//! In-process dense index
//!
//! Brute-force cosine search over a map of chunk id to vector. Used by tests
//! and by deployments without Qdrant.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use dfir_core::Chunk;

use crate::embeddings::cosine_similarity;
use crate::vector_store::{DenseHit, DenseIndex, SearchFilter};
use crate::RagError;

#[derive(Default)]
pub struct MemoryVectorIndex {
    points: RwLock<HashMap<String, (Chunk, Vec<f32>)>>,
    dimension: RwLock<Option<usize>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DenseIndex for MemoryVectorIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_ready(&self, dimension: usize) -> Result<(), RagError> {
        let mut current = self.dimension.write();
        match *current {
            Some(existing) if existing != dimension => Err(RagError::VectorStore(format!(
                "Index dimension {} does not match {}",
                existing, dimension
            ))),
            _ => {
                *current = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<(), RagError> {
        if chunks.len() != embeddings.len() {
            return Err(RagError::VectorStore(
                "Chunk and embedding count mismatch".to_string(),
            ));
        }
        let dimension = *self.dimension.read();
        if let Some(dim) = dimension {
            if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
                return Err(RagError::VectorStore(format!(
                    "Vector length {} does not match index dimension {}",
                    bad.len(),
                    dim
                )));
            }
        }

        let mut points = self.points.write();
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            points.insert(chunk.id.clone(), (chunk.clone(), embedding.clone()));
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<Vec<DenseHit>, RagError> {
        let points = self.points.read();
        let mut hits: Vec<DenseHit> = points
            .values()
            .filter(|(chunk, _)| filter.matches(chunk))
            .map(|(chunk, embedding)| DenseHit {
                chunk: chunk.clone(),
                score: cosine_similarity(vector, embedding).clamp(0.0, 1.0),
            })
            .collect();

        // HashMap order is arbitrary; break ties on chunk id
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), RagError> {
        self.points
            .write()
            .retain(|_, (chunk, _)| chunk.document_id != document_id);
        Ok(())
    }

    async fn count(&self) -> Result<u64, RagError> {
        Ok(self.points.read().len() as u64)
    }

    async fn health_check(&self) -> Result<(), RagError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfir_core::Document;

    use crate::chunker::DocumentChunker;
    use crate::embeddings::SimpleEmbedder;

    fn chunk(id: &str, text: &str) -> Chunk {
        DocumentChunker::default()
            .chunk(&Document::new(id, id, text))
            .remove(0)
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let index = MemoryVectorIndex::new();
        let embedder = SimpleEmbedder::default();
        index.ensure_ready(256).await.unwrap();

        let chunks = vec![
            chunk("a", "malfind finds injected code"),
            chunk("b", "shellbags record folder access"),
        ];
        let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| embedder.embed_sync(&c.raw_text)).collect();
        index.upsert(&chunks, &vectors).await.unwrap();

        let hits = index
            .search(&embedder.embed_sync("injected code"), &SearchFilter::default(), 5)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.document_id, "a");
        assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    }

    #[tokio::test]
    async fn test_delete_document_and_count() {
        let index = MemoryVectorIndex::new();
        let c = chunk("a", "text");
        index.upsert(&[c.clone()], &[vec![1.0, 0.0]]).await.unwrap();
        index.upsert(&[c], &[vec![0.0, 1.0]]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);

        index.delete_document("a").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_guard() {
        let index = MemoryVectorIndex::new();
        index.ensure_ready(3).await.unwrap();
        assert!(index.ensure_ready(4).await.is_err());
        let c = chunk("a", "text");
        assert!(index.upsert(&[c], &[vec![1.0]]).await.is_err());
    }
}
