//! Text Embeddings
//!
//! Generates dense embeddings for semantic search. The production path is
//! [`crate::OllamaEmbedder`]; [`SimpleEmbedder`] is a deterministic
//! bag-of-words embedder for tests and offline runs.

use async_trait::async_trait;

use crate::text;
use crate::RagError;

/// Embedding model behind the dense index
///
/// The model id is recorded in the index manifest; querying with a different
/// model is refused.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, e.g. `nomic-embed-text`
    fn model_id(&self) -> &str;

    /// Vector length
    fn dimension(&self) -> usize;

    /// Embed one document text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Embed many document texts, order preserved
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Embed a search query. Models with asymmetric prefixes override this.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        self.embed(query).await
    }
}

/// Hashing bag-of-words embedder (no model required)
///
/// Texts sharing content terms get high cosine similarity, which is enough
/// for exercising the hybrid pipeline end to end.
#[derive(Debug, Clone)]
pub struct SimpleEmbedder {
    model_id: String,
    dimension: usize,
}

impl SimpleEmbedder {
    pub const MODEL_ID: &'static str = "simple-hash-embedder";

    pub fn new(dimension: usize) -> Self {
        Self::with_model_id(Self::MODEL_ID, dimension)
    }

    /// Same vectors under a different model id (model-guard tests)
    pub fn with_model_id(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension: dimension.max(1),
        }
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for term in text::terms(text) {
            embedding[bucket(&term, self.dimension)] += 1.0;
        }

        normalize(&mut embedding);
        embedding
    }
}

impl Default for SimpleEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for SimpleEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        Ok(self.embed_sync(text))
    }
}

/// FNV-1a, stable across runs and platforms
fn bucket(term: &str, dimension: usize) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in term.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % dimension as u64) as usize
}

/// Scale to unit length in place; zero vectors stay zero
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity; 0.0 for mismatched or zero vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
