//! Retrieval-side types: search results, weights, confidence

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::document::SourceType;

/// Dense/sparse weighting chosen by the query analyzer. Always sums to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchWeights {
    pub dense: f32,
    pub sparse: f32,
}

impl SearchWeights {
    pub const COMMAND: SearchWeights = SearchWeights { dense: 0.3, sparse: 0.7 };
    pub const BALANCED: SearchWeights = SearchWeights { dense: 0.5, sparse: 0.5 };
    pub const DEFAULT: SearchWeights = SearchWeights { dense: 0.4, sparse: 0.6 };

    /// Build from a dense weight; sparse is the complement
    pub fn from_dense(dense: f32) -> Self {
        let dense = dense.clamp(0.0, 1.0);
        Self {
            dense,
            sparse: 1.0 - dense,
        }
    }
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Ranked association between a query and a chunk. Lives for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub title: String,
    pub chapter: Option<String>,
    pub section: Option<String>,
    pub page: Option<u32>,
    pub source_type: SourceType,
    /// Raw chunk text for display and context
    pub text: String,
    /// Cosine similarity, clamped to [0, 1]
    pub dense_score: f32,
    /// Sparse score normalized against the best sparse hit
    pub sparse_score: Option<f32>,
    pub rerank_score: Option<f32>,
    /// Weighted hybrid score before reranking
    pub hybrid_score: f32,
    /// Final ranking score
    pub score: f32,
    /// Ingestion order of the owning document, for stable tie-breaks
    pub document_order: u64,
    pub chunk_index: usize,
}

impl SearchResult {
    /// Ordering key for ties: original document order
    pub fn order_key(&self) -> (u64, usize) {
        (self.document_order, self.chunk_index)
    }

    /// Human-readable location, e.g. "Memory Forensics › Processes › pslist"
    pub fn topic(&self) -> String {
        let mut parts = vec![self.title.as_str()];
        if let Some(chapter) = &self.chapter {
            parts.push(chapter);
        }
        if let Some(section) = &self.section {
            parts.push(section);
        }
        parts.join(" › ")
    }
}

/// Discrete trust signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-query confidence derived from the final ranked results
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    /// Scalar in [0, 1]
    pub score: f32,
    pub level: ConfidenceLevel,
    /// Mean of the top-N scores (missing slots count as zero)
    pub average_score: f32,
    /// Source-diversity factor in [0, 1]
    pub coverage: f32,
    pub distinct_sources: usize,
}

impl ConfidenceAssessment {
    /// Assessment for an empty result set
    pub fn none() -> Self {
        Self {
            score: 0.0,
            level: ConfidenceLevel::Low,
            average_score: 0.0,
            coverage: 0.0,
            distinct_sources: 0,
        }
    }

    pub fn is_low(&self) -> bool {
        self.level == ConfidenceLevel::Low
    }
}
