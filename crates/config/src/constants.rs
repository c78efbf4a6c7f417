//! Centralized constants for the DFIR assistant
//!
//! Single source of truth for default values used across crates. Settings
//! defaults read from here so that code and config files agree.

/// Service endpoints (defaults for local development)
pub mod endpoints {
    /// Ollama endpoint (LLM and embeddings)
    pub const OLLAMA_DEFAULT: &str = "http://localhost:11434";

    /// Qdrant vector store endpoint
    pub const QDRANT_DEFAULT: &str = "http://localhost:6333";
}

/// Model defaults
pub mod models {
    pub const LLM_MODEL: &str = "qwen2.5:32b-instruct-q4_K_M";

    /// Must stay pinned for the lifetime of an index
    pub const EMBEDDING_MODEL: &str = "nomic-embed-text";

    pub const EMBEDDING_DIM: usize = 768;
}

/// Chunking defaults (in tokens)
pub mod chunking {
    pub const TARGET_TOKENS: usize = 512;

    pub const OVERLAP_TOKENS: usize = 100;

    pub const MIN_TOKENS: usize = 100;

    /// Rough English estimate used when no tokenizer is available
    pub const CHARS_PER_TOKEN: usize = 4;
}

/// Retrieval defaults
pub mod retrieval {
    /// Candidates kept after hybrid fusion
    pub const CANDIDATE_K: usize = 15;

    /// Results kept after reranking
    pub const FINAL_K: usize = 5;

    /// Share of the final score taken by the reranker
    pub const RERANK_WEIGHT: f32 = 0.7;
}

/// Confidence thresholds
pub mod confidence {
    pub const LOW_THRESHOLD: f32 = 0.5;

    pub const HIGH_THRESHOLD: f32 = 0.7;

    /// Number of top results averaged
    pub const TOP_N: usize = 5;
}

/// Context assembly
pub mod context {
    /// Leaves headroom for query and answer in an 8K window
    pub const TOKEN_BUDGET: usize = 4000;
}

/// Timeouts (seconds)
pub mod timeouts {
    pub const LLM_REQUEST_SECS: u64 = 120;

    pub const EMBEDDING_REQUEST_SECS: u64 = 30;

    pub const SEARCH_SECS: u64 = 10;

    pub const HTTP_REQUEST_SECS: u64 = 180;
}
