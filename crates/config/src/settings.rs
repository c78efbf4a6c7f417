//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{chunking, confidence, context, endpoints, models, retrieval, timeouts};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if strict validation should be applied
    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    #[serde(default)]
    pub server: ServerConfig,

    /// Generation model
    #[serde(default)]
    pub llm: LlmSettings,

    /// Embedding model (pinned per index)
    #[serde(default)]
    pub embedding: EmbeddingSettings,

    /// Vector + sparse index
    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub chunking: ChunkingSettings,

    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub confidence: ConfidenceSettings,

    #[serde(default)]
    pub context: ContextSettings,

    /// Command validation
    #[serde(default)]
    pub validation: ValidationSettings,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_server()?;
        self.validate_llm()?;
        self.validate_embedding()?;
        self.validate_chunking()?;
        self.validate_retrieval()?;
        self.validate_confidence()?;
        self.validate_context()?;
        Ok(())
    }

    fn validate_server(&self) -> Result<(), ConfigError> {
        let server = &self.server;

        if server.port == 0 {
            return Err(invalid("server.port", "Port cannot be 0"));
        }

        if server.max_concurrent_queries == 0 {
            return Err(invalid(
                "server.max_concurrent_queries",
                "Must allow at least 1 concurrent query",
            ));
        }

        if server.timeout_seconds == 0 {
            return Err(invalid("server.timeout_seconds", "Timeout must be at least 1 second"));
        }

        if self.environment.is_production() && server.auth.enabled && server.auth.api_key.is_none()
        {
            return Err(invalid(
                "server.auth.api_key",
                "API key must be set when auth is enabled in production",
            ));
        }

        if self.environment.is_production() && server.cors_enabled && server.cors_origins.is_empty()
        {
            tracing::warn!(
                "CORS is enabled in production but no origins are configured. \
                 This may block legitimate requests."
            );
        }

        Ok(())
    }

    fn validate_llm(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;

        if llm.model.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.model".to_string()));
        }

        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(invalid(
                "llm.temperature",
                format!("Must be between 0.0 and 2.0, got {}", llm.temperature),
            ));
        }

        if llm.max_concurrent_requests == 0 {
            return Err(invalid("llm.max_concurrent_requests", "Must be at least 1"));
        }

        if llm.structured_retries > 5 {
            return Err(invalid(
                "llm.structured_retries",
                format!("At most 5 retries allowed, got {}", llm.structured_retries),
            ));
        }

        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;

        if embedding.model.trim().is_empty() {
            return Err(ConfigError::MissingField("embedding.model".to_string()));
        }

        if embedding.dimension == 0 {
            return Err(invalid("embedding.dimension", "Dimension cannot be 0"));
        }

        if embedding.batch_size == 0 {
            return Err(invalid("embedding.batch_size", "Batch size cannot be 0"));
        }

        if embedding.max_concurrent_requests == 0 {
            return Err(invalid("embedding.max_concurrent_requests", "Must be at least 1"));
        }

        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;

        if chunking.target_tokens == 0 {
            return Err(invalid("chunking.target_tokens", "Target cannot be 0"));
        }

        if chunking.overlap_tokens >= chunking.target_tokens {
            return Err(invalid(
                "chunking.overlap_tokens",
                format!(
                    "Overlap ({}) must be smaller than target ({})",
                    chunking.overlap_tokens, chunking.target_tokens
                ),
            ));
        }

        if chunking.chars_per_token == 0 {
            return Err(invalid("chunking.chars_per_token", "Cannot be 0"));
        }

        Ok(())
    }

    fn validate_retrieval(&self) -> Result<(), ConfigError> {
        let retrieval = &self.retrieval;

        if retrieval.final_k == 0 {
            return Err(invalid("retrieval.final_k", "Must be at least 1"));
        }

        if retrieval.candidate_k < retrieval.final_k {
            return Err(invalid(
                "retrieval.candidate_k",
                format!(
                    "Candidates ({}) must not be fewer than final results ({})",
                    retrieval.candidate_k, retrieval.final_k
                ),
            ));
        }

        if !(0.0..=1.0).contains(&retrieval.rerank_weight) {
            return Err(invalid(
                "retrieval.rerank_weight",
                format!("Must be between 0.0 and 1.0, got {}", retrieval.rerank_weight),
            ));
        }

        Ok(())
    }

    fn validate_confidence(&self) -> Result<(), ConfigError> {
        let c = &self.confidence;

        for (field, value) in [
            ("confidence.low_threshold", c.low_threshold),
            ("confidence.high_threshold", c.high_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("Must be between 0.0 and 1.0, got {}", value)));
            }
        }

        if c.low_threshold > c.high_threshold {
            return Err(invalid(
                "confidence.low_threshold",
                format!(
                    "Low threshold ({}) exceeds high threshold ({})",
                    c.low_threshold, c.high_threshold
                ),
            ));
        }

        if c.top_n == 0 {
            return Err(invalid("confidence.top_n", "Must be at least 1"));
        }

        Ok(())
    }

    fn validate_context(&self) -> Result<(), ConfigError> {
        if self.context.token_budget < 256 {
            return Err(invalid(
                "context.token_budget",
                format!("Budget too small (minimum 256), got {}", self.context.token_budget),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

fn default_true() -> bool {
    true
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Queries served at once; the rest wait
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_max_concurrent_queries() -> usize {
    16
}
fn default_timeout() -> u64 {
    timeouts::HTTP_REQUEST_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_queries: default_max_concurrent_queries(),
            timeout_seconds: default_timeout(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            auth: AuthConfig::default(),
        }
    }
}

/// API key authentication
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Disabled by default for development
    #[serde(default)]
    pub enabled: bool,

    /// Set via DFIR__SERVER__AUTH__API_KEY
    #[serde(default)]
    pub api_key: Option<String>,

    /// Paths that bypass authentication
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/ready".to_string(), "/metrics".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            public_paths: default_public_paths(),
        }
    }
}

/// LLM generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Low by default: answers must stay close to the sources
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_llm_timeout")]
    pub timeout_seconds: u64,

    /// Transient-failure retries (network, timeout, 5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Pooled connections to the LLM service
    #[serde(default = "default_llm_concurrency")]
    pub max_concurrent_requests: usize,

    /// Regenerations after a schema validation failure
    #[serde(default = "default_structured_retries")]
    pub structured_retries: u32,

    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

fn default_ollama_endpoint() -> String {
    endpoints::OLLAMA_DEFAULT.to_string()
}
fn default_llm_model() -> String {
    models::LLM_MODEL.to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}
fn default_max_tokens() -> usize {
    4096
}
fn default_llm_timeout() -> u64 {
    timeouts::LLM_REQUEST_SECS
}
fn default_max_retries() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    200
}
fn default_llm_concurrency() -> usize {
    2
}
fn default_structured_retries() -> u32 {
    2
}
fn default_keep_alive() -> String {
    "10m".to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_llm_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_llm_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_concurrent_requests: default_llm_concurrency(),
            structured_retries: default_structured_retries(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Embedding service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,

    /// Texts per request during bulk ingestion
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_embedding_concurrency")]
    pub max_concurrent_requests: usize,
}

fn default_embedding_model() -> String {
    models::EMBEDDING_MODEL.to_string()
}
fn default_embedding_dim() -> usize {
    models::EMBEDDING_DIM
}
fn default_batch_size() -> usize {
    32
}
fn default_embedding_timeout() -> u64 {
    timeouts::EMBEDDING_REQUEST_SECS
}
fn default_embedding_concurrency() -> usize {
    4
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            dimension: default_embedding_dim(),
            batch_size: default_batch_size(),
            timeout_seconds: default_embedding_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_concurrent_requests: default_embedding_concurrency(),
        }
    }
}

/// Which dense index backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Qdrant HNSW collection
    #[default]
    Qdrant,
    /// In-process index (tests, small corpora)
    Memory,
}

/// Vector + sparse index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    #[serde(default)]
    pub backend: IndexBackend,

    #[serde(default = "default_qdrant_endpoint")]
    pub qdrant_endpoint: String,

    #[serde(default = "default_qdrant_collection")]
    pub qdrant_collection: String,

    #[serde(default)]
    pub qdrant_api_key: Option<String>,

    /// Tantivy index directory
    #[serde(default = "default_sparse_index_dir")]
    pub sparse_index_dir: String,

    /// Records the embedding model the index was built with
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,
}

fn default_qdrant_endpoint() -> String {
    endpoints::QDRANT_DEFAULT.to_string()
}
fn default_qdrant_collection() -> String {
    "dfir_books".to_string()
}
fn default_sparse_index_dir() -> String {
    "data/sparse_index".to_string()
}
fn default_manifest_path() -> String {
    "data/index_manifest.json".to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            qdrant_endpoint: default_qdrant_endpoint(),
            qdrant_collection: default_qdrant_collection(),
            qdrant_api_key: None,
            sparse_index_dir: default_sparse_index_dir(),
            manifest_path: default_manifest_path(),
        }
    }
}

/// Chunking settings (token units)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingSettings {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,

    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,

    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,

    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: usize,

    /// Add a `Page: N` line to the contextual prefix
    #[serde(default)]
    pub include_page: bool,
}

fn default_target_tokens() -> usize {
    chunking::TARGET_TOKENS
}
fn default_overlap_tokens() -> usize {
    chunking::OVERLAP_TOKENS
}
fn default_min_tokens() -> usize {
    chunking::MIN_TOKENS
}
fn default_chars_per_token() -> usize {
    chunking::CHARS_PER_TOKEN
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
            min_tokens: default_min_tokens(),
            chars_per_token: default_chars_per_token(),
            include_page: false,
        }
    }
}

/// Hybrid search and reranking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Candidates kept after hybrid fusion
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,

    /// Results kept after reranking
    #[serde(default = "default_final_k")]
    pub final_k: usize,

    #[serde(default = "default_true")]
    pub reranking_enabled: bool,

    /// Share of the final score taken by the reranker
    #[serde(default = "default_rerank_weight")]
    pub rerank_weight: f32,

    #[serde(default = "default_search_timeout")]
    pub search_timeout_seconds: u64,

    /// Retries of a dense search after a connection failure or timeout
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_candidate_k() -> usize {
    retrieval::CANDIDATE_K
}
fn default_final_k() -> usize {
    retrieval::FINAL_K
}
fn default_rerank_weight() -> f32 {
    retrieval::RERANK_WEIGHT
}
fn default_search_timeout() -> u64 {
    timeouts::SEARCH_SECS
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            final_k: default_final_k(),
            reranking_enabled: true,
            rerank_weight: default_rerank_weight(),
            search_timeout_seconds: default_search_timeout(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Confidence classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceSettings {
    /// Below this is LOW
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f32,

    /// Above this is HIGH
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f32,

    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_low_threshold() -> f32 {
    confidence::LOW_THRESHOLD
}
fn default_high_threshold() -> f32 {
    confidence::HIGH_THRESHOLD
}
fn default_top_n() -> usize {
    confidence::TOP_N
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            low_threshold: default_low_threshold(),
            high_threshold: default_high_threshold(),
            top_n: default_top_n(),
        }
    }
}

/// Prompt context assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

fn default_token_budget() -> usize {
    context::TOKEN_BUDGET
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
        }
    }
}

/// Command validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Plugin registry JSON
    #[serde(default = "default_registry_path")]
    pub registry_path: String,

    /// Largest edit distance still offered as a suggestion
    #[serde(default = "default_max_suggestion_distance")]
    pub max_suggestion_distance: usize,
}

fn default_registry_path() -> String {
    "config/volatility_plugins.json".to_string()
}
fn default_max_suggestion_distance() -> usize {
    3
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            max_suggestion_distance: default_max_suggestion_distance(),
        }
    }
}

/// Append-only audit sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_audit_path")]
    pub path: String,
}

fn default_audit_path() -> String {
    "logs/audit.log".to_string()
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_audit_path(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,

    /// OTLP endpoint for traces (requires the `telemetry` feature)
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            otlp_endpoint: None,
            metrics_enabled: true,
        }
    }
}

/// Load settings from files and environment
///
/// Priority: `DFIR__*` env vars > `config/{env}` > `config/default` > defaults
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("DFIR")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.chunking.target_tokens, 512);
        assert_eq!(settings.chunking.overlap_tokens, 100);
        assert_eq!(settings.embedding.model, "nomic-embed-text");
        assert_eq!(settings.index.qdrant_collection, "dfir_books");
        assert_eq!(settings.retrieval.candidate_k, 15);
        assert_eq!(settings.retrieval.final_k, 5);
        assert_eq!(settings.context.token_budget, 4000);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [llm]
            model = "llama3.1:8b"

            [retrieval]
            reranking_enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(settings.llm.model, "llama3.1:8b");
        assert_eq!(settings.llm.temperature, 0.1);
        assert!(!settings.retrieval.reranking_enabled);
        assert_eq!(settings.retrieval.final_k, 5);
    }

    #[test]
    fn test_chunking_overlap_validation() {
        let mut settings = Settings::default();
        settings.chunking.overlap_tokens = 512;
        assert!(settings.validate_chunking().is_err());

        settings.chunking.overlap_tokens = 100;
        assert!(settings.validate_chunking().is_ok());
    }

    #[test]
    fn test_retrieval_validation() {
        let mut settings = Settings::default();
        settings.retrieval.final_k = 0;
        assert!(settings.validate_retrieval().is_err());

        settings.retrieval.final_k = 20;
        assert!(settings.validate_retrieval().is_err());

        settings.retrieval.final_k = 5;
        settings.retrieval.rerank_weight = 1.5;
        assert!(settings.validate_retrieval().is_err());
    }

    #[test]
    fn test_confidence_threshold_order() {
        let mut settings = Settings::default();
        settings.confidence.low_threshold = 0.8;
        settings.confidence.high_threshold = 0.6;
        assert!(settings.validate_confidence().is_err());

        settings.confidence.low_threshold = 0.5;
        settings.confidence.high_threshold = 0.7;
        assert!(settings.validate_confidence().is_ok());
    }

    #[test]
    fn test_server_validation() {
        let mut settings = Settings::default();

        settings.server.port = 0;
        assert!(settings.validate_server().is_err());
        settings.server.port = 8080;

        settings.server.max_concurrent_queries = 0;
        assert!(settings.validate_server().is_err());
        settings.server.max_concurrent_queries = 4;

        settings.server.timeout_seconds = 0;
        assert!(settings.validate_server().is_err());
        settings.server.timeout_seconds = 30;

        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_production_auth_validation() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        settings.server.auth.enabled = true;
        settings.server.auth.api_key = None;
        assert!(settings.validate_server().is_err());

        settings.server.auth.api_key = Some("secret-key".to_string());
        assert!(settings.validate_server().is_ok());
    }

    #[test]
    fn test_empty_model_rejected() {
        let mut settings = Settings::default();
        settings.embedding.model = "  ".to_string();
        assert!(matches!(
            settings.validate_embedding(),
            Err(ConfigError::MissingField(_))
        ));
    }
}
