//! LLM integration for the DFIR assistant
//!
//! Features:
//! - Ollama chat backend with JSON mode, bounded concurrency, timeouts and retry
//! - Streaming token generation
//! - DFIR system prompt and intent-specific answer instructions
//! - JSON schemas per intent with retry-with-feedback on validation failure

pub mod backend;
pub mod prompt;
pub mod schema;
pub mod scripted;
pub mod structured;

pub use backend::{FinishReason, GenerationResult, LlmBackend, LlmConfig, OllamaBackend, OutputFormat};
pub use prompt::{Message, PromptBuilder, Role};
pub use schema::{IntentSchemas, SchemaViolation};
pub use scripted::ScriptedBackend;
pub use structured::{extract_json, StructuredGenerator, StructuredOutput};

use thiserror::Error;

/// LLM errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Schema validation failed after {attempts} attempts: {last_error}")]
    SchemaExhausted { attempts: u32, last_error: String },

    #[error("Generation cancelled")]
    Cancelled,
}

impl LlmError {
    /// Network, timeout and 5xx failures; schema failures are never transient
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Network(_) | LlmError::Timeout(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Network(err.to_string())
    }
}

impl From<LlmError> for dfir_core::Error {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Configuration(msg) => dfir_core::Error::Configuration(msg),
            LlmError::Cancelled => dfir_core::Error::Cancelled,
            other => dfir_core::Error::Generation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let exhausted = LlmError::SchemaExhausted {
            attempts: 3,
            last_error: "missing steps".into(),
        };
        assert!(!exhausted.is_transient());
        assert_eq!(dfir_core::Error::from(exhausted).kind(), "generation");

        assert!(LlmError::Timeout(120).is_transient());
        assert_eq!(dfir_core::Error::from(LlmError::Timeout(120)).kind(), "generation");
        assert_eq!(
            dfir_core::Error::from(LlmError::Configuration("bad endpoint".into())).kind(),
            "configuration"
        );
    }
}
