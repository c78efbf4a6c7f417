//! Error taxonomy shared by every crate in the assistant
//!
//! Crate-local errors (`RagError`, `LlmError`, ...) convert into [`Error`],
//! which carries the four request-level classes plus the plumbing variants.
//! Nothing in this enum is ever shown to a user directly: callers go through
//! [`Error::user_message`] instead.

use thiserror::Error;

use crate::messages::UserMessage;

/// Assistant errors
#[derive(Error, Debug)]
pub enum Error {
    /// Fatal misconfiguration (model mismatch, missing plugin registry)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Index or search service unreachable, or returned malformed data
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// LLM failure or exhausted structured-output retries
    #[error("Generation error: {0}")]
    Generation(String),

    /// Registry validation failure. Normal-path; surfaces as an annotation.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a local retry with backoff is appropriate
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Io(_))
    }

    /// Short machine-readable kind, used for metrics labels and audit records
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Retrieval(_) => "retrieval",
            Error::Generation(_) => "generation",
            Error::Validation(_) => "validation",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Map to the pre-approved message shown to the user
    pub fn user_message(&self) -> UserMessage {
        match self {
            Error::Configuration(_) => UserMessage::ServiceMisconfigured,
            Error::Retrieval(_) => UserMessage::InsufficientInformation,
            Error::Generation(_) | Error::Serialization(_) => UserMessage::GenerationFailed,
            Error::Validation(_) => UserMessage::CommandsUnverified,
            Error::Timeout(_) | Error::Io(_) => UserMessage::ServiceUnavailable,
            Error::Cancelled => UserMessage::Cancelled,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Timeout("embed".into()).is_transient());
        assert!(!Error::Generation("schema".into()).is_transient());
        assert!(!Error::Configuration("model".into()).is_transient());
    }

    #[test]
    fn test_retrieval_maps_to_insufficient_information() {
        let err = Error::Retrieval("qdrant unreachable".into());
        assert_eq!(err.user_message(), UserMessage::InsufficientInformation);
        assert!(!err.user_message().text().contains("qdrant"));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::Generation(String::new()).kind(), "generation");
    }
}
