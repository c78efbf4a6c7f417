//! Configuration management for the DFIR assistant
//!
//! Supports loading configuration from:
//! - TOML/YAML files (`config/default`, `config/{env}`)
//! - Environment variables (`DFIR__` prefix, `__` separator)
//! - Built-in defaults for every field

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AuditSettings, AuthConfig, ChunkingSettings, ConfidenceSettings,
    ContextSettings, EmbeddingSettings, IndexBackend, IndexSettings, LlmSettings,
    ObservabilityConfig, RetrievalSettings, RuntimeEnvironment, ServerConfig, Settings,
    ValidationSettings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
