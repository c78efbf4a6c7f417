//! Command validation for generated DFIR answers
//!
//! Features:
//! - Plugin registry covering Volatility 2 and 3 (exact, alias, case-insensitive lookup)
//! - Command extraction from fenced code, inline code and plain lines
//! - Validation with nearest-plugin suggestions by edit distance

pub mod edit_distance;
pub mod extractor;
pub mod registry;
pub mod validator;

pub use extractor::{extract_commands, ExtractedCommand};
pub use registry::{MatchKind, PluginMatch, PluginRegistry, PluginSpec};
pub use validator::{CommandValidator, ValidationReport, DEFAULT_MAX_SUGGESTION_DISTANCE};

use thiserror::Error;

/// Registry loading errors
///
/// An invalid command is not an error; it is an annotation on the response.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Plugin registry not found: {0}")]
    RegistryNotFound(String),

    #[error("Failed to parse plugin registry: {0}")]
    RegistryParse(String),

    #[error("Plugin registry contains no plugins")]
    EmptyRegistry,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for dfir_core::Error {
    fn from(err: ValidationError) -> Self {
        dfir_core::Error::Configuration(err.to_string())
    }
}
