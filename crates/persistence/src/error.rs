//! Audit log errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit log I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Audit record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AuditError> for dfir_core::Error {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::Io { source, .. } => dfir_core::Error::Io(source),
            AuditError::Serialization(e) => dfir_core::Error::Serialization(e),
        }
    }
}
