//! Audit persistence for the DFIR assistant
//!
//! Every request leaves exactly one append-only record: query, weights,
//! confidence, validated commands, final response and outcome.

pub mod audit;
pub mod error;

pub use audit::{AuditEntry, AuditLog, FileAuditLog, MemoryAuditLog};
pub use error::AuditError;

use std::sync::Arc;

use dfir_config::AuditSettings;

/// File sink when auditing is enabled, otherwise nothing
pub async fn open(settings: &AuditSettings) -> Result<Option<Arc<dyn AuditLog>>, AuditError> {
    if !settings.enabled {
        tracing::warn!("Audit logging disabled");
        return Ok(None);
    }
    let log = FileAuditLog::open(&settings.path).await?;
    Ok(Some(Arc::new(log)))
}
