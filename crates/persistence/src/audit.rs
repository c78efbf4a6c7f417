//! Append-only audit log
//!
//! One JSON object per line. Records are never rewritten or deleted.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use dfir_core::{
    AssistantResponse, ConfidenceLevel, Outcome, QueryIntent, SearchWeights, ValidatedCommand,
};

use crate::AuditError;

/// One request, as recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub query: String,
    pub intent: Option<QueryIntent>,
    pub weights: Option<SearchWeights>,
    pub confidence: Option<f32>,
    pub level: Option<ConfidenceLevel>,
    #[serde(default)]
    pub commands: Vec<ValidatedCommand>,
    /// Final text shown to the user
    pub response: String,
    pub outcome: Outcome,
    /// Error class when the request failed
    #[serde(default)]
    pub error_kind: Option<String>,
    pub latency_ms: u64,
}

impl AuditEntry {
    /// Minimal record for a request that ended before producing a response
    pub fn new(request_id: Uuid, query: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_id,
            query: query.into(),
            intent: None,
            weights: None,
            confidence: None,
            level: None,
            commands: Vec::new(),
            response: String::new(),
            outcome,
            error_kind: None,
            latency_ms: 0,
        }
    }

    pub fn from_response(response: &AssistantResponse) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            request_id: response.request_id,
            query: response.query.clone(),
            intent: Some(response.intent),
            weights: Some(response.weights),
            confidence: Some(response.confidence.score),
            level: Some(response.confidence.level),
            commands: response.commands.clone(),
            response: response.answer.clone(),
            outcome: response.outcome,
            error_kind: None,
            latency_ms: response.latency_ms,
        }
    }

    pub fn with_error_kind(mut self, kind: &str) -> Self {
        self.error_kind = Some(kind.to_string());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

/// Audit sink
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError>;

    /// Most recent entries, oldest first
    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError>;
}

/// JSON-lines file sink
pub struct FileAuditLog {
    path: PathBuf,
    /// Serialises writers so lines never interleave
    file: Mutex<tokio::fs::File>,
}

impl FileAuditLog {
    /// Open for append, creating parent directories
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| AuditError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;

        tracing::info!(path = %path.display(), "Audit log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

#[async_trait]
impl AuditLog for FileAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        tracing::debug!(
            request_id = %entry.request_id,
            outcome = ?entry.outcome,
            "Audit record written"
        );
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        // Hold the writer lock so a half-written line is never read
        let _guard = self.file.lock().await;
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = lines.len().saturating_sub(limit);
        lines[skip..]
            .iter()
            .map(|l| serde_json::from_str(l).map_err(AuditError::from))
            .collect()
    }
}

/// In-memory sink for tests
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: parking_lot::RwLock<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries.read();
        let skip = entries.len().saturating_sub(limit);
        Ok(entries[skip..].to_vec())
    }
}
