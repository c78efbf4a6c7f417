//! Ollama Embeddings
//!
//! Uses Ollama's `/api/embed` endpoint for dense vectors.
//!
//! ## nomic-embed-text task prefixes
//!
//! nomic models are trained with asymmetric prefixes: documents are embedded
//! as `search_document: <text>` and queries as `search_query: <text>`. Other
//! models get the text unchanged.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;

use dfir_config::EmbeddingSettings;
use dfir_core::RetryPolicy;

use crate::embeddings::Embedder;
use crate::RagError;

const DOCUMENT_PREFIX: &str = "search_document: ";
const QUERY_PREFIX: &str = "search_query: ";

/// Ollama embedding configuration
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Ollama API endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// Texts per request
    pub batch_size: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Requests in flight at once
    pub max_concurrent_requests: usize,
}

impl Default for OllamaEmbeddingConfig {
    fn default() -> Self {
        Self::from(&EmbeddingSettings::default())
    }
}

impl From<&EmbeddingSettings> for OllamaEmbeddingConfig {
    fn from(settings: &EmbeddingSettings) -> Self {
        Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            embedding_dim: settings.dimension,
            batch_size: settings.batch_size.max(1),
            timeout: Duration::from_secs(settings.timeout_seconds),
            retry: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.initial_backoff_ms),
            ),
            max_concurrent_requests: settings.max_concurrent_requests.max(1),
        }
    }
}

/// Request to Ollama embedding API
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response from Ollama embedding API
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama embedder
pub struct OllamaEmbedder {
    client: Client,
    config: OllamaEmbeddingConfig,
    permits: Semaphore,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder
    pub fn new(config: OllamaEmbeddingConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_requests);
        Self {
            client: Client::new(),
            config,
            permits,
        }
    }

    pub fn config(&self) -> &OllamaEmbeddingConfig {
        &self.config
    }

    fn uses_task_prefixes(&self) -> bool {
        self.config.model.starts_with("nomic-embed")
    }

    fn with_prefix(&self, prefix: &str, text: &str) -> String {
        if self.uses_task_prefixes() {
            format!("{}{}", prefix, text)
        } else {
            text.to_string()
        }
    }

    /// One bounded, retried request for up to `batch_size` texts
    async fn embed_raw(&self, input: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RagError::Embedding("Embedding pool closed".to_string()))?;

        let embeddings = self
            .config
            .retry
            .run("ollama_embed", RagError::is_transient, || self.request(input))
            .await?;

        if embeddings.len() != input.len() {
            return Err(RagError::Embedding(format!(
                "Expected {} embeddings, got {}",
                input.len(),
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.config.embedding_dim) {
            return Err(RagError::Embedding(format!(
                "Embedding dimension {} does not match configured {}",
                bad.len(),
                self.config.embedding_dim
            )));
        }

        Ok(embeddings)
    }

    /// One `/api/embed` call; the timeout covers the response body too
    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        tokio::time::timeout(self.config.timeout, self.exchange(input))
            .await
            .map_err(|_| {
                RagError::Timeout(format!(
                    "Ollama embedding exceeded {}s",
                    self.config.timeout.as_secs()
                ))
            })?
    }

    async fn exchange(&self, input: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let request = EmbedRequest {
            model: &self.config.model,
            input,
        };
        let url = format!("{}/api/embed", self.config.endpoint);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Connection(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("Ollama embedding failed: {} - {}", status, body);
            return Err(if status.is_server_error() {
                RagError::Connection(message)
            } else {
                RagError::Embedding(message)
            });
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("Failed to parse Ollama response: {}", e)))?;

        Ok(embed_response.embeddings)
    }

    /// Check the embedding model is available
    pub async fn health_check(&self) -> Result<(), RagError> {
        let url = format!("{}/api/tags", self.config.endpoint);
        let response = tokio::time::timeout(Duration::from_secs(5), self.client.get(&url).send())
            .await
            .map_err(|_| RagError::Timeout("Ollama health check".to_string()))?
            .map_err(|e| RagError::Connection(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RagError::Connection(format!(
                "Ollama returned {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let input = [self.with_prefix(DOCUMENT_PREFIX, text)];
        self.embed_raw(&input)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut all = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            let input: Vec<String> = batch
                .iter()
                .map(|t| self.with_prefix(DOCUMENT_PREFIX, t))
                .collect();
            all.extend(self.embed_raw(&input).await?);
            tracing::debug!(done = all.len(), total = texts.len(), "Embedded batch");
        }
        Ok(all)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let input = [self.with_prefix(QUERY_PREFIX, query)];
        self.embed_raw(&input)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let config = OllamaEmbeddingConfig::default();
        assert_eq!(config.model, "nomic-embed-text");
        assert_eq!(config.embedding_dim, 768);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_nomic_prefixes() {
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig::default());
        assert_eq!(
            embedder.with_prefix(QUERY_PREFIX, "pslist"),
            "search_query: pslist"
        );

        let other = OllamaEmbedder::new(OllamaEmbeddingConfig {
            model: "mxbai-embed-large".to_string(),
            ..Default::default()
        });
        assert_eq!(other.with_prefix(QUERY_PREFIX, "pslist"), "pslist");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            retry: RetryPolicy::none(),
            ..Default::default()
        });
        let err = embedder.embed_query("malfind").await.unwrap_err();
        assert!(err.is_transient(), "got {err}");
    }

    #[tokio::test]
    async fn test_timeout_covers_stalled_response_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;
            // Headers arrive promptly, the body never completes
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 4096\r\n\r\n{\"embeddings\":",
                )
                .await;
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let embedder = OllamaEmbedder::new(OllamaEmbeddingConfig {
            endpoint,
            timeout: Duration::from_millis(200),
            retry: RetryPolicy::none(),
            ..Default::default()
        });
        let started = std::time::Instant::now();
        let err = embedder.embed_query("malfind").await.unwrap_err();
        assert!(matches!(err, RagError::Timeout(_)), "got {err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
