//! LLM Backend implementations
//!
//! Talks to a local Ollama server over `/api/chat`. Structured answers use
//! Ollama's JSON mode (`format: "json"`); streaming reads NDJSON frames.
//!
//! Every call holds a semaphore permit, so at most
//! `max_concurrent_requests` generations run against the shared GPU at once.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};

use dfir_config::LlmSettings;
use dfir_core::RetryPolicy;

use crate::prompt::Message;
use crate::LlmError;

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub endpoint: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
    /// Whole-request timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub max_concurrent_requests: usize,
    /// How long Ollama keeps the model loaded ("5m", "-1", "0")
    pub keep_alive: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from(&LlmSettings::default())
    }
}

impl From<&LlmSettings> for LlmConfig {
    fn from(settings: &LlmSettings) -> Self {
        Self {
            model: settings.model.clone(),
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
            timeout: Duration::from_secs(settings.timeout_seconds),
            retry: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.initial_backoff_ms),
            ),
            max_concurrent_requests: settings.max_concurrent_requests.max(1),
            keep_alive: settings.keep_alive.clone(),
        }
    }
}

/// Requested output shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// LLM generation result
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    /// Tokens generated
    pub tokens: usize,
    pub time_to_first_token_ms: u64,
    pub total_time_ms: u64,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Cancelled,
}

/// LLM Backend trait
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, messages: &[Message], format: OutputFormat) -> Result<GenerationResult, LlmError>;

    /// Generate, forwarding each token to `tx` as it arrives.
    ///
    /// A closed receiver stops generation with [`FinishReason::Cancelled`].
    async fn generate_stream(
        &self,
        messages: &[Message],
        format: OutputFormat,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError>;

    async fn is_available(&self) -> bool;

    fn model_name(&self) -> &str;
}

/// Ollama chat backend
pub struct OllamaBackend {
    client: Client,
    config: LlmConfig,
    permits: Semaphore,
}

impl OllamaBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LlmError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            permits: Semaphore::new(config.max_concurrent_requests.max(1)),
            config,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.config.endpoint, path)
    }

    fn request(&self, messages: &[Message], format: OutputFormat, stream: bool) -> OllamaChatRequest {
        OllamaChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(OllamaMessage::from).collect(),
            stream,
            format: match format {
                OutputFormat::Json => Some("json".to_string()),
                OutputFormat::Text => None,
            },
            options: OllamaOptions {
                temperature: Some(self.config.temperature),
                top_p: Some(self.config.top_p),
                num_predict: Some(self.config.max_tokens as i32),
            },
            keep_alive: Some(self.config.keep_alive.clone()),
            think: Some(false),
        }
    }

    /// Send a request and check the status; 5xx is retryable, 4xx is not
    async fn send(&self, request: &OllamaChatRequest) -> Result<reqwest::Response, LlmError> {
        let response = self.client.post(self.api_url("/chat")).json(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND && body.contains("model") {
            return Err(LlmError::ModelNotFound(self.config.model.clone()));
        }
        if status.is_server_error() {
            return Err(LlmError::Network(format!("Server error {}: {}", status, body)));
        }
        Err(LlmError::Api(format!("HTTP {}: {}", status, body)))
    }

    async fn execute(&self, request: &OllamaChatRequest) -> Result<OllamaChatResponse, LlmError> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, async {
            let response = self.send(request).await?;
            response
                .json::<OllamaChatResponse>()
                .await
                .map_err(|e| LlmError::InvalidResponse(e.to_string()))
        })
        .await
        .map_err(|_| LlmError::Timeout(timeout.as_secs()))?
    }

    async fn stream_into(
        &self,
        request: &OllamaChatRequest,
        tx: &mpsc::Sender<String>,
        start: Instant,
    ) -> Result<GenerationResult, LlmError> {
        use futures::StreamExt;

        let response = self.send(request).await?;
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut text = String::new();
        let mut tokens = 0usize;
        let mut first_token_ms = None;
        let mut finish_reason = FinishReason::Stop;

        'frames: while let Some(bytes) = stream.next().await {
            buffer.extend_from_slice(&bytes?);

            for line in drain_lines(&mut buffer) {
                let frame: OllamaChatResponse = serde_json::from_str(&line)
                    .map_err(|e| LlmError::InvalidResponse(format!("Bad stream frame: {}", e)))?;

                let token = frame.message.content;
                if !token.is_empty() {
                    first_token_ms.get_or_insert(start.elapsed().as_millis() as u64);
                    text.push_str(&token);
                    tokens += 1;
                    if tx.send(token).await.is_err() {
                        finish_reason = FinishReason::Cancelled;
                        break 'frames;
                    }
                }
                if frame.done {
                    if frame.done_reason.as_deref() == Some("length") {
                        finish_reason = FinishReason::Length;
                    }
                    break 'frames;
                }
            }
        }

        let total_time_ms = start.elapsed().as_millis() as u64;
        Ok(GenerationResult {
            text,
            tokens,
            time_to_first_token_ms: first_token_ms.unwrap_or(total_time_ms),
            total_time_ms,
            finish_reason,
        })
    }
}

/// Split complete NDJSON lines off the front of a byte buffer
///
/// Frames may straddle network chunks, and so may a multi-byte character.
/// Bytes after the last newline stay buffered and are decoded only once the
/// line is complete.
fn drain_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(end) = buffer.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = buffer.drain(..=end).collect();
        let line = String::from_utf8_lossy(&raw);
        let line = line.trim();
        if !line.is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn generate(&self, messages: &[Message], format: OutputFormat) -> Result<GenerationResult, LlmError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Configuration("LLM request pool closed".to_string()))?;

        let start = Instant::now();
        let request = self.request(messages, format, false);
        let response = self
            .config
            .retry
            .run("ollama_chat", LlmError::is_transient, || self.execute(&request))
            .await?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            model = %self.config.model,
            tokens = response.eval_count.unwrap_or(0),
            total_time_ms,
            json = format == OutputFormat::Json,
            "Generated"
        );

        Ok(GenerationResult {
            text: response.message.content,
            tokens: response.eval_count.unwrap_or(0) as usize,
            time_to_first_token_ms: response.prompt_eval_duration.unwrap_or(0) / 1_000_000,
            total_time_ms,
            finish_reason: match response.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        format: OutputFormat,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| LlmError::Configuration("LLM request pool closed".to_string()))?;

        let start = Instant::now();
        let request = self.request(messages, format, true);
        let timeout = self.config.timeout;
        // Tokens may already be out, so a stream is never retried
        tokio::time::timeout(timeout, self.stream_into(&request, &tx, start))
            .await
            .map_err(|_| LlmError::Timeout(timeout.as_secs()))?
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.api_url("/tags"))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// Ollama API types

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<String>,
    /// Disable extended thinking on reasoning models
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

impl From<&Message> for OllamaMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_duration: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_character_split_across_chunks_decodes_whole() {
        let frame = "{\"message\":{\"role\":\"assistant\",\"content\":\"Pr\u{e9}fetch\"},\"done\":false}\n";
        let bytes = frame.as_bytes();
        // Cut inside the two-byte encoding of 'é'
        let split = frame.find('\u{e9}').unwrap() + 1;

        let mut buffer = Vec::new();
        buffer.extend_from_slice(&bytes[..split]);
        assert!(drain_lines(&mut buffer).is_empty());

        buffer.extend_from_slice(&bytes[split..]);
        let lines = drain_lines(&mut buffer);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].contains('\u{fffd}'));

        let parsed: OllamaChatResponse = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed.message.content, "Pr\u{e9}fetch");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_lines_keeps_partial_frame() {
        let mut buffer = b"{\"a\":1}\n\n{\"b\":".to_vec();
        assert_eq!(drain_lines(&mut buffer), vec!["{\"a\":1}".to_string()]);
        assert_eq!(buffer, b"{\"b\":".to_vec());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = LlmSettings {
            endpoint: "http://ollama:11434/".into(),
            max_retries: 5,
            ..Default::default()
        };
        let config = LlmConfig::from(&settings);
        assert_eq!(config.endpoint, "http://ollama:11434");
        assert_eq!(config.retry.max_retries, 5);
        assert!(config.max_concurrent_requests >= 1);
    }

    #[test]
    fn test_json_mode_request() {
        let backend = OllamaBackend::new(LlmConfig::default()).unwrap();
        let request = backend.request(&[Message::user("hi")], OutputFormat::Json, false);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["format"], "json");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["think"], false);

        let text = backend.request(&[Message::user("hi")], OutputFormat::Text, true);
        let json = serde_json::to_value(&text).unwrap();
        assert!(json.get("format").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{"model":"m","message":{"role":"assistant","content":"{\"summary\":\"x\"}"},"done":true,"done_reason":"stop","eval_count":12}"#;
        let parsed: OllamaChatResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.done);
        assert_eq!(parsed.eval_count, Some(12));
        assert_eq!(parsed.message.content, "{\"summary\":\"x\"}");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let config = LlmConfig {
            endpoint: "http://127.0.0.1:1".into(),
            retry: RetryPolicy::none(),
            timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let backend = OllamaBackend::new(config).unwrap();
        let err = backend
            .generate(&[Message::user("hi")], OutputFormat::Text)
            .await
            .unwrap_err();
        assert!(err.is_transient(), "{err}");
        assert!(!backend.is_available().await);
    }
}
