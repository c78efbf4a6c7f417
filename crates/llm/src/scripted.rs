//! Scripted backend for offline runs and tests
//!
//! Replays a fixed list of answers in order and records every prompt it was
//! given.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{FinishReason, GenerationResult, LlmBackend, OutputFormat};
use crate::prompt::Message;
use crate::LlmError;

pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new<S: Into<String>>(answers: Vec<S>) -> Self {
        Self::with_results(answers.into_iter().map(|a| Ok(a.into())).collect())
    }

    pub fn with_results(results: Vec<Result<String, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    /// Every prompt received, oldest first
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().clone()
    }

    async fn next(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.requests.lock().push(messages.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Api("Script exhausted".to_string())))
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, messages: &[Message], _format: OutputFormat) -> Result<GenerationResult, LlmError> {
        let text = self.next(messages).await?;
        Ok(GenerationResult {
            tokens: text.split_whitespace().count(),
            text,
            time_to_first_token_ms: 0,
            total_time_ms: 0,
            finish_reason: FinishReason::Stop,
        })
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        _format: OutputFormat,
        tx: mpsc::Sender<String>,
    ) -> Result<GenerationResult, LlmError> {
        let text = self.next(messages).await?;
        let mut tokens = 0;
        let mut finish_reason = FinishReason::Stop;
        for token in text.split_inclusive(' ') {
            tokens += 1;
            if tx.send(token.to_string()).await.is_err() {
                finish_reason = FinishReason::Cancelled;
                break;
            }
        }
        Ok(GenerationResult {
            text,
            tokens,
            time_to_first_token_ms: 0,
            total_time_ms: 0,
            finish_reason,
        })
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order() {
        let backend = ScriptedBackend::with_results(vec![
            Ok("first".into()),
            Err(LlmError::Network("refused".into())),
        ]);
        let msgs = [Message::user("q")];
        assert_eq!(backend.generate(&msgs, OutputFormat::Json).await.unwrap().text, "first");
        assert!(backend.generate(&msgs, OutputFormat::Json).await.is_err());
        assert!(matches!(
            backend.generate(&msgs, OutputFormat::Json).await,
            Err(LlmError::Api(_))
        ));
        assert_eq!(backend.calls(), 3);
    }
}
