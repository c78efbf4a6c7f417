//! Structured generation with retry-with-feedback
//!
//! Asks the backend for JSON, validates it against the intent schema, and on
//! failure feeds the rejected answer and the validation errors back as the
//! next turn. Transport errors are not retried here; the backend already
//! retries transient ones.

use std::sync::Arc;

use tokio::sync::mpsc;

use dfir_core::{QueryIntent, ResponseBody};

use crate::backend::{GenerationResult, LlmBackend, OutputFormat};
use crate::prompt::{schema_feedback, Message};
use crate::schema::{IntentSchemas, SchemaViolation};
use crate::LlmError;

#[derive(Debug, Clone)]
pub struct StructuredOutput {
    pub body: ResponseBody,
    /// Raw text of the accepted answer
    pub raw: String,
    /// 1 when the first answer passed
    pub attempts: u32,
    pub generation: GenerationResult,
}

impl StructuredOutput {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

pub struct StructuredGenerator {
    backend: Arc<dyn LlmBackend>,
    schemas: Arc<IntentSchemas>,
    max_retries: u32,
}

impl StructuredGenerator {
    pub fn new(backend: Arc<dyn LlmBackend>, schemas: Arc<IntentSchemas>, max_retries: u32) -> Self {
        Self {
            backend,
            schemas,
            max_retries,
        }
    }

    pub fn backend(&self) -> &Arc<dyn LlmBackend> {
        &self.backend
    }

    pub async fn generate(&self, intent: QueryIntent, messages: Vec<Message>) -> Result<StructuredOutput, LlmError> {
        self.run(intent, messages, None).await
    }

    /// Like [`generate`](Self::generate), forwarding the first attempt's tokens to `tx`
    pub async fn generate_stream(
        &self,
        intent: QueryIntent,
        messages: Vec<Message>,
        tx: mpsc::Sender<String>,
    ) -> Result<StructuredOutput, LlmError> {
        self.run(intent, messages, Some(tx)).await
    }

    async fn run(
        &self,
        intent: QueryIntent,
        mut messages: Vec<Message>,
        mut tx: Option<mpsc::Sender<String>>,
    ) -> Result<StructuredOutput, LlmError> {
        let max_attempts = self.max_retries + 1;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let generation = match tx.take() {
                Some(tx) => {
                    self.backend
                        .generate_stream(&messages, OutputFormat::Json, tx)
                        .await?
                }
                None => self.backend.generate(&messages, OutputFormat::Json).await?,
            };

            match self.parse(intent, &generation.text) {
                Ok(body) => {
                    if attempt > 1 {
                        tracing::info!(intent = %intent, attempt, "Structured answer accepted after retry");
                    }
                    return Ok(StructuredOutput {
                        body,
                        raw: generation.text.clone(),
                        attempts: attempt,
                        generation,
                    });
                }
                Err(violation) => {
                    tracing::warn!(
                        intent = %intent,
                        attempt,
                        max_attempts,
                        errors = %violation,
                        "Structured answer rejected"
                    );
                    last_error = violation.to_string();
                    messages.push(Message::assistant(generation.text));
                    messages.push(schema_feedback(&last_error));
                }
            }
        }

        Err(LlmError::SchemaExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    fn parse(&self, intent: QueryIntent, text: &str) -> Result<ResponseBody, SchemaViolation> {
        let json = extract_json(text).ok_or_else(|| SchemaViolation {
            errors: vec!["No JSON object found in the answer".to_string()],
        })?;
        let value: serde_json::Value = serde_json::from_str(json).map_err(|e| SchemaViolation {
            errors: vec![format!("Invalid JSON: {}", e)],
        })?;
        self.schemas.validate(intent, &value)
    }
}

/// The outermost `{...}` span, ignoring any fences or chatter around it
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedBackend;

    const VALID_CONCEPT: &str = r#"{"summary": "VAD", "explanation": "Tracks memory ranges."}"#;

    fn generator(backend: Arc<ScriptedBackend>, retries: u32) -> StructuredGenerator {
        StructuredGenerator::new(backend, Arc::new(IntentSchemas::new().unwrap()), retries)
    }

    #[test]
    fn test_extract_json() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), Some("{\"a\": 1}"));
        assert_eq!(extract_json("Sure! {\"a\": {\"b\": 2}} done"), Some("{\"a\": {\"b\": 2}}"));
        assert_eq!(extract_json("no json"), None);
        assert_eq!(extract_json("} {"), None);
    }

    #[tokio::test]
    async fn test_first_answer_accepted() {
        let backend = Arc::new(ScriptedBackend::new(vec![VALID_CONCEPT]));
        let out = generator(backend.clone(), 2)
            .generate(QueryIntent::Concept, vec![Message::user("What is a VAD?")])
            .await
            .unwrap();
        assert_eq!(out.attempts, 1);
        assert_eq!(out.retries(), 0);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_with_feedback() {
        let backend = Arc::new(ScriptedBackend::new(vec![r#"{"summary": "VAD"}"#, VALID_CONCEPT]));
        let out = generator(backend.clone(), 2)
            .generate(QueryIntent::Concept, vec![Message::user("What is a VAD?")])
            .await
            .unwrap();
        assert_eq!(out.attempts, 2);

        let second = backend.requests().pop().unwrap();
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].content, r#"{"summary": "VAD"}"#);
        assert!(second[2].content.contains("explanation"));
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let backend = Arc::new(ScriptedBackend::new(vec!["not json", "still not", "nope"]));
        let err = generator(backend.clone(), 2)
            .generate(QueryIntent::ToolCommand, vec![Message::user("q")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::SchemaExhausted { attempts: 3, .. }));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_stream_forwards_first_attempt() {
        let backend = Arc::new(ScriptedBackend::new(vec![VALID_CONCEPT]));
        let (tx, mut rx) = mpsc::channel(64);
        let out = generator(backend, 0)
            .generate_stream(QueryIntent::Concept, vec![Message::user("q")], tx)
            .await
            .unwrap();
        let mut streamed = String::new();
        while let Some(token) = rx.recv().await {
            streamed.push_str(&token);
        }
        assert_eq!(streamed, out.raw);
    }
}
