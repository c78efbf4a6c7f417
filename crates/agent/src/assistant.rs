//! Query orchestration
//!
//! analyze → retrieve → confidence gate → context → structured generation →
//! command validation → audit. Every awaited stage races the request's
//! [`CancelToken`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use uuid::Uuid;

use dfir_core::{
    AssistantResponse, CancelToken, ConfidenceAssessment, Document, Error, Outcome, ResponseBody,
    Result, SearchResult, UserMessage, ValidationSummary, LOW_CONFIDENCE_DISCLAIMER, UNVERIFIED_COMMANDS_DISCLAIMER,
};
use dfir_llm::{PromptBuilder, StructuredGenerator, StructuredOutput};
use dfir_persistence::{AuditEntry, AuditLog};
use dfir_rag::{
    ConfidenceScorer, ContextBuilder, HybridRetriever, IndexStats, IngestReport,
    IngestionPipeline, QueryAnalysis, QueryAnalyzer, SearchFilter,
};
use dfir_validation::CommandValidator;

use crate::metrics;
use crate::traits::{Assistant, Readiness};

/// Related topics listed in the insufficient-information response
const MAX_RELATED_TOPICS: usize = 5;

/// Everything the assistant needs, wired by the caller
pub struct AssistantComponents {
    pub analyzer: QueryAnalyzer,
    pub retriever: HybridRetriever,
    pub scorer: ConfidenceScorer,
    pub context_builder: ContextBuilder,
    pub generator: StructuredGenerator,
    pub validator: CommandValidator,
    /// None for read-only deployments
    pub ingestion: Option<IngestionPipeline>,
    pub audit: Option<Arc<dyn AuditLog>>,
}

pub struct DfirAssistant {
    analyzer: QueryAnalyzer,
    retriever: HybridRetriever,
    scorer: ConfidenceScorer,
    context_builder: ContextBuilder,
    generator: StructuredGenerator,
    validator: CommandValidator,
    ingestion: Option<IngestionPipeline>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl DfirAssistant {
    pub fn new(components: AssistantComponents) -> Self {
        let AssistantComponents {
            analyzer,
            retriever,
            scorer,
            context_builder,
            generator,
            validator,
            ingestion,
            audit,
        } = components;

        Self {
            analyzer,
            retriever,
            scorer,
            context_builder,
            generator,
            validator,
            ingestion,
            audit,
        }
    }

    pub fn analyzer(&self) -> &QueryAnalyzer {
        &self.analyzer
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn validator(&self) -> &CommandValidator {
        &self.validator
    }

    async fn run(
        &self,
        request_id: Uuid,
        query: &str,
        tx: Option<mpsc::Sender<String>>,
        cancel: CancelToken,
    ) -> Result<AssistantResponse> {
        let started = Instant::now();
        let query = query.trim();
        let analysis = self.analyzer.analyze(query);

        tracing::info!(
            %request_id,
            intent = %analysis.intent,
            dense_weight = analysis.weights.dense,
            sparse_weight = analysis.weights.sparse,
            command_keyword = analysis.has_command_keyword,
            "Query analyzed"
        );

        let retrieved = cancel
            .run(async {
                self.retriever
                    .search(query, analysis.weights, &SearchFilter::default())
                    .await
                    .map_err(Error::from)
            })
            .await;

        let results = match retrieved {
            Ok(results) => results,
            Err(Error::Retrieval(reason)) => {
                tracing::warn!(%request_id, error = %reason, "Retrieval failed");
                metrics::record_error("retrieval");
                let mut response = draft(request_id, query, &analysis, ConfidenceAssessment::none());
                let body = ResponseBody::InsufficientInformation {
                    related_topics: Vec::new(),
                };
                response.answer = body.to_markdown();
                response.body = Some(body);
                response.disclaimer = Some(LOW_CONFIDENCE_DISCLAIMER.to_string());
                response.outcome = Outcome::RetrievalFailed;
                notify(tx.as_ref(), &response.answer).await;
                return Ok(self.finish(response, started, Some("retrieval")).await);
            }
            Err(e) => {
                return Err(self
                    .fail(request_id, query, &analysis, Outcome::RetrievalFailed, e, started)
                    .await)
            }
        };

        let confidence = self
            .scorer
            .assess(&results, self.retriever.index().document_count());
        let mut response = draft(request_id, query, &analysis, confidence);

        if confidence.is_low() {
            tracing::info!(
                %request_id,
                score = confidence.score,
                results = results.len(),
                "Confidence too low, answering with insufficient information"
            );
            let body = ResponseBody::InsufficientInformation {
                related_topics: related_topics(&results),
            };
            response.answer = body.to_markdown();
            response.body = Some(body);
            response.disclaimer = Some(LOW_CONFIDENCE_DISCLAIMER.to_string());
            response.outcome = Outcome::LowConfidence;
            notify(tx.as_ref(), &response.answer).await;
            return Ok(self.finish(response, started, None).await);
        }

        let context = self.context_builder.build(&results);
        if context.was_trimmed() {
            tracing::warn!(
                %request_id,
                included = context.included,
                trimmed = context.trimmed.len(),
                tokens = context.token_estimate,
                "Context trimmed to fit the token budget"
            );
        }
        response.context_trimmed = context.was_trimmed();

        let messages = PromptBuilder::new()
            .system_prompt()
            .with_intent(analysis.intent)
            .with_context(&context.text)
            .user_message(query)
            .build();

        let generated = cancel
            .run(async {
                let output = match tx.clone() {
                    Some(tx) => {
                        self.generator
                            .generate_stream(analysis.intent, messages, tx)
                            .await
                    }
                    None => self.generator.generate(analysis.intent, messages).await,
                };
                output.map_err(Error::from)
            })
            .await;

        let output: StructuredOutput = match generated {
            Ok(output) => output,
            Err(Error::Generation(reason)) => {
                tracing::error!(%request_id, error = %reason, "Generation failed");
                metrics::record_error("generation");
                response.answer = UserMessage::GenerationFailed.render();
                response.outcome = Outcome::GenerationFailed;
                notify(tx.as_ref(), &response.answer).await;
                return Ok(self.finish(response, started, Some("generation")).await);
            }
            Err(e) => {
                return Err(self
                    .fail(request_id, query, &analysis, Outcome::GenerationFailed, e, started)
                    .await)
            }
        };
        metrics::record_retries(output.retries());

        let answer = output.body.to_markdown();
        let report = self.validator.validate_text(&answer);
        if report.summary.invalid > 0 {
            response.disclaimer = Some(UNVERIFIED_COMMANDS_DISCLAIMER.to_string());
        }

        response.answer = answer;
        response.body = Some(output.body);
        response.citations = context.citations;
        response.validation = report.summary;
        response.commands = report.commands;

        tracing::info!(
            %request_id,
            confidence = %response.confidence.level,
            attempts = output.attempts,
            commands = response.validation.total,
            invalid_commands = response.validation.invalid,
            "Answer generated"
        );

        Ok(self.finish(response, started, None).await)
    }

    async fn finish(
        &self,
        mut response: AssistantResponse,
        started: Instant,
        error_kind: Option<&str>,
    ) -> AssistantResponse {
        response.latency_ms = started.elapsed().as_millis() as u64;
        metrics::record_response(&response);

        let mut entry = AuditEntry::from_response(&response);
        if let Some(kind) = error_kind {
            entry = entry.with_error_kind(kind);
        }
        self.audit(&entry).await;
        response
    }

    /// Record a request that ends in an error and hand the error back
    async fn fail(
        &self,
        request_id: Uuid,
        query: &str,
        analysis: &QueryAnalysis,
        stage: Outcome,
        error: Error,
        started: Instant,
    ) -> Error {
        let outcome = match error {
            Error::Cancelled => {
                tracing::info!(%request_id, "Request cancelled");
                Outcome::Cancelled
            }
            ref e => {
                tracing::error!(%request_id, error = %e, kind = e.kind(), "Request failed");
                stage
            }
        };
        metrics::record_error(error.kind());

        let mut entry = AuditEntry::new(request_id, query, outcome)
            .with_error_kind(error.kind())
            .with_latency(started.elapsed().as_millis() as u64);
        entry.intent = Some(analysis.intent);
        entry.weights = Some(analysis.weights);
        entry.response = error.user_message().render();
        self.audit(&entry).await;

        error
    }

    async fn audit(&self, entry: &AuditEntry) {
        let Some(log) = &self.audit else {
            return;
        };
        if let Err(e) = log.append(entry).await {
            tracing::error!(request_id = %entry.request_id, error = %e, "Audit write failed");
            metrics::record_error("audit");
        }
    }
}

#[async_trait]
impl Assistant for DfirAssistant {
    async fn answer(&self, request_id: Uuid, query: &str, cancel: CancelToken) -> Result<AssistantResponse> {
        self.run(request_id, query, None, cancel).await
    }

    async fn answer_stream(
        &self,
        request_id: Uuid,
        query: &str,
        tx: mpsc::Sender<String>,
        cancel: CancelToken,
    ) -> Result<AssistantResponse> {
        self.run(request_id, query, Some(tx), cancel).await
    }

    async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let pipeline = self
            .ingestion
            .as_ref()
            .ok_or_else(|| Error::Configuration("Ingestion is not enabled".to_string()))?;

        let report = pipeline.ingest(document).await.map_err(|e| {
            let e = Error::from(e);
            metrics::record_error(e.kind());
            e
        })?;
        metrics::record_ingest();
        Ok(report)
    }

    async fn index_stats(&self) -> Result<IndexStats> {
        Ok(self.retriever.index().stats().await?)
    }

    async fn readiness(&self) -> Readiness {
        let index = self.retriever.index();
        let (llm, index_ok) = tokio::join!(self.generator.backend().is_available(), index.health_check());
        if let Err(ref e) = index_ok {
            tracing::warn!(error = %e, "Index health check failed");
        }
        Readiness {
            llm,
            index: index_ok.is_ok(),
            documents: index.document_count(),
        }
    }
}

fn draft(
    request_id: Uuid,
    query: &str,
    analysis: &QueryAnalysis,
    confidence: ConfidenceAssessment,
) -> AssistantResponse {
    AssistantResponse {
        request_id,
        query: query.to_string(),
        intent: analysis.intent,
        answer: String::new(),
        body: None,
        citations: Vec::new(),
        confidence,
        weights: analysis.weights,
        commands: Vec::new(),
        validation: ValidationSummary::from_commands(&[]),
        disclaimer: None,
        outcome: Outcome::Answered,
        context_trimmed: false,
        latency_ms: 0,
        timestamp: Utc::now(),
    }
}

/// Distinct locations of the weak matches, best first
fn related_topics(results: &[SearchResult]) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    for topic in results.iter().map(SearchResult::topic) {
        if !topics.contains(&topic) {
            topics.push(topic);
        }
        if topics.len() == MAX_RELATED_TOPICS {
            break;
        }
    }
    topics
}

/// Push a non-streamed answer to a streaming caller
async fn notify(tx: Option<&mpsc::Sender<String>>, text: &str) {
    if let Some(tx) = tx {
        // Receiver gone means the client left; the response is still audited
        let _ = tx.send(text.to_string()).await;
    }
}
