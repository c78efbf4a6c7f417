//! Core types for the DFIR assistant
//!
//! This crate provides foundational types used across all other crates:
//! - Documents, chunks and chunk ids
//! - Search results, weights and confidence assessments
//! - Validated commands and validation summaries
//! - Intents, structured answers and the final response
//! - Error taxonomy and the pre-approved user-facing messages
//! - Retry policy and request cancellation

pub mod cancel;
pub mod command;
pub mod document;
pub mod error;
pub mod messages;
pub mod response;
pub mod retrieval;
pub mod retry;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use command::{Dialect, ValidatedCommand, ValidationSummary};
pub use document::{chunk_id, Chunk, Document, SourceType};
pub use error::{Error, Result};
pub use messages::{
    insufficient_information_response, UserMessage, INSUFFICIENT_INFORMATION,
    LOW_CONFIDENCE_DISCLAIMER, UNVERIFIED_COMMANDS_DISCLAIMER,
};
pub use response::{
    AnomalyAnswer, AssistantResponse, Citation, CommandEntry, ConceptAnswer, DecisionStep,
    Outcome, ProcedureAnswer, ProcedureStep, QueryIntent, ResponseBody, ToolCommandAnswer,
};
pub use retrieval::{ConfidenceAssessment, ConfidenceLevel, SearchResult, SearchWeights};
pub use retry::RetryPolicy;
