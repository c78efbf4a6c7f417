//! Query orchestration for the DFIR assistant
//!
//! Features:
//! - Hybrid retrieval with query-dependent weights
//! - Confidence gate in front of generation
//! - Structured generation per intent with retry-with-feedback
//! - Command validation against the plugin registry
//! - Cancellation of in-flight requests
//! - Append-only audit record per request
//! - Markdown formatting for chat surfaces

pub mod assistant;
pub mod components;
pub mod formatter;
pub mod metrics;
pub mod traits;

pub use assistant::{AssistantComponents, DfirAssistant};
pub use components::{build_assistant, open_index};
pub use formatter::{FormattedResponse, ResponseFormatter};
pub use traits::{Assistant, Readiness};
