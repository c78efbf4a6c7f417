//! Intents, structured answers and the final annotated response

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::command::{ValidatedCommand, ValidationSummary};
use crate::retrieval::{ConfidenceAssessment, SearchWeights};

/// Closed set of response shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    #[default]
    Concept,
    Anomaly,
    Procedure,
    ToolCommand,
}

impl QueryIntent {
    pub const ALL: [QueryIntent; 4] = [
        QueryIntent::Concept,
        QueryIntent::Anomaly,
        QueryIntent::Procedure,
        QueryIntent::ToolCommand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::Concept => "concept",
            QueryIntent::Anomaly => "anomaly",
            QueryIntent::Procedure => "procedure",
            QueryIntent::ToolCommand => "tool_command",
        }
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source attribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub chapter: Option<String>,
    pub section: Option<String>,
    pub page: Option<u32>,
    pub chunk_id: String,
    /// In [0, 1]
    pub relevance: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptAnswer {
    pub summary: String,
    pub explanation: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStep {
    pub question: String,
    pub if_yes: String,
    pub if_no: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAnswer {
    pub summary: String,
    pub legitimate_indicators: Vec<String>,
    pub malicious_indicators: Vec<String>,
    pub decision_tree: Vec<DecisionStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureStep {
    pub number: u32,
    pub action: String,
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureAnswer {
    pub summary: String,
    pub steps: Vec<ProcedureStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEntry {
    pub command: String,
    pub purpose: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCommandAnswer {
    pub summary: String,
    pub commands: Vec<CommandEntry>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Structured body of a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    Concept(ConceptAnswer),
    Anomaly(AnomalyAnswer),
    Procedure(ProcedureAnswer),
    ToolCommand(ToolCommandAnswer),
    /// Canonical low-confidence response
    InsufficientInformation { related_topics: Vec<String> },
}

impl ResponseBody {
    /// Render the body as the markdown answer text
    pub fn to_markdown(&self) -> String {
        match self {
            ResponseBody::Concept(a) => {
                let mut out = format!("**{}**\n\n{}", a.summary, a.explanation);
                if !a.key_points.is_empty() {
                    out.push_str("\n\n**Key points:**\n");
                    for point in &a.key_points {
                        out.push_str(&format!("- {}\n", point));
                    }
                }
                out.trim_end().to_string()
            }
            ResponseBody::Anomaly(a) => {
                let mut out = format!("**{}**\n\n", a.summary);
                out.push_str("| Legitimate | Malicious |\n|---|---|\n");
                let rows = a.legitimate_indicators.len().max(a.malicious_indicators.len());
                for i in 0..rows {
                    let legit = a.legitimate_indicators.get(i).map(String::as_str).unwrap_or("");
                    let bad = a.malicious_indicators.get(i).map(String::as_str).unwrap_or("");
                    out.push_str(&format!("| {} | {} |\n", legit, bad));
                }
                out.push_str("\n**Decision tree:**\n");
                for (i, step) in a.decision_tree.iter().enumerate() {
                    out.push_str(&format!(
                        "{}. {}\n   - Yes: {}\n   - No: {}\n",
                        i + 1,
                        step.question,
                        step.if_yes,
                        step.if_no
                    ));
                }
                out.trim_end().to_string()
            }
            ResponseBody::Procedure(a) => {
                let mut out = format!("**{}**\n\n", a.summary);
                for step in &a.steps {
                    out.push_str(&format!("{}. {}\n", step.number, step.action));
                    if let Some(command) = &step.command {
                        out.push_str(&format!("   ```\n   {}\n   ```\n", command));
                    }
                }
                out.trim_end().to_string()
            }
            ResponseBody::ToolCommand(a) => {
                let mut out = format!("**{}**\n\n", a.summary);
                for entry in &a.commands {
                    out.push_str(&format!("```\n{}\n```\n{}\n\n", entry.command, entry.purpose));
                }
                if let Some(notes) = &a.notes {
                    out.push_str(notes);
                }
                out.trim_end().to_string()
            }
            ResponseBody::InsufficientInformation { related_topics } => {
                crate::messages::insufficient_information_response(related_topics)
            }
        }
    }
}

/// How a request ended, as recorded in the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    LowConfidence,
    RetrievalFailed,
    GenerationFailed,
    Cancelled,
}

/// Final annotated response handed to the user-facing surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    pub request_id: Uuid,
    pub query: String,
    pub intent: QueryIntent,
    /// Markdown answer text (unmodified by command validation)
    pub answer: String,
    pub body: Option<ResponseBody>,
    pub citations: Vec<Citation>,
    pub confidence: ConfidenceAssessment,
    pub weights: SearchWeights,
    pub commands: Vec<ValidatedCommand>,
    pub validation: ValidationSummary,
    pub disclaimer: Option<String>,
    pub outcome: Outcome,
    /// Context builder dropped chunks to fit the budget
    pub context_trimmed: bool,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}
