//! Pre-approved user-facing messages
//!
//! Internal error text never reaches the user. Every failure path ends in one
//! of these messages, each carrying its disclaimer icon.

use serde::{Deserialize, Serialize};

/// Opening line of the canonical low-confidence response
pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have specific information about this in my knowledge base.";

/// Disclaimer attached to LOW confidence responses
pub const LOW_CONFIDENCE_DISCLAIMER: &str = "⚠️ Low confidence - please verify this response";

/// Disclaimer attached when any generated command failed validation
pub const UNVERIFIED_COMMANDS_DISCLAIMER: &str =
    "⚠️ Commands should be verified before execution";

/// Catalogue of messages the assistant may show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserMessage {
    InsufficientInformation,
    GenerationFailed,
    ServiceUnavailable,
    ServiceMisconfigured,
    CommandsUnverified,
    Cancelled,
}

impl UserMessage {
    pub fn icon(&self) -> &'static str {
        match self {
            UserMessage::InsufficientInformation => "🔍",
            UserMessage::GenerationFailed => "🤖",
            UserMessage::ServiceUnavailable => "🔌",
            UserMessage::ServiceMisconfigured => "⚙️",
            UserMessage::CommandsUnverified => "⚠️",
            UserMessage::Cancelled => "⏹️",
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            UserMessage::InsufficientInformation => INSUFFICIENT_INFORMATION,
            UserMessage::GenerationFailed => {
                "I couldn't produce a reliable answer this time. Please try again or rephrase \
                 your question."
            }
            UserMessage::ServiceUnavailable => {
                "A backing service is not responding right now. Please try again shortly."
            }
            UserMessage::ServiceMisconfigured => {
                "The assistant is not configured correctly. Please contact the administrator."
            }
            UserMessage::CommandsUnverified => UNVERIFIED_COMMANDS_DISCLAIMER,
            UserMessage::Cancelled => "Generation stopped.",
        }
    }

    /// Icon and text, as rendered in the chat surface
    pub fn render(&self) -> String {
        format!("{} {}", self.icon(), self.text())
    }
}

/// Canonical response returned whenever confidence is LOW.
///
/// Related topics come from whatever weak matches retrieval produced; they are
/// suggestions for rephrasing, never evidence.
pub fn insufficient_information_response(related_topics: &[String]) -> String {
    let mut out = String::from(INSUFFICIENT_INFORMATION);
    out.push_str(
        "\n\nRather than guess, I'd suggest verifying with the tool documentation or \
         rephrasing with more specific terms (plugin names, artifact types, OS).",
    );
    if !related_topics.is_empty() {
        out.push_str("\n\nRelated topics in the knowledge base:\n");
        for topic in related_topics {
            out.push_str("- ");
            out.push_str(topic);
            out.push('\n');
        }
        out.truncate(out.trim_end().len());
    }
    out
}
