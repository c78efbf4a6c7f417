//! Prompt Building and Management
//!
//! Constructs grounded prompts for the DFIR assistant: a fixed system prompt,
//! the intent's answer format, the retrieved context, then the question.

use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use dfir_core::QueryIntent;

use crate::schema::IntentSchemas;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

const SYSTEM_PROMPT: &str = r#"You are a senior digital forensics and incident response (DFIR) analyst assisting another investigator.

## Grounding Rules
- Answer ONLY from the numbered sources provided in the context.
- If the sources do not cover the question, say so in the summary instead of guessing.
- Never invent Volatility plugins, flags or file paths. Use only commands that appear in the sources.
- Prefer Volatility 3 syntax (`vol -f <image> windows.<plugin>`) unless the sources only show Volatility 2.
- Be precise about artefacts: process names, parent/child relationships, registry keys, offsets.

## Output
Respond with a single JSON object and nothing else. No markdown fences, no commentary."#;

fn intent_instructions(intent: QueryIntent) -> &'static str {
    match intent {
        QueryIntent::Concept => {
            "Explain the concept. Fields: \"summary\" (one sentence), \"explanation\" (a few paragraphs), \
             \"key_points\" (optional list of short strings)."
        }
        QueryIntent::Anomaly => {
            "Compare normal and suspicious behaviour. Fields: \"summary\", \"legitimate_indicators\" \
             (list), \"malicious_indicators\" (list), \"decision_tree\" (list of objects with \
             \"question\", \"if_yes\", \"if_no\")."
        }
        QueryIntent::Procedure => {
            "Give an investigation procedure. Fields: \"summary\", \"steps\" (list of objects with \
             \"number\" starting at 1 and increasing, \"action\", and \"command\" when a tool is run). \
             At least one step must carry a command."
        }
        QueryIntent::ToolCommand => {
            "Give the exact tool commands. Fields: \"summary\", \"commands\" (list of objects with \
             \"command\" and \"purpose\"), optional \"notes\"."
        }
    }
}

/// Prompt builder for the DFIR assistant
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn system_prompt(mut self) -> Self {
        self.messages.push(Message::system(SYSTEM_PROMPT));
        self
    }

    /// Answer format for the intent, with its JSON schema attached
    pub fn with_intent(mut self, intent: QueryIntent) -> Self {
        let schema = serde_json::to_string_pretty(IntentSchemas::schema_json(intent)).unwrap_or_default();
        self.messages.push(Message::system(format!(
            "## Answer Format ({})\n{}\n\nJSON schema:\n{}",
            intent,
            intent_instructions(intent),
            schema
        )));
        self
    }

    /// Add the retrieved sources
    pub fn with_context(mut self, context: &str) -> Self {
        if !context.is_empty() {
            self.messages.push(Message::system(format!(
                "## Sources\n{}\n\nCite facts from these sources only.",
                context
            )));
        }
        self
    }

    pub fn user_message(mut self, message: &str) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    pub fn build(self) -> Vec<Message> {
        self.messages
    }

    /// Build with a token ceiling
    ///
    /// System messages are kept; the oldest non-system messages are dropped
    /// first.
    pub fn build_with_limit(self, max_tokens: usize) -> Vec<Message> {
        let current_tokens = self.estimate_tokens();
        if current_tokens <= max_tokens {
            return self.messages;
        }

        let (system_msgs, conv_msgs): (Vec<_>, Vec<_>) = self
            .messages
            .into_iter()
            .partition(|m| matches!(m.role, Role::System));

        let system_tokens: usize = system_msgs.iter().map(|m| estimate_tokens(&m.content)).sum();
        let available_tokens = max_tokens.saturating_sub(system_tokens);

        let mut kept: Vec<Message> = Vec::new();
        let mut used_tokens = 0;
        for msg in conv_msgs.into_iter().rev() {
            let tokens = estimate_tokens(&msg.content);
            if used_tokens + tokens > available_tokens {
                break;
            }
            used_tokens += tokens;
            kept.push(msg);
        }
        kept.reverse();

        tracing::debug!(
            before = current_tokens,
            after = system_tokens + used_tokens,
            "Prompt truncated"
        );

        let mut result = system_msgs;
        result.extend(kept);
        result
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn estimate_tokens(&self) -> usize {
        self.messages.iter().map(|m| estimate_tokens(&m.content)).sum()
    }
}

/// Roughly four graphemes per token
pub fn estimate_tokens(text: &str) -> usize {
    text.graphemes(true).count().max(1) / 4
}

/// Feedback turn after an answer failed validation
pub fn schema_feedback(errors: &str) -> Message {
    Message::user(format!(
        "Your previous answer was rejected: {}\nReturn a corrected JSON object that satisfies the schema. \
         Output only the JSON object.",
        errors
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
    }

    #[test]
    fn test_prompt_order() {
        let messages = PromptBuilder::new()
            .system_prompt()
            .with_intent(QueryIntent::Procedure)
            .with_context("[Source 1: AoMF]\npslist walks EPROCESS.")
            .user_message("How do I find hidden processes?")
            .build();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("ONLY from the numbered sources"));
        assert!(messages[1].content.contains("\"steps\""));
        assert!(messages[2].content.contains("[Source 1: AoMF]"));
        assert_eq!(messages[3].role, Role::User);
    }

    #[test]
    fn test_empty_context_skipped() {
        let messages = PromptBuilder::new()
            .system_prompt()
            .with_context("")
            .user_message("q")
            .build();
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_build_with_limit_keeps_system() {
        let long = "word ".repeat(400);
        let messages = PromptBuilder::new()
            .system_prompt()
            .user_message(&long)
            .user_message("latest question")
            .build_with_limit(300);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages.last().unwrap().content, "latest question");
        assert!(!messages.iter().any(|m| m.content == long));
    }

    #[test]
    fn test_feedback_message() {
        let msg = schema_feedback("steps: missing");
        assert_eq!(msg.role, Role::User);
        assert!(msg.content.contains("steps: missing"));
    }
}
