//! Markdown rendering of an [`AssistantResponse`] for chat surfaces

use serde::Serialize;

use dfir_core::{AssistantResponse, Citation, ConfidenceLevel, ValidatedCommand};

/// Rendered response parts
#[derive(Debug, Clone, Serialize)]
pub struct FormattedResponse {
    pub confidence_indicator: String,
    /// Answer text plus the command verification footer
    pub content: String,
    pub command_warnings: Vec<String>,
    pub sources: String,
}

impl FormattedResponse {
    /// Everything joined in display order
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        if !self.confidence_indicator.is_empty() {
            out.push_str(&self.confidence_indicator);
            out.push_str("\n\n---\n\n");
        }
        out.push_str(&self.content);
        if !self.command_warnings.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.command_warnings.join("\n"));
        }
        if !self.sources.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.sources);
        }
        out
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseFormatter;

impl ResponseFormatter {
    pub fn new() -> Self {
        Self
    }

    pub fn confidence_indicator(level: ConfidenceLevel) -> &'static str {
        match level {
            ConfidenceLevel::High => "🟢 High Confidence",
            ConfidenceLevel::Medium => "🟡 Medium Confidence",
            ConfidenceLevel::Low => "🔴 Low Confidence",
        }
    }

    pub fn format(&self, response: &AssistantResponse) -> FormattedResponse {
        let mut confidence_indicator =
            Self::confidence_indicator(response.confidence.level).to_string();
        if let Some(ref disclaimer) = response.disclaimer {
            confidence_indicator.push_str("\n\n");
            confidence_indicator.push_str(disclaimer);
        }

        let mut content = response.answer.clone();
        if let Some(footer) = command_footer(&response.commands) {
            content.push_str("\n\n");
            content.push_str(&footer);
        }

        FormattedResponse {
            confidence_indicator,
            content,
            command_warnings: command_warnings(&response.commands),
            sources: format_sources(&response.citations),
        }
    }

    pub fn render(&self, response: &AssistantResponse) -> String {
        self.format(response).to_markdown()
    }
}

fn command_footer(commands: &[ValidatedCommand]) -> Option<String> {
    let total = commands.len();
    if total == 0 {
        return None;
    }
    let valid = commands.iter().filter(|c| c.is_valid).count();
    Some(if valid == total {
        format!("✅ *All {} Volatility commands verified*", total)
    } else {
        format!("⚠️ *{}/{} commands verified*", valid, total)
    })
}

fn command_warnings(commands: &[ValidatedCommand]) -> Vec<String> {
    let invalid: Vec<&ValidatedCommand> = commands.iter().filter(|c| !c.is_valid).collect();
    if invalid.is_empty() {
        return Vec::new();
    }

    let mut lines = vec!["---".to_string(), "⚠️ **Command Validation Warnings:**".to_string()];
    for cmd in invalid {
        let note = if cmd.note.is_empty() { "Unknown plugin" } else { cmd.note.as_str() };
        lines.push(format!("- `{}`: {}", cmd.plugin, note));
    }
    lines
}

fn format_sources(citations: &[Citation]) -> String {
    if citations.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "<details>".to_string(),
        "<summary>📚 Sources</summary>".to_string(),
        String::new(),
    ];
    for (i, c) in citations.iter().enumerate() {
        let relevance_pct = (c.relevance * 100.0).round() as u32;
        lines.push(format!("**{}. {}** ({}% relevant)", i + 1, c.title, relevance_pct));

        let mut location = Vec::new();
        if let Some(ref chapter) = c.chapter {
            location.push(format!("Chapter: {}", chapter));
        }
        if let Some(ref section) = c.section {
            location.push(format!("Section: {}", section));
        }
        if let Some(page) = c.page {
            location.push(format!("Page {}", page));
        }
        if !location.is_empty() {
            lines.push(format!("   {}", location.join(", ")));
        }
        lines.push(String::new());
    }
    lines.push("</details>".to_string());
    lines.join("\n")
}
