//! Query Analyzer
//!
//! Rule-based and stateless: picks the dense/sparse weighting and the answer
//! intent for a query. The same query string always gives the same analysis.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::Serialize;

use dfir_core::{QueryIntent, SearchWeights};

use crate::text;

/// Words that mark a question about tool usage
static COMMAND_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "vol", "vol.py", "volatility", "volatility3", "command", "commands", "plugin", "plugins",
        "syntax", "flag", "flags",
    ]
    .into_iter()
    .collect()
});

/// Plugin namespaces
const PLUGIN_NAMESPACES: &[&str] = &["windows.", "linux.", "mac."];

/// Registry plugin names that are also everyday words
const AMBIGUOUS_PLUGIN_NAMES: &[&str] = &["handles", "connections", "sockets", "modules", "consoles"];

const INTERROGATIVES: &[&str] = &["how", "why", "what", "explain"];

const ANOMALY_MARKERS: &[&str] = &[
    "suspicious", "malicious", "anomal", "injected", "normal", "legitimate", "hollow",
];

const PROCEDURE_MARKERS: &[&str] = &["how do i", "how to", "steps", "procedure", "investigate", "workflow"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnalysis {
    pub weights: SearchWeights,
    pub intent: QueryIntent,
    /// Content terms, stopwords removed
    pub terms: Vec<String>,
    pub has_command_keyword: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QueryAnalyzer {
    plugin_keywords: HashSet<String>,
}

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat these plugin names (lowercase) as command keywords
    pub fn with_plugin_keywords<I>(keywords: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let plugin_keywords = keywords
            .into_iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !AMBIGUOUS_PLUGIN_NAMES.contains(&k.as_str()))
            .collect();
        Self { plugin_keywords }
    }

    pub fn analyze(&self, query: &str) -> QueryAnalysis {
        let lower = query.to_lowercase();
        let terms = text::unique_terms(query);
        let has_command_keyword = self.has_command_keyword(&lower, &terms);

        let weights = if has_command_keyword {
            SearchWeights::COMMAND
        } else if is_interrogative(&lower) {
            SearchWeights::BALANCED
        } else {
            SearchWeights::DEFAULT
        };

        let intent = classify(&lower, has_command_keyword);

        tracing::debug!(
            dense = weights.dense,
            sparse = weights.sparse,
            intent = %intent,
            has_command_keyword,
            "Analyzed query"
        );

        QueryAnalysis {
            weights,
            intent,
            terms,
            has_command_keyword,
        }
    }

    pub fn weights(&self, query: &str) -> SearchWeights {
        self.analyze(query).weights
    }

    pub fn classify_intent(&self, query: &str) -> QueryIntent {
        self.analyze(query).intent
    }

    fn has_command_keyword(&self, lower: &str, terms: &[String]) -> bool {
        words(lower).any(|w| COMMAND_WORDS.contains(w))
            || PLUGIN_NAMESPACES.iter().any(|ns| lower.contains(ns))
            || terms.iter().any(|t| self.plugin_keywords.contains(t))
    }
}

/// Lowercase words, keeping dots inside names such as `vol.py`
fn words(lower: &str) -> impl Iterator<Item = &str> {
    lower
        .split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '_'))
        .map(|w| w.trim_matches('.'))
        .filter(|w| !w.is_empty())
}

fn is_interrogative(lower: &str) -> bool {
    words(lower).any(|w| INTERROGATIVES.contains(&w))
}

fn classify(lower: &str, has_command_keyword: bool) -> QueryIntent {
    if has_command_keyword {
        QueryIntent::ToolCommand
    } else if ANOMALY_MARKERS.iter().any(|m| lower.contains(m)) {
        QueryIntent::Anomaly
    } else if PROCEDURE_MARKERS.iter().any(|m| lower.contains(m)) {
        QueryIntent::Procedure
    } else {
        QueryIntent::Concept
    }
}
