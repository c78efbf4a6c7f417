//! Prompt context assembly
//!
//! Concatenates ranked chunks behind source delimiters within a token budget.
//! Lowest-ranked chunks go first when the budget is exceeded, and every trim
//! is recorded.

use serde::Serialize;

use dfir_config::ContextSettings;
use dfir_core::{Citation, SearchResult};

use crate::chunker::estimate_tokens;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrimmedChunk {
    pub citation: Citation,
    pub rank: usize,
    pub token_estimate: usize,
    /// Kept but cut short rather than dropped
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuiltContext {
    pub text: String,
    /// One per included chunk, in rank order
    pub citations: Vec<Citation>,
    pub included: usize,
    pub trimmed: Vec<TrimmedChunk>,
    pub token_estimate: usize,
}

impl BuiltContext {
    pub fn was_trimmed(&self) -> bool {
        !self.trimmed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    token_budget: usize,
    chars_per_token: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::from(&ContextSettings::default())
    }
}

impl From<&ContextSettings> for ContextBuilder {
    fn from(settings: &ContextSettings) -> Self {
        Self::new(
            settings.token_budget,
            dfir_config::constants::chunking::CHARS_PER_TOKEN,
        )
    }
}

pub fn citation(result: &SearchResult) -> Citation {
    Citation {
        title: result.title.clone(),
        chapter: result.chapter.clone(),
        section: result.section.clone(),
        page: result.page,
        chunk_id: result.chunk_id.clone(),
        relevance: result.score.clamp(0.0, 1.0),
    }
}

impl ContextBuilder {
    pub fn new(token_budget: usize, chars_per_token: usize) -> Self {
        Self {
            token_budget,
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    fn header(n: usize, result: &SearchResult) -> String {
        let mut header = format!("[Source {}: {}", n, result.title);
        if let Some(ref chapter) = result.chapter {
            header.push_str(&format!(" | Chapter: {}", chapter));
        }
        if let Some(ref section) = result.section {
            header.push_str(&format!(" | Section: {}", section));
        }
        if let Some(page) = result.page {
            header.push_str(&format!(" | Page: {}", page));
        }
        header.push_str(&format!(" | relevance {:.2}]", result.score));
        header
    }

    /// Build from results in rank order
    pub fn build(&self, results: &[SearchResult]) -> BuiltContext {
        let mut context = BuiltContext::default();
        let mut blocks: Vec<String> = Vec::with_capacity(results.len());
        let mut full = false;

        for (rank, result) in results.iter().enumerate() {
            let block = format!("{}\n{}", Self::header(rank + 1, result), result.text.trim());
            let tokens = estimate_tokens(&block, self.chars_per_token);

            if !full && context.token_estimate + tokens <= self.token_budget {
                context.token_estimate += tokens;
                context.citations.push(citation(result));
                blocks.push(block);
                continue;
            }

            if blocks.is_empty() {
                // The top chunk alone is over budget: keep a cut-down copy
                let max_chars = self.token_budget * self.chars_per_token;
                let cut: String = block.chars().take(max_chars).collect();
                context.token_estimate = estimate_tokens(&cut, self.chars_per_token);
                context.citations.push(citation(result));
                context.trimmed.push(TrimmedChunk {
                    citation: citation(result),
                    rank: rank + 1,
                    token_estimate: tokens,
                    truncated: true,
                });
                blocks.push(cut);
                full = true;
                continue;
            }

            // Everything ranked below the first trim goes too
            full = true;
            context.trimmed.push(TrimmedChunk {
                citation: citation(result),
                rank: rank + 1,
                token_estimate: tokens,
                truncated: false,
            });
        }

        context.included = blocks.len();
        context.text = blocks.join("\n\n");

        if context.was_trimmed() {
            tracing::warn!(
                included = context.included,
                trimmed = context.trimmed.len(),
                budget = self.token_budget,
                "Context trimmed to fit token budget"
            );
        }

        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfir_core::SourceType;

    fn result(id: &str, text: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: id.into(),
            document_id: "aomf".into(),
            title: "The Art of Memory Forensics".into(),
            chapter: Some("Processes".into()),
            section: None,
            page: Some(12),
            source_type: SourceType::Book,
            text: text.into(),
            dense_score: score,
            sparse_score: None,
            rerank_score: None,
            hybrid_score: score,
            score,
            document_order: 0,
            chunk_index: 0,
        }
    }

    #[test]
    fn test_delimiters_and_citations() {
        let ctx = ContextBuilder::default().build(&[
            result("a", "EPROCESS blocks.", 0.91),
            result("b", "PEB fields.", 0.6),
        ]);
        assert!(ctx.text.starts_with(
            "[Source 1: The Art of Memory Forensics | Chapter: Processes | Page: 12 | relevance 0.91]\nEPROCESS blocks."
        ));
        assert!(ctx.text.contains("[Source 2: "));
        assert!(!ctx.text.contains("Section:"));
        assert_eq!(ctx.included, 2);
        assert_eq!(ctx.citations.len(), 2);
        assert!(!ctx.was_trimmed());
    }

    #[test]
    fn test_lowest_ranked_trimmed_first() {
        let body = "x".repeat(400);
        let results: Vec<_> = (0..4).map(|i| result(&format!("c{i}"), &body, 0.9 - i as f32 * 0.1)).collect();
        // each block is roughly 125 tokens
        let ctx = ContextBuilder::new(260, 4).build(&results);
        assert_eq!(ctx.included, 2);
        assert_eq!(ctx.trimmed.len(), 2);
        assert_eq!(ctx.trimmed[0].citation.chunk_id, "c2");
        assert_eq!(ctx.trimmed[1].rank, 4);
        assert!(ctx.token_estimate <= 260);
        assert!(ctx.trimmed.iter().all(|t| !t.truncated));
    }

    #[test]
    fn test_oversized_top_chunk_truncated() {
        let ctx = ContextBuilder::new(10, 4).build(&[result("big", &"y".repeat(500), 0.8)]);
        assert_eq!(ctx.included, 1);
        assert!(ctx.trimmed[0].truncated);
        assert!(ctx.text.chars().count() <= 40);
        assert_eq!(ctx.citations[0].chunk_id, "big");
    }

    #[test]
    fn test_empty_results() {
        let ctx = ContextBuilder::default().build(&[]);
        assert!(ctx.text.is_empty());
        assert_eq!(ctx.included, 0);
    }
}
