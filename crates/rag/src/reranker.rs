//! Reranking
//!
//! Second pass over the hybrid candidates that looks at query and chunk text
//! together instead of scoring them independently.
//!
//! [`LexicalReranker`] approximates a cross-encoder with three interaction
//! signals:
//! 1. **Weighted coverage**: share of query terms found in the chunk, longer
//!    (more specific) terms weighing more
//! 2. **Adjacency**: query bigrams that appear adjacent in the chunk
//! 3. **Exact tool tokens**: dotted plugin names from the query present verbatim

use std::collections::HashSet;

use dfir_core::SearchResult;

use crate::text;

pub trait Reranker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Query/chunk relevance in [0, 1]
    fn score(&self, query: &str, result: &SearchResult) -> f32;

    /// Fill `rerank_score` and blend into `score`; the caller re-sorts
    fn rerank(&self, query: &str, results: &mut [SearchResult], weight: f32) {
        let weight = weight.clamp(0.0, 1.0);
        for result in results.iter_mut() {
            let rerank = self.score(query, result);
            result.rerank_score = Some(rerank);
            result.score = (1.0 - weight) * result.hybrid_score + weight * rerank;
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalReranker;

impl LexicalReranker {
    const COVERAGE_WEIGHT: f32 = 0.6;
    const ADJACENCY_WEIGHT: f32 = 0.25;
    const EXACT_WEIGHT: f32 = 0.15;

    pub fn new() -> Self {
        Self
    }

    /// Score raw text against a query
    pub fn score_text(&self, query: &str, document: &str) -> f32 {
        let query_terms = text::unique_terms(query);
        if query_terms.is_empty() {
            return 0.0;
        }

        let doc_terms = text::terms(document);
        let doc_set: HashSet<&str> = doc_terms.iter().map(String::as_str).collect();

        let coverage = weighted_coverage(&query_terms, &doc_set);
        let adjacency = adjacency(&query_terms, &doc_terms).unwrap_or(coverage);

        let tool_tokens: Vec<&String> = query_terms.iter().filter(|t| t.contains('.')).collect();
        let exact = if tool_tokens.is_empty() {
            coverage
        } else {
            let found = tool_tokens
                .iter()
                .filter(|t| doc_set.contains(t.as_str()))
                .count();
            found as f32 / tool_tokens.len() as f32
        };

        (Self::COVERAGE_WEIGHT * coverage
            + Self::ADJACENCY_WEIGHT * adjacency
            + Self::EXACT_WEIGHT * exact)
            .clamp(0.0, 1.0)
    }
}

impl Reranker for LexicalReranker {
    fn name(&self) -> &'static str {
        "lexical"
    }

    fn score(&self, query: &str, result: &SearchResult) -> f32 {
        let mut document = String::with_capacity(result.text.len() + 64);
        if let Some(ref section) = result.section {
            document.push_str(section);
            document.push('\n');
        }
        document.push_str(&result.text);
        self.score_text(query, &document)
    }
}

/// Query term matches a chunk term exactly or as a shared stem
fn term_found(term: &str, doc_set: &HashSet<&str>) -> bool {
    if doc_set.contains(term) {
        return true;
    }
    // "processes" / "process", "injected" / "injection"
    term.len() >= 5
        && doc_set.iter().any(|d| {
            d.len() >= 5 && {
                let common = term
                    .chars()
                    .zip(d.chars())
                    .take_while(|(a, b)| a == b)
                    .count();
                common >= 5 && common * 3 >= term.len().max(d.len()) * 2
            }
        })
}

fn weighted_coverage(query_terms: &[String], doc_set: &HashSet<&str>) -> f32 {
    let mut total = 0.0f32;
    let mut matched = 0.0f32;
    for term in query_terms {
        let weight = (1.0 + term.len() as f32).ln();
        total += weight;
        if term_found(term, doc_set) {
            matched += weight;
        }
    }
    if total == 0.0 {
        0.0
    } else {
        matched / total
    }
}

/// Share of query bigrams adjacent in the document; None for single-term queries
fn adjacency(query_terms: &[String], doc_terms: &[String]) -> Option<f32> {
    if query_terms.len() < 2 {
        return None;
    }
    let doc_pairs: HashSet<(&str, &str)> = doc_terms
        .windows(2)
        .map(|w| (w[0].as_str(), w[1].as_str()))
        .collect();
    let pairs = query_terms.len() - 1;
    let found = query_terms
        .windows(2)
        .filter(|w| doc_pairs.contains(&(w[0].as_str(), w[1].as_str())))
        .count();
    Some(found as f32 / pairs as f32)
}
