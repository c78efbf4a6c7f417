//! Term extraction shared by the analyzer, reranker and test embedder

use std::collections::HashSet;

use once_cell::sync::Lazy;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "how",
        "i", "if", "in", "is", "it", "its", "me", "my", "of", "on", "or", "should", "that", "the",
        "this", "to", "was", "what", "when", "where", "which", "who", "why", "will", "with", "you",
    ]
    .into_iter()
    .collect()
});

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(word)
}

/// Lowercased content terms in order of appearance
///
/// Dotted tool names such as `windows.pslist` are kept whole and also split,
/// so `pslist` matches `windows.pslist`.
pub fn terms(text: &str) -> Vec<String> {
    let mut out = Vec::new();

    for raw in text.split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '_')) {
        let word = raw.trim_matches('.').to_lowercase();
        if word.is_empty() {
            continue;
        }

        if word.contains('.') {
            let parts: Vec<&str> = word.split('.').filter(|p| !p.is_empty()).collect();
            if parts.len() > 1 && parts.iter().all(|p| p.chars().any(char::is_alphabetic)) {
                out.push(word.clone());
            }
            out.extend(
                parts
                    .into_iter()
                    .filter(|p| p.len() > 1 && !is_stopword(p))
                    .map(str::to_string),
            );
            continue;
        }

        if word.len() > 1 && !is_stopword(&word) {
            out.push(word);
        }
    }

    out
}

/// Distinct terms, first occurrence order kept
pub fn unique_terms(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    terms(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
