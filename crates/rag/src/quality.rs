//! Chunk quality report
//!
//! Flags chunks whose boundaries damaged the content. Each chunk starts at
//! 1.0 and loses points per issue; ingestion logs the aggregate.

use dfir_core::Chunk;
use serde::{Deserialize, Serialize};

/// Issues kept in a report
const MAX_REPORTED_ISSUES: usize = 20;

/// Average score a corpus needs to pass
pub const PASS_THRESHOLD: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    IncompleteSentence,
    SplitCodeBlock,
    SplitTable,
    GarbageCharacters,
}

impl IssueKind {
    pub fn penalty(&self) -> f32 {
        match self {
            IssueKind::IncompleteSentence => 0.1,
            IssueKind::SplitCodeBlock => 0.3,
            IssueKind::SplitTable => 0.2,
            IssueKind::GarbageCharacters => 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub chunk_id: String,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_chunks: usize,
    pub average_score: f32,
    pub chunks_with_issues: usize,
    pub issue_rate: f32,
    /// First issues found, capped
    pub issues: Vec<QualityIssue>,
    pub passed: bool,
}

impl QualityReport {
    pub fn evaluate(chunks: &[Chunk]) -> Self {
        let mut issues = Vec::new();
        let mut total_score = 0.0;
        let mut chunks_with_issues = 0;

        for chunk in chunks {
            let found = inspect(&chunk.raw_text);
            let penalty: f32 = found.iter().map(IssueKind::penalty).sum();
            total_score += (1.0 - penalty).max(0.0);

            if !found.is_empty() {
                chunks_with_issues += 1;
            }
            for kind in found {
                if issues.len() < MAX_REPORTED_ISSUES {
                    issues.push(QualityIssue {
                        chunk_id: chunk.id.clone(),
                        kind,
                    });
                }
            }
        }

        let total_chunks = chunks.len();
        let (average_score, issue_rate) = if total_chunks == 0 {
            (1.0, 0.0)
        } else {
            (
                total_score / total_chunks as f32,
                chunks_with_issues as f32 / total_chunks as f32,
            )
        };

        Self {
            total_chunks,
            average_score,
            chunks_with_issues,
            issue_rate,
            issues,
            passed: average_score >= PASS_THRESHOLD,
        }
    }
}

fn inspect(text: &str) -> Vec<IssueKind> {
    let mut found = Vec::new();
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    if let Some(last) = lines.last() {
        if ends_mid_sentence(last) {
            found.push(IssueKind::IncompleteSentence);
        }
    }

    let fences = lines.iter().filter(|l| l.starts_with("```")).count();
    if fences % 2 == 1 {
        found.push(IssueKind::SplitCodeBlock);
    }

    if let Some(first) = lines.first() {
        let header_sep = lines.get(1).map(|l| is_table_separator(l)).unwrap_or(false);
        if first.starts_with('|') && !header_sep {
            found.push(IssueKind::SplitTable);
        }
    }

    if text
        .chars()
        .any(|c| c == '\u{FFFD}' || (c.is_control() && !matches!(c, '\n' | '\r' | '\t')))
    {
        found.push(IssueKind::GarbageCharacters);
    }

    found
}

fn ends_mid_sentence(line: &str) -> bool {
    // Structural lines end where they end
    if line.starts_with('#')
        || line.starts_with('|')
        || line.starts_with("```")
        || line.starts_with("- ")
        || line.starts_with("* ")
        || line.starts_with("vol")
        || line.starts_with("$ ")
    {
        return false;
    }
    !line.ends_with(['.', '!', '?', ':', ')', '"', '\'', '`', ';'])
}

fn is_table_separator(line: &str) -> bool {
    line.starts_with('|')
        && line.contains('-')
        && line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfir_core::Document;

    use crate::chunker::DocumentChunker;

    fn chunk(text: &str) -> Chunk {
        DocumentChunker::default()
            .chunk(&Document::new("doc", "Doc", text))
            .remove(0)
    }

    #[test]
    fn test_clean_chunk() {
        let report = QualityReport::evaluate(&[chunk("A complete sentence.")]);
        assert_eq!(report.average_score, 1.0);
        assert!(report.passed);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_split_code_block() {
        let report = QualityReport::evaluate(&[chunk("Setup:\n```\nvol -f a.mem windows.info")]);
        assert!(report
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::SplitCodeBlock));
        assert!(report.average_score <= 0.7);
        assert!(!report.passed);
    }

    #[test]
    fn test_split_table() {
        let report = QualityReport::evaluate(&[chunk("| lsass.exe | wininit.exe |\n| csrss.exe | smss.exe |")]);
        assert_eq!(report.issues[0].kind, IssueKind::SplitTable);

        let whole = QualityReport::evaluate(&[chunk("| Process | Parent |\n|---|---|\n| lsass.exe | wininit.exe |")]);
        assert!(whole.issues.is_empty());
    }

    #[test]
    fn test_incomplete_sentence_and_garbage() {
        let report = QualityReport::evaluate(&[chunk("The analyst then checks the\u{0007}")]);
        let kinds: Vec<_> = report.issues.iter().map(|i| i.kind).collect();
        assert!(kinds.contains(&IssueKind::IncompleteSentence));
        assert!(kinds.contains(&IssueKind::GarbageCharacters));
        assert!((report.average_score - 0.7).abs() < 1e-6);
        assert_eq!(report.issue_rate, 1.0);
    }

    #[test]
    fn test_issue_list_is_capped() {
        let chunks: Vec<Chunk> = (0..30).map(|_| chunk("no terminal punctuation")).collect();
        let report = QualityReport::evaluate(&chunks);
        assert_eq!(report.chunks_with_issues, 30);
        assert_eq!(report.issues.len(), MAX_REPORTED_ISSUES);
    }

    #[test]
    fn test_empty_input() {
        let report = QualityReport::evaluate(&[]);
        assert_eq!(report.total_chunks, 0);
        assert!(report.passed);
    }
}
