//! Confidence scoring
//!
//! `confidence = avg * (0.8 + 0.2 * coverage)` where `avg` is the mean of the
//! top-N final scores (missing slots count as zero) and `coverage` is the
//! share of distinct source documents among them, relative to what the corpus
//! could supply. Monotone in both inputs; an empty result set is 0.0.

use std::collections::HashSet;

use dfir_config::ConfidenceSettings;
use dfir_core::{ConfidenceAssessment, ConfidenceLevel, SearchResult};

const AVERAGE_SHARE: f32 = 0.8;
const COVERAGE_SHARE: f32 = 0.2;

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    low_threshold: f32,
    high_threshold: f32,
    top_n: usize,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::from(&ConfidenceSettings::default())
    }
}

impl From<&ConfidenceSettings> for ConfidenceScorer {
    fn from(settings: &ConfidenceSettings) -> Self {
        Self::new(settings.low_threshold, settings.high_threshold, settings.top_n)
    }
}

impl ConfidenceScorer {
    pub fn new(low_threshold: f32, high_threshold: f32, top_n: usize) -> Self {
        Self {
            low_threshold,
            high_threshold,
            top_n: top_n.max(1),
        }
    }

    pub fn level(&self, score: f32) -> ConfidenceLevel {
        if score < self.low_threshold {
            ConfidenceLevel::Low
        } else if score > self.high_threshold {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::Medium
        }
    }

    /// Assess ranked results; `corpus_documents` is how many documents the
    /// index holds
    pub fn assess(&self, results: &[SearchResult], corpus_documents: usize) -> ConfidenceAssessment {
        if results.is_empty() {
            return ConfidenceAssessment::none();
        }

        let top = &results[..results.len().min(self.top_n)];
        let average_score =
            top.iter().map(|r| r.score.clamp(0.0, 1.0)).sum::<f32>() / self.top_n as f32;

        let distinct_sources = top
            .iter()
            .map(|r| r.document_id.as_str())
            .collect::<HashSet<_>>()
            .len();
        let possible = self.top_n.min(corpus_documents.max(distinct_sources)).max(1);
        let coverage = (distinct_sources as f32 / possible as f32).min(1.0);

        let score = (average_score * (AVERAGE_SHARE + COVERAGE_SHARE * coverage)).clamp(0.0, 1.0);
        let level = self.level(score);

        tracing::debug!(
            score,
            level = %level,
            average_score,
            coverage,
            distinct_sources,
            "Confidence assessed"
        );

        ConfidenceAssessment {
            score,
            level,
            average_score,
            coverage,
            distinct_sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfir_core::SourceType;

    fn result(document: &str, score: f32) -> SearchResult {
        SearchResult {
            chunk_id: format!("{}_0000", document),
            document_id: document.into(),
            title: document.into(),
            chapter: None,
            section: None,
            page: None,
            source_type: SourceType::Book,
            text: String::new(),
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
    fn test_empty_is_low() {
        let assessment = ConfidenceScorer::default().assess(&[], 0);
        assert_eq!(assessment.level, ConfidenceLevel::Low);
        assert_eq!(assessment.score, 0.0);
    }

    #[test]
    fn test_single_weak_result_is_low() {
        let assessment = ConfidenceScorer::default().assess(&[result("a", 0.9)], 1);
        // one of five slots filled
        assert!((assessment.average_score - 0.18).abs() < 1e-6);
        assert_eq!(assessment.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_diverse_strong_results_are_high() {
        let results: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|d| result(d, 0.9)).collect();
        let assessment = ConfidenceScorer::default().assess(&results, 10);
        assert_eq!(assessment.coverage, 1.0);
        assert!((assessment.score - 0.9).abs() < 1e-6);
        assert_eq!(assessment.level, ConfidenceLevel::High);
    }

    #[test]
    fn test_single_source_penalized_in_large_corpus() {
        let same: Vec<_> = (0..5).map(|_| result("a", 0.8)).collect();
        let diverse: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|d| result(d, 0.8)).collect();
        let scorer = ConfidenceScorer::default();
        let same = scorer.assess(&same, 50);
        let diverse = scorer.assess(&diverse, 50);
        assert!(same.score < diverse.score);
        assert!((same.score - 0.8 * 0.84).abs() < 1e-6);
    }

    #[test]
    fn test_single_document_corpus_not_penalized() {
        let same: Vec<_> = (0..5).map(|_| result("a", 0.8)).collect();
        let assessment = ConfidenceScorer::default().assess(&same, 1);
        assert_eq!(assessment.coverage, 1.0);
        assert!((assessment.score - 0.8).abs() < 1e-6);
        assert_eq!(assessment.level, ConfidenceLevel::High);
    }

    #[test]
    fn test_thresholds() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.level(0.49), ConfidenceLevel::Low);
        assert_eq!(scorer.level(0.5), ConfidenceLevel::Medium);
        assert_eq!(scorer.level(0.7), ConfidenceLevel::Medium);
        assert_eq!(scorer.level(0.71), ConfidenceLevel::High);
    }

    #[test]
    fn test_monotone_in_average() {
        let scorer = ConfidenceScorer::default();
        let mut last = 0.0;
        for s in [0.1, 0.3, 0.5, 0.7, 0.9] {
            let results: Vec<_> = ["a", "b"].iter().map(|d| result(d, s)).collect();
            let score = scorer.assess(&results, 2).score;
            assert!(score >= last);
            last = score;
        }
    }
}
