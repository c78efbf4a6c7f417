//! Retrieval evaluation against a golden Q&A dataset
//!
//! Expected chunk ids in the dataset are matched case-insensitively as
//! substrings of retrieved ids, so `"malfind"` matches `"aomf_malfind_0003"`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::query_analyzer::QueryAnalyzer;
use crate::retriever::HybridRetriever;
use crate::vector_store::SearchFilter;
use crate::RagError;

pub const DEFAULT_K: usize = 5;
pub const DEFAULT_PASS_THRESHOLD: f32 = 0.8;

fn default_difficulty() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenQuery {
    pub id: String,
    /// concept, anomaly, procedure or tool_command
    #[serde(rename = "type")]
    pub query_type: String,
    pub query: String,
    #[serde(default)]
    pub expected_chunks: Vec<String>,
    #[serde(default)]
    pub expected_response_contains: Vec<String>,
    #[serde(default)]
    pub expected_table: bool,
    #[serde(default)]
    pub expected_commands: Option<Vec<String>>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoldenDataset {
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub queries: Vec<GoldenQuery>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetStatistics {
    pub total_queries: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_difficulty: BTreeMap<String, usize>,
}

impl GoldenDataset {
    pub fn from_json(json: &str) -> Result<Self, RagError> {
        serde_json::from_str(json).map_err(|e| RagError::Index(format!("Invalid golden dataset: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            RagError::NotFound(format!("Golden dataset {}: {}", path.display(), e))
        })?;
        let dataset = Self::from_json(&json)?;
        tracing::info!(queries = dataset.queries.len(), path = %path.display(), "Loaded golden dataset");
        Ok(dataset)
    }

    pub fn by_type<'a>(&'a self, query_type: &'a str) -> impl Iterator<Item = &'a GoldenQuery> + 'a {
        self.queries.iter().filter(move |q| q.query_type == query_type)
    }

    pub fn by_difficulty<'a>(&'a self, difficulty: &'a str) -> impl Iterator<Item = &'a GoldenQuery> + 'a {
        self.queries.iter().filter(move |q| q.difficulty == difficulty)
    }

    pub fn get(&self, id: &str) -> Option<&GoldenQuery> {
        self.queries.iter().find(|q| q.id == id)
    }

    pub fn statistics(&self) -> DatasetStatistics {
        let mut stats = DatasetStatistics {
            total_queries: self.queries.len(),
            ..Default::default()
        };
        for q in &self.queries {
            *stats.by_type.entry(q.query_type.clone()).or_default() += 1;
            *stats.by_difficulty.entry(q.difficulty.clone()).or_default() += 1;
        }
        stats
    }
}

fn matches(expected: &str, retrieved: &str) -> bool {
    retrieved.to_lowercase().contains(&expected.to_lowercase())
}

/// Share of expected chunks found in the top `k`; 1.0 when nothing is expected
pub fn recall_at_k(expected: &[String], retrieved: &[String], k: usize) -> f32 {
    if expected.is_empty() {
        return 1.0;
    }
    let top = &retrieved[..retrieved.len().min(k)];
    let hits = expected
        .iter()
        .filter(|e| top.iter().any(|r| matches(e, r)))
        .count();
    hits as f32 / expected.len() as f32
}

/// Share of the top `k` that match some expected chunk
pub fn precision_at_k(expected: &[String], retrieved: &[String], k: usize) -> f32 {
    let top = &retrieved[..retrieved.len().min(k)];
    if top.is_empty() {
        return 0.0;
    }
    let relevant = top
        .iter()
        .filter(|r| expected.iter().any(|e| matches(e, r)))
        .count();
    relevant as f32 / top.len() as f32
}

/// 1 / rank of the first relevant result, 0.0 when none is
pub fn reciprocal_rank(expected: &[String], retrieved: &[String]) -> f32 {
    retrieved
        .iter()
        .position(|r| expected.iter().any(|e| matches(e, r)))
        .map(|i| 1.0 / (i + 1) as f32)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryEvaluation {
    pub query_id: String,
    pub query: String,
    pub retrieved: Vec<String>,
    pub recall: f32,
    pub precision: f32,
    pub reciprocal_rank: f32,
    pub misses: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalReport {
    pub total_queries: usize,
    pub k: usize,
    pub avg_recall: f32,
    pub avg_precision: f32,
    pub mean_reciprocal_rank: f32,
    pub queries_above_threshold: usize,
    pub threshold: f32,
    pub passed: bool,
    pub results: Vec<QueryEvaluation>,
}

#[derive(Debug, Clone)]
pub struct RetrievalEvaluator {
    k: usize,
    pass_threshold: f32,
}

impl Default for RetrievalEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_K, DEFAULT_PASS_THRESHOLD)
    }
}

impl RetrievalEvaluator {
    pub fn new(k: usize, pass_threshold: f32) -> Self {
        Self {
            k: k.max(1),
            pass_threshold,
        }
    }

    pub fn evaluate_single(&self, query: &GoldenQuery, retrieved: &[String]) -> QueryEvaluation {
        let top: Vec<String> = retrieved.iter().take(self.k).cloned().collect();
        let misses = query
            .expected_chunks
            .iter()
            .filter(|e| !top.iter().any(|r| matches(e, r)))
            .cloned()
            .collect::<Vec<_>>();

        let evaluation = QueryEvaluation {
            query_id: query.id.clone(),
            query: query.query.clone(),
            recall: recall_at_k(&query.expected_chunks, &top, self.k),
            precision: precision_at_k(&query.expected_chunks, &top, self.k),
            reciprocal_rank: reciprocal_rank(&query.expected_chunks, &top),
            retrieved: top,
            misses,
        };

        if evaluation.recall < self.pass_threshold {
            tracing::warn!(
                query_id = %evaluation.query_id,
                recall = evaluation.recall,
                threshold = self.pass_threshold,
                misses = ?evaluation.misses,
                "Low retrieval quality"
            );
        }
        evaluation
    }

    /// Score precomputed rankings; queries missing from `retrieved` count as empty
    pub fn evaluate_batch(
        &self,
        queries: &[GoldenQuery],
        retrieved: &HashMap<String, Vec<String>>,
    ) -> RetrievalReport {
        let results: Vec<QueryEvaluation> = queries
            .iter()
            .map(|q| {
                let ids = retrieved.get(&q.id).map(Vec::as_slice).unwrap_or(&[]);
                self.evaluate_single(q, ids)
            })
            .collect();
        self.report(results)
    }

    /// Run every query through the retriever with analyzer-chosen weights
    pub async fn run(
        &self,
        dataset: &GoldenDataset,
        retriever: &HybridRetriever,
        analyzer: &QueryAnalyzer,
    ) -> Result<RetrievalReport, RagError> {
        let filter = SearchFilter::default();
        let mut results = Vec::with_capacity(dataset.queries.len());
        for query in &dataset.queries {
            let weights = analyzer.weights(&query.query);
            let ids: Vec<String> = retriever
                .search(&query.query, weights, &filter)
                .await?
                .into_iter()
                .map(|r| r.chunk_id)
                .collect();
            results.push(self.evaluate_single(query, &ids));
        }
        let report = self.report(results);
        tracing::info!(
            queries = report.total_queries,
            avg_recall = report.avg_recall,
            mrr = report.mean_reciprocal_rank,
            passed = report.passed,
            "Retrieval evaluation finished"
        );
        Ok(report)
    }

    fn report(&self, results: Vec<QueryEvaluation>) -> RetrievalReport {
        let total = results.len();
        let mean = |f: fn(&QueryEvaluation) -> f32| {
            if total == 0 {
                0.0
            } else {
                results.iter().map(f).sum::<f32>() / total as f32
            }
        };
        let avg_recall = mean(|r| r.recall);
        let avg_precision = mean(|r| r.precision);
        let mean_reciprocal_rank = mean(|r| r.reciprocal_rank);
        let queries_above_threshold = results
            .iter()
            .filter(|r| r.recall >= self.pass_threshold)
            .count();

        RetrievalReport {
            total_queries: total,
            k: self.k,
            avg_recall,
            avg_precision,
            mean_reciprocal_rank,
            queries_above_threshold,
            threshold: self.pass_threshold,
            passed: total > 0 && avg_recall >= self.pass_threshold,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    const DATASET: &str = r#"{
        "metadata": {"version": "1.0"},
        "queries": [
            {"id": "c1", "type": "concept", "query": "What is the VAD tree?",
             "expected_chunks": ["vad"], "expected_response_contains": ["VAD"], "difficulty": "easy"},
            {"id": "t1", "type": "tool_command", "query": "Volatility command for injected code",
             "expected_chunks": ["malfind"], "expected_response_contains": [],
             "expected_commands": ["windows.malfind"]},
            {"id": "a1", "type": "anomaly", "query": "Is this svchost suspicious?",
             "expected_chunks": [], "expected_response_contains": [], "expected_table": true,
             "difficulty": "hard"}
        ]
    }"#;

    #[test]
    fn test_dataset_parsing_and_filters() {
        let dataset = GoldenDataset::from_json(DATASET).unwrap();
        assert_eq!(dataset.queries.len(), 3);
        assert_eq!(dataset.get("t1").unwrap().difficulty, "medium");
        assert_eq!(dataset.by_type("anomaly").count(), 1);
        assert!(dataset.get("a1").unwrap().expected_table);

        let stats = dataset.statistics();
        assert_eq!(stats.total_queries, 3);
        assert_eq!(stats.by_type["tool_command"], 1);
        assert_eq!(stats.by_difficulty["hard"], 1);
        assert!(GoldenDataset::from_json("{not json").is_err());
    }

    #[test]
    fn test_metrics() {
        let expected = ids(&["malfind", "hollow"]);
        let retrieved = ids(&["aomf_pslist_0001", "AOMF_MALFIND_0003", "x", "y", "z", "hollowing_0001"]);
        assert_eq!(recall_at_k(&expected, &retrieved, 5), 0.5);
        assert_eq!(recall_at_k(&expected, &retrieved, 6), 1.0);
        assert!((precision_at_k(&expected, &retrieved, 5) - 0.2).abs() < 1e-6);
        assert_eq!(reciprocal_rank(&expected, &retrieved), 0.5);

        assert_eq!(recall_at_k(&[], &retrieved, 5), 1.0);
        assert_eq!(precision_at_k(&expected, &[], 5), 0.0);
        assert_eq!(reciprocal_rank(&expected, &ids(&["none"])), 0.0);
    }

    #[test]
    fn test_batch_report() {
        let dataset = GoldenDataset::from_json(DATASET).unwrap();
        let mut retrieved = HashMap::new();
        retrieved.insert("c1".to_string(), ids(&["aomf_vad_0001"]));
        retrieved.insert("t1".to_string(), ids(&["aomf_pslist_0001"]));

        let report = RetrievalEvaluator::default().evaluate_batch(&dataset.queries, &retrieved);
        assert_eq!(report.total_queries, 3);
        // c1 hit, t1 miss, a1 expects nothing
        assert_eq!(report.queries_above_threshold, 2);
        assert!((report.avg_recall - 2.0 / 3.0).abs() < 1e-6);
        assert!(!report.passed);
        assert_eq!(report.results[1].misses, vec!["malfind".to_string()]);
    }
}
