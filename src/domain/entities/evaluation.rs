use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::Chunk;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub id: u32,
    pub question: String,
    pub category: String,
    pub recall_at_k: f64,
    pub answer_similarity: f64,
    pub generated_answer: String,
    pub retrieved_chunk_ids: Vec<String>,
    pub fallback_used: bool,
    /// Set when the pipeline failed on this question; both scores are then 0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallMetrics {
    pub avg_recall_at_k: f64,
    pub avg_answer_similarity: f64,
    /// Questions the pipeline errored on. They are averaged in with zero
    /// scores, so a non-zero count means the means understate retrieval.
    #[serde(default)]
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub avg_recall_at_k: f64,
    pub avg_answer_similarity: f64,
    pub count: usize,
    #[serde(default)]
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub k: usize,
    pub total_questions: usize,
    pub overall_metrics: OverallMetrics,
    pub category_metrics: BTreeMap<String, CategoryMetrics>,
    pub question_results: Vec<EvaluationRecord>,
}

impl EvaluationReport {
    pub fn from_records(k: usize, records: Vec<EvaluationRecord>) -> Self {
        let mut by_category: BTreeMap<String, Vec<&EvaluationRecord>> = BTreeMap::new();
        for record in &records {
            by_category
                .entry(record.category.clone())
                .or_default()
                .push(record);
        }

        let category_metrics = by_category
            .into_iter()
            .map(|(category, group)| {
                let count = group.len();
                let metrics = CategoryMetrics {
                    avg_recall_at_k: mean(group.iter().map(|r| r.recall_at_k)),
                    avg_answer_similarity: mean(group.iter().map(|r| r.answer_similarity)),
                    count,
                    failed: failed_count(group.iter().copied()),
                };
                (category, metrics)
            })
            .collect();

        let overall_metrics = OverallMetrics {
            avg_recall_at_k: mean(records.iter().map(|r| r.recall_at_k)),
            avg_answer_similarity: mean(records.iter().map(|r| r.answer_similarity)),
            failed: failed_count(records.iter()),
        };

        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            k,
            total_questions: records.len(),
            overall_metrics,
            category_metrics,
            question_results: records,
        }
    }
}

fn failed_count<'a>(records: impl Iterator<Item = &'a EvaluationRecord>) -> usize {
    records.filter(|r| r.error.is_some()).count()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Fraction of distinct relevant ids found among `retrieved`. An id matches a
/// chunk by its own id or by the slug of the page it came from. An empty
/// relevant set scores 0.
pub fn recall_at_k<'a>(relevant: &[String], retrieved: impl IntoIterator<Item = &'a Chunk>) -> f64 {
    let wanted: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    if wanted.is_empty() {
        return 0.0;
    }

    let mut found: HashSet<&str> = HashSet::new();
    for chunk in retrieved {
        if let Some(id) = wanted.get(chunk.id.as_str()) {
            found.insert(*id);
        }
        if let Some(id) = wanted.get(chunk.document_slug()) {
            found.insert(*id);
        }
    }

    found.len() as f64 / wanted.len() as f64
}
