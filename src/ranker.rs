//! Multi-factor rescoring (§4.6), grounded on the teacher's
//! `search/rerank.rs` weighted-component design but implementing the exact
//! formula and factor functions spec.md mandates rather than the teacher's
//! own heuristics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Memory, MemoryScope, RecallResult, SearchResult};

/// Ranker weights. Defaults sum to 1.0 per §4.6.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankerWeights {
    pub similarity: f32,
    pub recency: f32,
    pub frequency: f32,
    pub type_boost: f32,
    pub scope_boost: f32,
}

impl Default for RankerWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            recency: 0.2,
            frequency: 0.1,
            type_boost: 0.1,
            scope_boost: 0.1,
        }
    }
}

/// Recency half-life in hours (7 days), per §4.6.
const RECENCY_HALF_LIFE_HOURS: f32 = 168.0;

/// Floor recency score for a memory that has never been accessed
/// (`last_accessed` is the zero timestamp).
const RECENCY_FLOOR: f32 = 0.1;

/// Exponential decay with a 7-day half-life. A zero `last_accessed` yields
/// the floor `0.1`; clock-skew-induced negative ages are clamped to zero.
pub fn recency_score(last_accessed: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    if last_accessed == DateTime::<Utc>::from_timestamp(0, 0).unwrap() {
        return RECENCY_FLOOR;
    }

    let hours_ago = (now - last_accessed).num_milliseconds() as f32 / 3_600_000.0;
    let hours_ago = hours_ago.max(0.0);
    (-0.693_f32 * hours_ago / RECENCY_HALF_LIFE_HOURS).exp()
}

/// `min(1, log2(access_count + 1) / 10)`. Zero accesses → 0.
pub fn frequency_score(access_count: u64) -> f32 {
    if access_count == 0 {
        return 0.0;
    }
    (((access_count + 1) as f32).log2() / 10.0).min(1.0)
}

/// Scope boost relative to a project context `p` (§4.6). `p == ""` always
/// yields `1.0` (no project context to compare against).
pub fn scope_boost(scope: MemoryScope, memory_project: &str, project_context: &str) -> f32 {
    if project_context.is_empty() {
        return 1.0;
    }

    match scope {
        MemoryScope::Project if memory_project == project_context => 1.5,
        MemoryScope::Permanent => 1.0,
        _ => 0.8,
    }
}

/// Rescores and stably sorts `SearchResult`s by descending `final_score`
/// (§4.6, §8 "Ranker sort stability").
pub struct Ranker {
    weights: RankerWeights,
}

impl Ranker {
    pub fn new(weights: RankerWeights) -> Self {
        Self { weights }
    }

    pub fn rank(&self, results: Vec<SearchResult>, project: &str, now: DateTime<Utc>) -> Vec<RecallResult> {
        let mut scored: Vec<RecallResult> = results
            .into_iter()
            .map(|r| self.score_one(r, project, now))
            .collect();

        // `sort_by` is a stable sort: ties retain input order (§8).
        scored.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        scored
    }

    fn score_one(&self, result: SearchResult, project: &str, now: DateTime<Utc>) -> RecallResult {
        let recency = recency_score(result.memory.last_accessed, now);
        let frequency = frequency_score(result.memory.access_count);
        let type_boost = result.memory.memory_type.type_boost();
        let scope_boost = scope_boost(result.memory.scope, &result.memory.project, project);

        let final_score = self.weights.similarity * result.similarity_score
            + self.weights.recency * recency
            + self.weights.frequency * frequency
            + self.weights.type_boost * type_boost
            + self.weights.scope_boost * scope_boost;

        RecallResult {
            memory: result.memory,
            similarity_score: result.similarity_score,
            recency_score: recency,
            frequency_score: frequency,
            type_boost,
            scope_boost,
            final_score,
        }
    }
}
