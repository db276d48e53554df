//! Periodic maintenance pass: expiry, confidence decay, and consolidation
//! of near-duplicate clusters (§4.12).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::error::Result;
use crate::store::{Deadline, Store};
use crate::types::{Memory, MemoryType, SearchFilters};

/// Decay factor tables, parameterised by memory age in days and type.
/// Rules/procedures decay slower than episodes, per §4.12.
fn decay_factor(age_days: f64, memory_type: MemoryType) -> f32 {
    let half_life_days: f64 = match memory_type {
        MemoryType::Rule => 180.0,
        MemoryType::Procedure => 120.0,
        MemoryType::Fact => 90.0,
        MemoryType::Preference => 90.0,
        MemoryType::Episode => 30.0,
    };
    (-0.693 * age_days / half_life_days).exp() as f32
}

/// Confidence floor below which a decayed memory is deleted.
const DEFAULT_DECAY_FLOOR: f32 = 0.2;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LifecycleReport {
    pub expired: u64,
    pub decayed: u64,
    pub consolidated: u64,
}

pub struct LifecycleManager<'a> {
    store: &'a dyn Store,
    consolidation_threshold: f32,
    decay_floor: f32,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            consolidation_threshold: 0.93,
            decay_floor: DEFAULT_DECAY_FLOOR,
        }
    }

    pub fn with_consolidation_threshold(mut self, threshold: f32) -> Self {
        self.consolidation_threshold = threshold;
        self
    }

    pub fn with_decay_floor(mut self, floor: f32) -> Self {
        self.decay_floor = floor;
        self
    }

    /// Runs one maintenance pass. `dry_run` reports counts without mutating
    /// anything (§4.12).
    pub fn run(&self, now: DateTime<Utc>, dry_run: bool) -> Result<LifecycleReport> {
        let mut report = LifecycleReport::default();
        let mut deleted: HashSet<String> = HashSet::new();

        let filters = SearchFilters::default();
        let mut all: Vec<Memory> = Vec::new();
        let mut cursor = String::new();
        loop {
            let (page, next) = self.store.list(&filters, 500, &cursor, Deadline::none())?;
            if page.is_empty() {
                break;
            }
            all.extend(page);
            if next.is_empty() {
                break;
            }
            cursor = next;
        }

        // Pass 1: expiry.
        for memory in &all {
            if deleted.contains(&memory.id) {
                continue;
            }
            if memory.ttl_expired(now) || memory.valid_until_expired(now) {
                deleted.insert(memory.id.clone());
                report.expired += 1;
                if !dry_run {
                    self.store.delete(&memory.id, Deadline::none())?;
                }
            }
        }

        // Pass 2: decay.
        for memory in &all {
            if deleted.contains(&memory.id) {
                continue;
            }
            let age_days = (now - memory.created_at).num_seconds() as f64 / 86_400.0;
            let factor = decay_factor(age_days.max(0.0), memory.memory_type);
            let decayed_confidence = memory.confidence * factor;

            if decayed_confidence < self.decay_floor {
                deleted.insert(memory.id.clone());
                report.decayed += 1;
                if !dry_run {
                    self.store.delete(&memory.id, Deadline::none())?;
                }
                continue;
            }

            report.decayed += 1;
            if !dry_run {
                self.store
                    .update_confidence(&memory.id, decayed_confidence, now, Deadline::none())?;
            }
        }

        // Pass 3: consolidation. Cluster by cosine similarity over the same
        // stored embedding vectors `Search`/`FindDuplicates` compare against,
        // fetched once per survivor candidate via `Store::get_vector` ahead
        // of the O(n^2) pairwise comparison below.
        let remaining: Vec<&Memory> = all.iter().filter(|m| !deleted.contains(&m.id)).collect();
        let mut consolidated_into: HashSet<String> = HashSet::new();

        let mut vectors: std::collections::HashMap<String, Vec<f32>> = std::collections::HashMap::new();
        for memory in &remaining {
            if let Ok(vector) = self.store.get_vector(&memory.id, Deadline::none()) {
                vectors.insert(memory.id.clone(), vector);
            }
        }

        for memory in remaining.iter().copied() {
            if deleted.contains(&memory.id) || consolidated_into.contains(&memory.id) {
                continue;
            }
            let Some(memory_vector) = vectors.get(&memory.id) else {
                continue;
            };

            let mut cluster: Vec<&Memory> = vec![memory];
            for other in remaining.iter().copied() {
                if other.id == memory.id
                    || deleted.contains(&other.id)
                    || consolidated_into.contains(&other.id)
                {
                    continue;
                }
                // Consolidation is skipped when the cluster spans multiple
                // type values (§4.12).
                if other.memory_type != memory.memory_type {
                    continue;
                }
                let Some(other_vector) = vectors.get(&other.id) else {
                    continue;
                };
                let similarity = cosine_similarity(memory_vector, other_vector);
                if similarity >= self.consolidation_threshold {
                    cluster.push(other);
                }
            }

            if cluster.len() < 2 {
                continue;
            }

            let survivor = cluster
                .iter()
                .copied()
                .max_by(|a, b| {
                    let score_a = a.confidence * recency_weight(a.last_accessed, now);
                    let score_b = b.confidence * recency_weight(b.last_accessed, now);
                    score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
                })
                .expect("cluster is non-empty");

            let mut merged_tags: HashSet<String> = HashSet::new();
            let mut summed_access_count: u64 = 0;
            for m in &cluster {
                merged_tags.extend(m.tags.iter().cloned());
                summed_access_count += m.access_count;
            }

            for m in &cluster {
                if m.id != survivor.id {
                    consolidated_into.insert(m.id.clone());
                    report.consolidated += 1;
                    if !dry_run {
                        self.store.delete(&m.id, Deadline::none())?;
                    }
                }
            }

            if !dry_run {
                self.store.merge_consolidated_fields(
                    &survivor.id,
                    merged_tags.into_iter().collect(),
                    summed_access_count,
                    Deadline::none(),
                )?;
            }
        }

        Ok(report)
    }
}

fn recency_weight(last_accessed: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    crate::ranker::recency_score(last_accessed, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{MemoryScope, Visibility};
    use std::collections::HashMap;

    fn memory(id: &str, memory_type: MemoryType, created_at: DateTime<Utc>) -> Memory {
        Memory {
            id: id.into(),
            memory_type,
            scope: MemoryScope::Permanent,
            visibility: Visibility::Shared,
            content: "some durable content".into(),
            confidence: 0.9,
            source: "explicit".into(),
            tags: vec![],
            project: String::new(),
            created_at,
            updated_at: created_at,
            last_accessed: created_at,
            access_count: 0,
            ttl_seconds: 0,
            valid_until: None,
            supersedes_id: None,
            metadata: HashMap::new(),
            content_hash: None,
        }
    }

    #[test]
    fn expires_ttl_memory() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut m = memory("m1", MemoryType::Fact, now - chrono::Duration::seconds(120));
        m.ttl_seconds = 60;
        m.scope = MemoryScope::Session;
        store.upsert(m, vec![1.0], Deadline::none()).unwrap();

        let manager = LifecycleManager::new(&store);
        let report = manager.run(now, false).unwrap();
        assert_eq!(report.expired, 1);
        assert!(store.get("m1", Deadline::none()).is_err());
    }

    #[test]
    fn expires_valid_until_memory() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut m = memory("m1", MemoryType::Fact, now - chrono::Duration::days(1));
        m.valid_until = Some(now - chrono::Duration::hours(1));
        store.upsert(m, vec![1.0], Deadline::none()).unwrap();

        let manager = LifecycleManager::new(&store);
        let report = manager.run(now, false).unwrap();
        assert_eq!(report.expired, 1);
    }

    #[test]
    fn dry_run_reports_without_mutating() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut m = memory("m1", MemoryType::Fact, now - chrono::Duration::seconds(120));
        m.ttl_seconds = 60;
        store.upsert(m, vec![1.0], Deadline::none()).unwrap();

        let manager = LifecycleManager::new(&store);
        let report = manager.run(now, true).unwrap();
        assert_eq!(report.expired, 1);
        assert!(store.get("m1", Deadline::none()).is_ok());
    }

    #[test]
    fn deletes_when_decayed_below_floor() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        // Episode half-life is 30 days; 10 half-lives puts decayed confidence
        // at ~0.9 / 1024, far below the 0.2 floor.
        let ancient = now - chrono::Duration::days(300);
        let m = memory("m1", MemoryType::Episode, ancient);
        store.upsert(m, vec![1.0], Deadline::none()).unwrap();

        let manager = LifecycleManager::new(&store);
        let report = manager.run(now, false).unwrap();
        assert_eq!(report.decayed, 1);
        assert_eq!(report.expired, 0);
        assert!(store.get("m1", Deadline::none()).is_err());
    }

    #[test]
    fn consolidates_near_duplicate_cluster_of_same_type() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let a = memory("a", MemoryType::Fact, now);
        let mut b = memory("b", MemoryType::Fact, now);
        b.content = "some durable content".into();
        store.upsert(a, vec![1.0], Deadline::none()).unwrap();
        store.upsert(b, vec![1.0], Deadline::none()).unwrap();

        let manager = LifecycleManager::new(&store).with_consolidation_threshold(0.5);
        let report = manager.run(now, false).unwrap();
        assert_eq!(report.consolidated, 1);
    }

    #[test]
    fn skips_consolidation_across_differing_types() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let a = memory("a", MemoryType::Fact, now);
        let mut b = memory("b", MemoryType::Rule, now);
        b.content = "some durable content".into();
        store.upsert(a, vec![1.0], Deadline::none()).unwrap();
        store.upsert(b, vec![1.0], Deadline::none()).unwrap();

        let manager = LifecycleManager::new(&store).with_consolidation_threshold(0.5);
        let report = manager.run(now, false).unwrap();
        assert_eq!(report.consolidated, 0);
    }
}
