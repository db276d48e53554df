//! Reference in-memory `Store` implementation. Serialises all mutations
//! behind a single writer lock and all reads behind a reader lock (§5).

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;

use crate::embedding::cosine_similarity;
use crate::error::{MemoriaError, Result};
use crate::types::{CollectionStats, Memory, SearchFilters, SearchResult, Visibility};

use super::{top_n, Cursor, Deadline, Store};

struct Record {
    memory: Memory,
    vector: Vec<f32>,
}

struct Inner {
    dimensions: usize,
    records: HashMap<String, Record>,
}

/// Single-process reference store. Not persisted; suitable for tests and for
/// single-node deployments that don't need an external vector database.
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                dimensions: 0,
                records: HashMap::new(),
            }),
        }
    }

    fn visible(filters: &SearchFilters, memory: &Memory) -> bool {
        if filters.visibility.is_none() && memory.visibility == Visibility::Sensitive {
            return false;
        }
        filters.matches(memory)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for InMemoryStore {
    fn ensure_collection(&self, dimensions: usize, _deadline: Deadline) -> Result<()> {
        let mut inner = self.inner.write();
        inner.dimensions = dimensions;
        Ok(())
    }

    fn upsert(&self, mut memory: Memory, vector: Vec<f32>, _deadline: Deadline) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.dimensions != 0 && vector.len() != inner.dimensions {
            return Err(MemoriaError::InvalidInput(format!(
                "vector has {} dimensions, expected {}",
                vector.len(),
                inner.dimensions
            )));
        }
        memory = memory.deep_clone();
        inner.records.insert(
            memory.id.clone(),
            Record { memory, vector },
        );
        Ok(())
    }

    fn get(&self, id: &str, _deadline: Deadline) -> Result<Memory> {
        let inner = self.inner.read();
        inner
            .records
            .get(id)
            .map(|r| r.memory.deep_clone())
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str, _deadline: Deadline) -> Result<()> {
        let mut inner = self.inner.write();
        inner
            .records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))
    }

    fn list(
        &self,
        filters: &SearchFilters,
        limit: usize,
        cursor: &str,
        _deadline: Deadline,
    ) -> Result<(Vec<Memory>, Cursor)> {
        let inner = self.inner.read();
        let mut ids: Vec<&String> = inner
            .records
            .iter()
            .filter(|(_, r)| Self::visible(filters, &r.memory))
            .map(|(id, _)| id)
            .collect();
        ids.sort();

        let start = if cursor.is_empty() {
            0
        } else {
            ids.iter().position(|id| id.as_str() > cursor).unwrap_or(ids.len())
        };

        let page: Vec<Memory> = ids[start..]
            .iter()
            .take(limit)
            .map(|id| inner.records[*id].memory.deep_clone())
            .collect();

        let next_cursor = if start + page.len() < ids.len() {
            page.last().map(|m| m.id.clone()).unwrap_or_default()
        } else {
            String::new()
        };

        Ok((page, next_cursor))
    }

    fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
        _deadline: Deadline,
    ) -> Result<Vec<SearchResult>> {
        let inner = self.inner.read();
        let results: Vec<SearchResult> = inner
            .records
            .values()
            .filter(|r| Self::visible(filters, &r.memory))
            .map(|r| SearchResult {
                memory: r.memory.deep_clone(),
                similarity_score: cosine_similarity(vector, &r.vector),
            })
            .collect();
        Ok(top_n(results, limit))
    }

    fn find_duplicates(&self, vector: &[f32], threshold: f32, _deadline: Deadline) -> Result<Vec<SearchResult>> {
        let inner = self.inner.read();
        let mut results: Vec<SearchResult> = inner
            .records
            .values()
            .map(|r| SearchResult {
                memory: r.memory.deep_clone(),
                similarity_score: cosine_similarity(vector, &r.vector),
            })
            .filter(|r| r.similarity_score >= threshold)
            .collect();
        results.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    fn update_access_metadata(&self, id: &str, _deadline: Deadline) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(id) {
            record.memory.last_accessed = Utc::now();
            record.memory.access_count += 1;
        }
        Ok(())
    }

    fn stats(&self, _deadline: Deadline) -> Result<CollectionStats> {
        let inner = self.inner.read();
        let mut by_type: HashMap<String, u64> = HashMap::new();
        let mut by_scope: HashMap<String, u64> = HashMap::new();
        for record in inner.records.values() {
            *by_type.entry(record.memory.memory_type.as_str().to_string()).or_insert(0) += 1;
            *by_scope.entry(record.memory.scope.as_str().to_string()).or_insert(0) += 1;
        }
        Ok(CollectionStats {
            total: inner.records.len() as u64,
            by_type,
            by_scope,
        })
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn update_confidence(
        &self,
        id: &str,
        confidence: f32,
        updated_at: chrono::DateTime<chrono::Utc>,
        _deadline: Deadline,
    ) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(id) {
            record.memory.confidence = confidence;
            record.memory.updated_at = updated_at;
        }
        Ok(())
    }

    fn merge_consolidated_fields(&self, id: &str, tags: Vec<String>, access_count: u64, _deadline: Deadline) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(record) = inner.records.get_mut(id) {
            record.memory.tags = tags;
            record.memory.access_count = access_count;
        }
        Ok(())
    }

    fn get_vector(&self, id: &str, _deadline: Deadline) -> Result<Vec<f32>> {
        let inner = self.inner.read();
        inner
            .records
            .get(id)
            .map(|r| r.vector.clone())
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryScope, MemoryType};
    use std::collections::HashMap as Map;

    fn memory(id: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: id.into(),
            memory_type: MemoryType::Fact,
            scope: MemoryScope::Permanent,
            visibility: Visibility::Shared,
            content: "content".into(),
            confidence: 0.9,
            source: "explicit".into(),
            tags: vec![],
            project: String::new(),
            created_at: now,
            updated_at: now,
            last_accessed: now,
            access_count: 0,
            ttl_seconds: 0,
            valid_until: None,
            supersedes_id: None,
            metadata: Map::new(),
            content_hash: None,
        }
    }

    #[test]
    fn round_trip() {
        let store = InMemoryStore::new();
        store.ensure_collection(3, Deadline::none()).unwrap();
        store.upsert(memory("m1"), vec![1.0, 0.0, 0.0], Deadline::none()).unwrap();
        let fetched = store.get("m1", Deadline::none()).unwrap();
        assert_eq!(fetched.id, "m1");
    }

    #[test]
    fn delete_finality() {
        let store = InMemoryStore::new();
        store.upsert(memory("m1"), vec![1.0, 0.0, 0.0], Deadline::none()).unwrap();
        store.delete("m1", Deadline::none()).unwrap();
        assert!(store.get("m1", Deadline::none()).is_err());
        assert!(store.delete("m1", Deadline::none()).is_err());
    }

    #[test]
    fn rejects_mismatched_vector_dimension() {
        let store = InMemoryStore::new();
        store.ensure_collection(3, Deadline::none()).unwrap();
        let result = store.upsert(memory("m1"), vec![1.0, 0.0], Deadline::none());
        assert!(result.is_err());
    }

    #[test]
    fn visibility_gate() {
        let store = InMemoryStore::new();
        let mut sensitive = memory("m1");
        sensitive.visibility = Visibility::Sensitive;
        store.upsert(sensitive, vec![1.0, 0.0, 0.0], Deadline::none()).unwrap();

        let default_filters = SearchFilters::default();
        let (page, _) = store.list(&default_filters, 10, "", Deadline::none()).unwrap();
        assert!(page.is_empty());

        let mut opt_in = SearchFilters::default();
        opt_in.visibility = Some(Visibility::Sensitive);
        let (page, _) = store.list(&opt_in, 10, "", Deadline::none()).unwrap();
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn cursor_pagination_totality() {
        let store = InMemoryStore::new();
        for i in 0..10 {
            store
                .upsert(memory(&format!("m{i:02}")), vec![1.0, 0.0, 0.0], Deadline::none())
                .unwrap();
        }

        let filters = SearchFilters::default();
        let mut seen = std::collections::HashSet::new();
        let mut cursor = String::new();
        loop {
            let (page, next) = store.list(&filters, 3, &cursor, Deadline::none()).unwrap();
            if page.is_empty() {
                break;
            }
            for m in &page {
                seen.insert(m.id.clone());
            }
            if next.is_empty() {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn access_metadata_monotonicity() {
        let store = InMemoryStore::new();
        store.upsert(memory("m1"), vec![1.0, 0.0, 0.0], Deadline::none()).unwrap();
        store.update_access_metadata("m1", Deadline::none()).unwrap();
        let first = store.get("m1", Deadline::none()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        store.update_access_metadata("m1", Deadline::none()).unwrap();
        let second = store.get("m1", Deadline::none()).unwrap();
        assert!(second.last_accessed >= first.last_accessed);
        assert!(second.access_count > first.access_count);
    }

    #[test]
    fn update_access_metadata_missing_id_is_silent_noop() {
        let store = InMemoryStore::new();
        assert!(store.update_access_metadata("nope", Deadline::none()).is_ok());
    }

    #[test]
    fn find_duplicates_returns_all_above_threshold_unbounded() {
        let store = InMemoryStore::new();
        for i in 0..5 {
            store
                .upsert(memory(&format!("m{i}")), vec![1.0, 0.0, 0.0], Deadline::none())
                .unwrap();
        }
        let duplicates = store.find_duplicates(&[1.0, 0.0, 0.0], 0.99, Deadline::none()).unwrap();
        assert_eq!(duplicates.len(), 5);
    }
}
