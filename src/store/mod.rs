//! Abstract storage contract (§4.1). Polymorphic by design: pipelines depend
//! only on this trait, never on a concrete backend.

mod memory_store;
mod sqlite_store;

pub use memory_store::InMemoryStore;
pub use sqlite_store::SqliteStore;

use crate::error::Result;
use crate::types::{CollectionStats, Memory, MemoryId, SearchFilters, SearchResult};

/// Opaque pagination cursor for `Store::list`. Empty string means "from the
/// start" on input, and "exhausted" on output.
pub type Cursor = String;

/// A deadline/cancellation handle threaded through every suspension point
/// (§5 "Suspension points"). `tokio_util::sync::CancellationToken` would add
/// a dependency the teacher doesn't carry for this; a deadline is sufficient
/// to express "this call must not run unbounded" and is checked by callers
/// before/after each external RPC.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(pub Option<std::time::Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(duration: std::time::Duration) -> Self {
        Self(Some(std::time::Instant::now() + duration))
    }

    pub fn expired(&self) -> bool {
        matches!(self.0, Some(at) if std::time::Instant::now() >= at)
    }
}

/// Storage contract (§4.1). Every method takes a `Deadline`; implementations
/// must check it before doing work a caller has already given up on.
pub trait Store: Send + Sync {
    /// Idempotent; creates backing structures sized to `dimensions`.
    fn ensure_collection(&self, dimensions: usize, deadline: Deadline) -> Result<()>;

    /// Atomic insert-or-replace keyed by `memory.id`. Rejects a vector whose
    /// length doesn't match the configured dimension.
    fn upsert(&self, memory: Memory, vector: Vec<f32>, deadline: Deadline) -> Result<()>;

    fn get(&self, id: &str, deadline: Deadline) -> Result<Memory>;

    fn delete(&self, id: &str, deadline: Deadline) -> Result<()>;

    /// Cursor-based pagination ordered by id; `next_cursor` is empty when
    /// exhausted.
    fn list(
        &self,
        filters: &SearchFilters,
        limit: usize,
        cursor: &str,
        deadline: Deadline,
    ) -> Result<(Vec<Memory>, Cursor)>;

    /// Up to `limit` items ordered by descending cosine similarity.
    /// Sensitive-visibility memories are excluded unless `filters` opts in.
    fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
        deadline: Deadline,
    ) -> Result<Vec<SearchResult>>;

    /// ALL results with score >= threshold, no limit.
    fn find_duplicates(&self, vector: &[f32], threshold: f32, deadline: Deadline) -> Result<Vec<SearchResult>>;

    /// Sets `last_accessed = now`, increments `access_count`. A no-op on a
    /// missing id (§9 open question (a): chosen to be silent, not NotFound).
    fn update_access_metadata(&self, id: &str, deadline: Deadline) -> Result<()>;

    fn stats(&self, deadline: Deadline) -> Result<CollectionStats>;

    fn close(&self) -> Result<()>;

    /// Rewrites `confidence` and `updated_at` in place, without touching the
    /// stored vector. Not part of spec's literal Store contract table, but
    /// required for `LifecycleManager`'s decay pass to mutate a memory it
    /// never re-embeds (§4.12) — `Upsert` alone can't express this since it
    /// requires a vector the decay pass doesn't have.
    fn update_confidence(&self, id: &str, confidence: f32, updated_at: chrono::DateTime<chrono::Utc>, deadline: Deadline) -> Result<()>;

    /// Replaces `tags` and `access_count` on the consolidation survivor.
    /// Same rationale as [`Store::update_confidence`], for §4.12's merge step.
    fn merge_consolidated_fields(&self, id: &str, tags: Vec<String>, access_count: u64, deadline: Deadline) -> Result<()>;

    /// Returns the stored embedding vector for `id`. Not part of spec's
    /// literal Store contract table, but required for `LifecycleManager`'s
    /// consolidation pass (§4.12) to cluster by the same cosine-similarity
    /// space `Search`/`FindDuplicates` already use, rather than an
    /// unrelated proxy metric.
    fn get_vector(&self, id: &str, deadline: Deadline) -> Result<Vec<f32>>;
}

/// Helper used by both Store implementations to keep `SearchResult`s sorted
/// by descending similarity and truncated to `limit`.
pub(crate) fn top_n(mut results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);
    results
}

#[allow(dead_code)]
pub(crate) fn memory_id_is_valid(id: &MemoryId) -> bool {
    !id.is_empty()
}
