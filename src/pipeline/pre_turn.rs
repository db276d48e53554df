//! Recall pipeline (§4.9): embed the turn, search, rank, budget-pack, and
//! record access metadata for whatever made it into the packed context.

use chrono::Utc;
use tracing::warn;

use crate::budget::{estimate_tokens, format_memories_with_budget};
use crate::config::{DEFAULT_SEARCH_LIMIT, DEFAULT_TOKEN_BUDGET};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::ranker::Ranker;
use crate::store::{Deadline, Store};
use crate::types::{RecallResult, SearchFilters};

use super::render_memory;

pub struct PreTurnInput<'a> {
    pub message: &'a str,
    pub project: &'a str,
    /// <= 0 falls back to [`DEFAULT_TOKEN_BUDGET`] (§4.9 "Default budget").
    pub token_budget: i64,
}

#[derive(Debug, Clone)]
pub struct PreTurnOutput {
    pub context: String,
    pub memory_count: usize,
    pub tokens_used: usize,
    pub memories: Vec<RecallResult>,
}

impl PreTurnOutput {
    /// The zero-value output hook surfaces degrade to (§6 hook surface,
    /// §8 scenario 7).
    pub fn empty() -> Self {
        Self {
            context: String::new(),
            memory_count: 0,
            tokens_used: 0,
            memories: Vec::new(),
        }
    }
}

pub struct PreTurnPipeline<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn Store,
    ranker: &'a Ranker,
}

impl<'a> PreTurnPipeline<'a> {
    pub fn new(embedder: &'a dyn Embedder, store: &'a dyn Store, ranker: &'a Ranker) -> Self {
        Self {
            embedder,
            store,
            ranker,
        }
    }

    pub fn run(&self, input: PreTurnInput<'_>, deadline: Deadline) -> Result<PreTurnOutput> {
        let budget = if input.token_budget <= 0 {
            DEFAULT_TOKEN_BUDGET
        } else {
            input.token_budget
        };

        let vector = self.embedder.embed(input.message)?;

        let results = self.store.search(
            &vector,
            DEFAULT_SEARCH_LIMIT,
            &SearchFilters::default(),
            deadline,
        )?;

        let now = Utc::now();
        let ranked = self.ranker.rank(results, input.project, now);

        let rendered: Vec<String> = ranked.iter().map(|r| render_memory(&r.memory)).collect();
        let (context, count) = format_memories_with_budget(&rendered, budget);

        for recalled in ranked.iter().take(count) {
            if let Err(err) = self.store.update_access_metadata(&recalled.memory.id, deadline) {
                warn!(memory_id = %recalled.memory.id, error = %err, "failed to update access metadata");
            }
        }

        Ok(PreTurnOutput {
            tokens_used: estimate_tokens(&context),
            context,
            memory_count: count,
            memories: ranked.into_iter().take(count).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TfIdfEmbedder;
    use crate::ranker::RankerWeights;
    use crate::store::InMemoryStore;
    use crate::types::{Memory, MemoryScope, MemoryType, Visibility};
    use std::collections::HashMap;

    fn memory(id: &str, content: &str) -> Memory {
        let now = Utc::now();
        Memory {
            id: id.into(),
            memory_type: MemoryType::Fact,
            scope: MemoryScope::Permanent,
            visibility: Visibility::Shared,
            content: content.into(),
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
            metadata: HashMap::new(),
            content_hash: None,
        }
    }

    #[test]
    fn default_budget_applies_when_non_positive() {
        let embedder = TfIdfEmbedder::new(32);
        let store = InMemoryStore::new();
        let vec = embedder.embed("rust testing patterns").unwrap();
        store.upsert(memory("m1", "Always write tests first."), vec, Deadline::none()).unwrap();

        let ranker = Ranker::new(RankerWeights::default());
        let pipeline = PreTurnPipeline::new(&embedder, &store, &ranker);

        let out = pipeline
            .run(
                PreTurnInput {
                    message: "rust testing patterns",
                    project: "",
                    token_budget: 0,
                },
                Deadline::none(),
            )
            .unwrap();

        assert_eq!(out.memory_count, 1);
        assert!(out.context.contains("Always write tests first."));
    }

    #[test]
    fn updates_access_metadata_for_recalled_memories_only() {
        let embedder = TfIdfEmbedder::new(32);
        let store = InMemoryStore::new();
        let vec = embedder.embed("deploy procedure").unwrap();
        store.upsert(memory("m1", "Deploy procedure: build then ship."), vec.clone(), Deadline::none()).unwrap();

        let ranker = Ranker::new(RankerWeights::default());
        let pipeline = PreTurnPipeline::new(&embedder, &store, &ranker);

        pipeline
            .run(
                PreTurnInput {
                    message: "deploy procedure",
                    project: "",
                    token_budget: 2000,
                },
                Deadline::none(),
            )
            .unwrap();

        let after = store.get("m1", Deadline::none()).unwrap();
        assert_eq!(after.access_count, 1);
    }

    #[test]
    fn budget_too_small_yields_empty_context() {
        let embedder = TfIdfEmbedder::new(32);
        let store = InMemoryStore::new();
        let vec = embedder.embed(&"x".repeat(2000)).unwrap();
        store.upsert(memory("m1", &"x".repeat(2000)), vec, Deadline::none()).unwrap();

        let ranker = Ranker::new(RankerWeights::default());
        let pipeline = PreTurnPipeline::new(&embedder, &store, &ranker);

        let out = pipeline
            .run(
                PreTurnInput {
                    message: "x",
                    project: "",
                    token_budget: 1,
                },
                Deadline::none(),
            )
            .unwrap();

        assert_eq!(out.memory_count, 0);
        assert_eq!(out.context, "");
    }
}
