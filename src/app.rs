//! Shared wiring for all four binaries: turns a parsed [`Config`] into the
//! concrete `Store`/`Embedder` trait objects and the stateless collaborators
//! built on top of them, and exposes one method per downstream surface
//! operation (§6) so each `bin/*.rs` stays a thin request -> core call ->
//! protocol response mapping (AMBIENT-1) instead of repeating pipeline
//! wiring three times over.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::capturer::Capturer;
use crate::classifier::Classifier;
use crate::conflict::ConflictDetector;
use crate::config::Config;
use crate::dto::{MemoryPatch, RecallRequest, RememberRequest, SearchRequest};
use crate::embedding::{CachedEmbedder, Embedder, TfIdfEmbedder};
use crate::entities::EntityExtractor;
use crate::error::{MemoriaError, Result};
use crate::lifecycle::{LifecycleManager, LifecycleReport};
use crate::llm::LlmProvider;
use crate::pipeline::{PostTurnInput, PostTurnOutput, PostTurnPipeline, PreTurnInput, PreTurnOutput, PreTurnPipeline};
use crate::ranker::Ranker;
use crate::store::{Cursor, Deadline, SqliteStore, Store};
use crate::types::{Memory, MemoryScope, MemoryType, SearchFilters, SearchResult, Visibility};

/// Owns the concrete `Store` and `Embedder` behind the core's abstract
/// traits, plus a `Ranker` built from the configured weights and an optional
/// `LlmProvider` for the Capturer/ConflictDetector/EntityExtractor/Reasoner
/// quartet. Held as `Arc<dyn Trait>` so the HTTP and MCP servers can share
/// one instance across concurrently-handled requests (§5 "Concurrency
/// model": the core itself is stateless, so sharing is just
/// reference-counting, no locking beyond what each `Store` impl already
/// does internally).
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub ranker: Ranker,
    pub config: Config,
}

impl AppContext {
    pub fn build(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = match config.store_backend()? {
            crate::config::StoreBackend::Memory => Arc::new(crate::store::InMemoryStore::new()),
            crate::config::StoreBackend::Sqlite => Arc::new(SqliteStore::open(config.expanded_db_path())?),
        };
        store.ensure_collection(config.dimensions, Deadline::none())?;

        let embedder: Arc<dyn Embedder> = build_embedder(&config)?;
        let llm = try_build_llm_provider(&config);
        let ranker = Ranker::new(config.ranker_weights());

        Ok(Self {
            store,
            embedder,
            llm,
            ranker,
            config,
        })
    }

    /// `POST /v1/remember` / `remember` MCP tool (§6). Classifies the type
    /// if absent, rejects an explicit duplicate at the configured dedup
    /// threshold by returning the existing id with `stored=false` (§8
    /// scenario 6), otherwise persists a fresh memory.
    pub fn remember(&self, req: RememberRequest, deadline: Deadline) -> Result<(String, bool)> {
        let memory_type: MemoryType = match req.memory_type {
            Some(t) => t.parse().map_err(MemoriaError::InvalidInput)?,
            None => Classifier::classify(&req.content),
        };
        let scope: MemoryScope = match req.scope {
            Some(s) => s.parse().map_err(MemoriaError::InvalidInput)?,
            None => MemoryScope::Permanent,
        };

        let vector = self.embedder.embed(&req.content)?;
        let duplicates = self.store.find_duplicates(&vector, self.config.dedup_threshold, deadline)?;
        if let Some(existing) = duplicates.first() {
            return Ok((existing.memory.id.clone(), false));
        }

        let now = Utc::now();
        let mut tags = req.tags;
        tags.sort();
        tags.dedup();

        let id = Uuid::new_v4().to_string();
        let memory = Memory {
            id: id.clone(),
            memory_type,
            scope,
            visibility: Visibility::Shared,
            content: req.content.clone(),
            confidence: req.confidence.unwrap_or(0.8),
            source: "api".to_string(),
            tags,
            project: req.project,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            access_count: 0,
            ttl_seconds: 0,
            valid_until: None,
            supersedes_id: None,
            metadata: Default::default(),
            content_hash: Some(Memory::compute_content_hash(&req.content)),
        };

        self.store.upsert(memory, vector, deadline)?;
        Ok((id, true))
    }

    /// `POST /v1/recall` / `recall` MCP tool / hook `pre` subcommand (§4.9,
    /// §6).
    pub fn recall(&self, req: RecallRequest, deadline: Deadline) -> Result<PreTurnOutput> {
        let pipeline = PreTurnPipeline::new(self.embedder.as_ref(), self.store.as_ref(), &self.ranker);
        pipeline.run(
            PreTurnInput {
                message: &req.message,
                project: &req.project,
                token_budget: req.budget.unwrap_or(0),
            },
            deadline,
        )
    }

    /// `POST /v1/search` / `search` MCP tool (§6): raw similarity search,
    /// unranked, capped at `req.limit` (default 10).
    pub fn search(&self, req: SearchRequest, deadline: Deadline) -> Result<Vec<SearchResult>> {
        let vector = self.embedder.embed(&req.message)?;

        let mut filters = SearchFilters::default();
        filters.memory_type = req
            .memory_type
            .map(|t| t.parse())
            .transpose()
            .map_err(MemoriaError::InvalidInput)?;
        filters.scope = req.scope.map(|s| s.parse()).transpose().map_err(MemoriaError::InvalidInput)?;
        if !req.project.is_empty() {
            filters.project = Some(req.project);
        }
        filters.tags = req.tags;

        self.store.search(&vector, req.limit.unwrap_or(10), &filters, deadline)
    }

    /// `GET /v1/memories` / `list` MCP-adjacent surface (§6).
    pub fn list(&self, filters: &SearchFilters, limit: usize, cursor: &str, deadline: Deadline) -> Result<(Vec<Memory>, Cursor)> {
        self.store.list(filters, limit, cursor, deadline)
    }

    /// `GET /v1/memories/{id}` (§6).
    pub fn get(&self, id: &str, deadline: Deadline) -> Result<Memory> {
        self.store.get(id, deadline)
    }

    /// `PUT /v1/memories/{id}` (§6). `project`/`confidence` are nullable
    /// pointers: `Some(None)` clears the field, `None` leaves it untouched
    /// (see [`crate::dto::MemoryPatch`]). Content changes trigger
    /// re-embedding so the stored vector stays consistent with the text.
    pub fn update(&self, id: &str, patch: MemoryPatch, deadline: Deadline) -> Result<Memory> {
        let mut memory = self.store.get(id, deadline)?;
        let mut content_changed = false;

        if let Some(content) = patch.content {
            content_changed = content != memory.content;
            memory.content = content;
        }
        if let Some(t) = patch.memory_type {
            memory.memory_type = t.parse().map_err(MemoriaError::InvalidInput)?;
        }
        if let Some(s) = patch.scope {
            memory.scope = s.parse().map_err(MemoriaError::InvalidInput)?;
        }
        if let Some(v) = patch.visibility {
            memory.visibility = v.parse().map_err(MemoriaError::InvalidInput)?;
        }
        if let Some(mut tags) = patch.tags {
            tags.sort();
            tags.dedup();
            memory.tags = tags;
        }
        if let Some(project) = patch.project {
            memory.project = project.unwrap_or_default();
        }
        if let Some(confidence) = patch.confidence {
            memory.confidence = confidence.unwrap_or(0.0);
        }
        memory.updated_at = Utc::now();
        if content_changed {
            memory.content_hash = Some(Memory::compute_content_hash(&memory.content));
        }

        // The Store contract has no field-only update beyond
        // confidence/tags (§4.1), so a metadata-only patch still re-embeds
        // and re-upserts; the vector is unchanged since the content is.
        let vector = self.embedder.embed(&memory.content)?;
        self.store.upsert(memory.clone(), vector, deadline)?;

        Ok(memory)
    }

    /// `DELETE /v1/memories/{id}` / `forget` MCP tool (§6). Returns `false`
    /// rather than propagating `NotFound`, matching the `{deleted: bool}`
    /// response shape instead of a 404 at this layer (callers that need the
    /// 404 semantics check `Store::get` first).
    pub fn forget(&self, id: &str, deadline: Deadline) -> Result<bool> {
        match self.store.delete(id, deadline) {
            Ok(()) => Ok(true),
            Err(MemoriaError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// `GET /v1/stats` / `stats` MCP tool (§6).
    pub fn stats(&self, deadline: Deadline) -> Result<crate::types::CollectionStats> {
        self.store.stats(deadline)
    }

    /// Hook `post` subcommand / `POST /v1/post-turn`-equivalent (§4.10,
    /// §6). Requires an `LlmProvider` for the Capturer; absent one, this is
    /// treated as unavailable rather than attempted with a stub, so callers
    /// (the hook binary in particular) degrade to the zero-value output
    /// rather than silently capturing nothing (§7 "LLM degraded").
    pub fn post_turn(&self, input: PostTurnInput<'_>, deadline: Deadline) -> Result<PostTurnOutput> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| MemoriaError::Unavailable("no LLM provider configured".to_string()))?;

        let capturer = Capturer::new(llm.as_ref(), self.config.llm_model.clone());
        let conflict_detector = ConflictDetector::new(llm.as_ref(), self.config.llm_model.clone());
        let entity_extractor = EntityExtractor::new(llm.as_ref(), self.config.llm_model.clone());

        let pipeline = PostTurnPipeline::new(
            self.embedder.as_ref(),
            self.store.as_ref(),
            &capturer,
            self.config.dedup_threshold_post_turn,
        )
        .with_conflict_detector(&conflict_detector)
        .with_entity_extractor(&entity_extractor);

        pipeline.run(input, deadline)
    }

    /// Runs the periodic maintenance pass (§4.12). `memoria-cli lifecycle`
    /// and a `serve`-mode background task both call this.
    pub fn run_lifecycle(&self, dry_run: bool) -> Result<LifecycleReport> {
        let manager = self.config.lifecycle_manager(self.store.as_ref());
        manager.run(Utc::now(), dry_run)
    }
}

#[allow(dead_code)]
fn unused_lifecycle_manager_type_check(_m: &LifecycleManager<'_>) {}

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    match config.embedding_provider.as_str() {
        "tfidf" => Ok(Arc::new(TfIdfEmbedder::new(config.dimensions))),
        #[cfg(feature = "openai")]
        "openai" => {
            let api_key = config
                .openai_api_key
                .clone()
                .ok_or_else(|| MemoriaError::Config("OPENAI_API_KEY required for embedding-provider=openai".into()))?;
            let inner = crate::embedding::OpenAiEmbedder::new(
                api_key,
                config.embedding_model.clone(),
                config.dimensions,
            )
            .with_base_url(config.openai_base_url.clone());
            Ok(Arc::new(CachedEmbedder::new(inner, config.embed_cache_capacity)))
        }
        #[cfg(not(feature = "openai"))]
        "openai" => Err(MemoriaError::Config(
            "embedding-provider=openai requires the `openai` feature".into(),
        )),
        other => Err(MemoriaError::Config(format!("unknown embedding provider: {other}"))),
    }
}

/// Unlike the embedder, a missing LLM provider is not a startup error: the
/// LLM-backed quartet (Capturer/ConflictDetector/EntityExtractor/Reasoner)
/// is an optional external collaborator (§6 "Upstream collaborators") whose
/// absence degrades PostTurn capture, not the whole service.
#[cfg(feature = "openai")]
fn try_build_llm_provider(config: &Config) -> Option<Arc<dyn LlmProvider>> {
    let api_key = config.openai_api_key.clone()?;
    let provider = crate::llm::OpenAiChatProvider::new(api_key).with_base_url(config.openai_base_url.clone());
    Some(Arc::new(provider))
}

#[cfg(not(feature = "openai"))]
fn try_build_llm_provider(_config: &Config) -> Option<Arc<dyn LlmProvider>> {
    None
}

#[cfg(feature = "openai")]
pub fn build_llm_provider(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    try_build_llm_provider(config)
        .ok_or_else(|| MemoriaError::Config("OPENAI_API_KEY required for LLM-backed components".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;

    fn test_config() -> Config {
        use clap::Parser;
        #[derive(Parser)]
        struct Args {
            #[command(flatten)]
            config: Config,
        }
        let mut cfg = Args::parse_from(["test", "--store-backend", "memory", "--dimensions", "32"]).config;
        cfg.embedding_provider = "tfidf".to_string();
        cfg
    }

    #[test]
    fn build_uses_configured_backend_and_dimensions() {
        let ctx = AppContext::build(test_config()).unwrap();
        assert_eq!(ctx.config.store_backend().unwrap(), StoreBackend::Memory);
        assert_eq!(ctx.embedder.dimensions(), 32);
    }

    #[test]
    fn remember_then_recall_round_trips() {
        let ctx = AppContext::build(test_config()).unwrap();
        let (id, stored) = ctx
            .remember(
                RememberRequest {
                    content: "Always write tests before merging.".to_string(),
                    memory_type: None,
                    scope: None,
                    tags: vec![],
                    project: String::new(),
                    confidence: None,
                },
                Deadline::none(),
            )
            .unwrap();
        assert!(stored);

        let fetched = ctx.get(&id, Deadline::none()).unwrap();
        assert_eq!(fetched.memory_type, MemoryType::Rule);

        let recalled = ctx
            .recall(
                RecallRequest {
                    message: "Always write tests before merging.".to_string(),
                    project: String::new(),
                    budget: None,
                },
                Deadline::none(),
            )
            .unwrap();
        assert_eq!(recalled.memory_count, 1);
    }

    #[test]
    fn remember_duplicate_does_not_store_second_id() {
        let ctx = AppContext::build(test_config()).unwrap();
        let req = || RememberRequest {
            content: "The sky is blue.".to_string(),
            memory_type: None,
            scope: None,
            tags: vec![],
            project: String::new(),
            confidence: None,
        };
        let (first_id, first_stored) = ctx.remember(req(), Deadline::none()).unwrap();
        let (second_id, second_stored) = ctx.remember(req(), Deadline::none()).unwrap();
        assert!(first_stored);
        assert!(!second_stored);
        assert_eq!(first_id, second_id);
    }

    #[test]
    fn forget_missing_id_returns_false_not_error() {
        let ctx = AppContext::build(test_config()).unwrap();
        assert!(!ctx.forget("does-not-exist", Deadline::none()).unwrap());
    }

    #[test]
    fn post_turn_without_llm_provider_is_unavailable() {
        let ctx = AppContext::build(test_config()).unwrap();
        assert!(ctx.llm.is_none());
        let result = ctx.post_turn(
            PostTurnInput {
                user_message: "hi",
                assistant_message: "hello",
                session_id: "s1",
                project: "",
            },
            Deadline::none(),
        );
        assert!(matches!(result, Err(MemoriaError::Unavailable(_))));
    }
}
