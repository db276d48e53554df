//! Capture pipeline (§4.10): turn candidates into persisted memories, after
//! classification, dedup, and (optionally) conflict detection.

use chrono::Utc;
use tracing::{debug, warn};

use crate::capturer::Capturer;
use crate::classifier::Classifier;
use crate::conflict::ConflictDetector;
use crate::embedding::Embedder;
use crate::entities::EntityExtractor;
use crate::error::Result;
use crate::store::{Deadline, Store};
use crate::types::{Entity, Memory, MemoryScope, Visibility};

pub struct PostTurnInput<'a> {
    pub user_message: &'a str,
    pub assistant_message: &'a str,
    #[allow(dead_code)] // carried through metadata; not otherwise consumed by the core pipeline
    pub session_id: &'a str,
    pub project: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct PostTurnOutput {
    pub stored: bool,
    pub stored_count: usize,
}

pub struct PostTurnPipeline<'a> {
    embedder: &'a dyn Embedder,
    store: &'a dyn Store,
    capturer: &'a Capturer<'a>,
    conflict_detector: Option<&'a ConflictDetector<'a>>,
    entity_extractor: Option<&'a EntityExtractor<'a>>,
    dedup_threshold: f32,
}

impl<'a> PostTurnPipeline<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        store: &'a dyn Store,
        capturer: &'a Capturer<'a>,
        dedup_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            store,
            capturer,
            conflict_detector: None,
            entity_extractor: None,
            dedup_threshold,
        }
    }

    pub fn with_conflict_detector(mut self, detector: &'a ConflictDetector<'a>) -> Self {
        self.conflict_detector = Some(detector);
        self
    }

    pub fn with_entity_extractor(mut self, extractor: &'a EntityExtractor<'a>) -> Self {
        self.entity_extractor = Some(extractor);
        self
    }

    /// Runs the capture pipeline. Returns `stored=false` (not an error) when
    /// the Capturer finds nothing (§4.10 step 1). Per-candidate failures
    /// (embed, upsert) are logged and skipped — a batch operation must not
    /// abort on a single-item failure (§7 "Propagation policy").
    pub fn run(&self, input: PostTurnInput<'_>, _deadline: Deadline) -> Result<PostTurnOutput> {
        let candidates = self.capturer.extract(input.user_message, input.assistant_message)?;
        if candidates.is_empty() {
            return Ok(PostTurnOutput {
                stored: false,
                stored_count: 0,
            });
        }

        let mut stored_count = 0usize;
        let mut stored_memories: Vec<Memory> = Vec::new();

        for candidate in candidates {
            let memory_type = candidate
                .memory_type
                .unwrap_or_else(|| Classifier::classify(&candidate.content));

            let content_hash = Memory::compute_content_hash(&candidate.content);
            if stored_memories
                .iter()
                .any(|m| m.content_hash.as_deref() == Some(content_hash.as_str()))
            {
                debug!(content = %candidate.content, "post-turn: exact-duplicate within batch, skipping before embed");
                continue;
            }

            let vector = match self.embedder.embed(&candidate.content) {
                Ok(v) => v,
                Err(err) => {
                    warn!(error = %err, "post-turn: failed to embed candidate, skipping");
                    continue;
                }
            };

            let duplicates = match self.store.find_duplicates(&vector, self.dedup_threshold, Deadline::none()) {
                Ok(d) => d,
                Err(err) => {
                    warn!(error = %err, "post-turn: dedup lookup failed, degrading open and proceeding");
                    Vec::new()
                }
            };
            if !duplicates.is_empty() {
                debug!(content = %candidate.content, "post-turn: candidate is a duplicate, skipping");
                continue;
            }

            let mut supersedes_id = None;
            if let Some(detector) = self.conflict_detector {
                let verdict = detector.detect(&candidate.content, &stored_memories);
                if verdict.contradicts {
                    supersedes_id = verdict.contradicted_id;
                }
            }

            let now = Utc::now();
            let memory = Memory {
                id: uuid::Uuid::new_v4().to_string(),
                memory_type,
                scope: MemoryScope::Session,
                visibility: Visibility::Private,
                content: candidate.content,
                confidence: candidate.confidence,
                source: "post-turn-hook".to_string(),
                tags: candidate.tags,
                project: input.project.to_string(),
                created_at: now,
                updated_at: now,
                last_accessed: now,
                access_count: 0,
                ttl_seconds: 0,
                valid_until: None,
                supersedes_id,
                metadata: Default::default(),
                content_hash: Some(content_hash),
            };

            if let Some(extractor) = self.entity_extractor {
                let _entities: Vec<Entity> = extractor.extract(&memory);
                // Entity persistence is outside the Store contract (§4.1);
                // extraction runs as a best-effort enrichment hook only.
            }

            match self.store.upsert(memory.clone(), vector, Deadline::none()) {
                Ok(()) => {
                    stored_count += 1;
                    stored_memories.push(memory);
                }
                Err(err) => {
                    warn!(error = %err, "post-turn: upsert failed, skipping candidate");
                }
            }
        }

        Ok(PostTurnOutput {
            stored: stored_count > 0,
            stored_count,
        })
    }
}
