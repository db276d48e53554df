//! End-to-end exercise of the PreTurn/PostTurn pipelines against a
//! file-backed `SqliteStore`, the way a real deployment runs them, rather
//! than the in-memory backend most unit tests use.

use pretty_assertions::assert_eq;

use memoria::embedding::{Embedder, TfIdfEmbedder};
use memoria::llm::test_support::ScriptedLlm;
use memoria::pipeline::{PostTurnInput, PostTurnPipeline, PreTurnInput, PreTurnPipeline};
use memoria::ranker::{Ranker, RankerWeights};
use memoria::store::{Deadline, SqliteStore, Store};
use memoria::types::{Memory, MemoryScope, MemoryType, Visibility};

const DIMENSIONS: usize = 64;

fn seed_memory(store: &SqliteStore, embedder: &TfIdfEmbedder, id: &str, content: &str, project: &str) {
    let now = chrono::Utc::now();
    let vector = embedder.embed(content).unwrap();
    let memory = Memory {
        id: id.to_string(),
        memory_type: MemoryType::Rule,
        scope: MemoryScope::Permanent,
        visibility: Visibility::Shared,
        content: content.to_string(),
        confidence: 0.9,
        source: "explicit".to_string(),
        tags: vec![],
        project: project.to_string(),
        created_at: now,
        updated_at: now,
        last_accessed: now,
        access_count: 0,
        ttl_seconds: 0,
        valid_until: None,
        supersedes_id: None,
        metadata: Default::default(),
        content_hash: Some(Memory::compute_content_hash(content)),
    };
    store.upsert(memory, vector, Deadline::none()).unwrap();
}

#[test]
fn pre_turn_recalls_seeded_memory_from_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("memories.db")).unwrap();
    store.ensure_collection(DIMENSIONS, Deadline::none()).unwrap();
    let embedder = TfIdfEmbedder::new(DIMENSIONS);

    seed_memory(&store, &embedder, "m1", "Always run the test suite before merging.", "acme");

    let ranker = Ranker::new(RankerWeights::default());
    let pipeline = PreTurnPipeline::new(&embedder, &store, &ranker);

    let out = pipeline
        .run(
            PreTurnInput {
                message: "what's the policy on running tests before merging",
                project: "acme",
                token_budget: 2000,
            },
            Deadline::none(),
        )
        .unwrap();

    assert_eq!(out.memory_count, 1);
    assert!(out.context.contains("Always run the test suite before merging."));
    assert!(out.tokens_used > 0);

    let after = store.get("m1", Deadline::none()).unwrap();
    assert_eq!(after.access_count, 1);
}

#[test]
fn post_turn_capture_persists_and_is_recallable() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("memories.db")).unwrap();
    store.ensure_collection(DIMENSIONS, Deadline::none()).unwrap();
    let embedder = TfIdfEmbedder::new(DIMENSIONS);

    let llm = ScriptedLlm::ok(
        r#"[{"content": "The deploy pipeline requires two approvals.", "type": "rule", "confidence": 0.9}]"#,
    );
    let capturer = memoria::capturer::Capturer::new(&llm, "test-model");
    let post_turn = PostTurnPipeline::new(&embedder, &store, &capturer, 0.95);

    let out = post_turn
        .run(
            PostTurnInput {
                user_message: "how many approvals does a deploy need",
                assistant_message: "the deploy pipeline requires two approvals",
                session_id: "s1",
                project: "acme",
            },
            Deadline::none(),
        )
        .unwrap();

    assert!(out.stored);
    assert_eq!(out.stored_count, 1);

    let ranker = Ranker::new(RankerWeights::default());
    let pre_turn = PreTurnPipeline::new(&embedder, &store, &ranker);
    let recalled = pre_turn
        .run(
            PreTurnInput {
                message: "The deploy pipeline requires two approvals.",
                project: "acme",
                token_budget: 2000,
            },
            Deadline::none(),
        )
        .unwrap();

    assert_eq!(recalled.memory_count, 1);
    assert!(recalled.context.contains("two approvals"));
}

#[test]
fn deleted_memory_is_not_recalled() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("memories.db")).unwrap();
    store.ensure_collection(DIMENSIONS, Deadline::none()).unwrap();
    let embedder = TfIdfEmbedder::new(DIMENSIONS);

    seed_memory(&store, &embedder, "m1", "Rotate API keys every ninety days.", "acme");
    store.delete("m1", Deadline::none()).unwrap();

    assert!(store.get("m1", Deadline::none()).is_err());
    assert!(store.delete("m1", Deadline::none()).is_err());

    let ranker = Ranker::new(RankerWeights::default());
    let pipeline = PreTurnPipeline::new(&embedder, &store, &ranker);
    let out = pipeline
        .run(
            PreTurnInput {
                message: "how often should API keys be rotated",
                project: "acme",
                token_budget: 2000,
            },
            Deadline::none(),
        )
        .unwrap();

    assert_eq!(out.memory_count, 0);
}
