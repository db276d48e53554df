//! Store CRUD benchmarks (AMBIENT-5): upsert, get, list, delete against the
//! in-memory backend, mirroring the teacher's `benches/memory_ops.rs`
//! shape (one `criterion::benchmark_group` per operation, `black_box` on
//! the varying input).

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use memoria::embedding::{Embedder, TfIdfEmbedder};
use memoria::store::{Deadline, InMemoryStore, Store};
use memoria::types::{Memory, MemoryScope, MemoryType, SearchFilters, Visibility};

const DIMENSIONS: usize = 256;

fn sample_memory(id: &str, content: &str) -> Memory {
    let now = chrono::Utc::now();
    Memory {
        id: id.to_string(),
        memory_type: MemoryType::Fact,
        scope: MemoryScope::Permanent,
        visibility: Visibility::Shared,
        content: content.to_string(),
        confidence: 0.8,
        source: "benchmark".to_string(),
        tags: vec!["bench".to_string()],
        project: "bench-project".to_string(),
        created_at: now,
        updated_at: now,
        last_accessed: now,
        access_count: 0,
        ttl_seconds: 0,
        valid_until: None,
        supersedes_id: None,
        metadata: Default::default(),
        content_hash: Some(Memory::compute_content_hash(content)),
    }
}

fn bench_upsert(c: &mut Criterion) {
    let store = InMemoryStore::new();
    store.ensure_collection(DIMENSIONS, Deadline::none()).unwrap();
    let embedder = TfIdfEmbedder::new(DIMENSIONS);

    let mut group = c.benchmark_group("memory_upsert");
    group.throughput(Throughput::Elements(1));

    let mut i = 0usize;
    group.bench_function("insert", |b| {
        b.iter(|| {
            let content = format!("Memory content number {i} describing a durable fact about the system");
            let vector = embedder.embed(&content).unwrap();
            let memory = sample_memory(&format!("m{i}"), &content);
            store.upsert(black_box(memory), vector, Deadline::none()).unwrap();
            i += 1;
        })
    });

    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let store = InMemoryStore::new();
    store.ensure_collection(DIMENSIONS, Deadline::none()).unwrap();
    let embedder = TfIdfEmbedder::new(DIMENSIONS);

    let mut ids = Vec::new();
    for i in 0..1000 {
        let content = format!("Memory content number {i}");
        let vector = embedder.embed(&content).unwrap();
        let memory = sample_memory(&format!("m{i}"), &content);
        store.upsert(memory, vector, Deadline::none()).unwrap();
        ids.push(format!("m{i}"));
    }

    let mut group = c.benchmark_group("memory_get");
    group.throughput(Throughput::Elements(1));

    let mut i = 0usize;
    group.bench_function("by_id", |b| {
        b.iter(|| {
            let id = &ids[i % ids.len()];
            i += 1;
            store.get(black_box(id), Deadline::none()).unwrap()
        })
    });

    group.finish();
}

fn bench_list(c: &mut Criterion) {
    let store = InMemoryStore::new();
    store.ensure_collection(DIMENSIONS, Deadline::none()).unwrap();
    let embedder = TfIdfEmbedder::new(DIMENSIONS);

    for i in 0..1000 {
        let content = format!("Memory content number {i} with some longer text to simulate real usage");
        let vector = embedder.embed(&content).unwrap();
        store.upsert(sample_memory(&format!("m{i}"), &content), vector, Deadline::none()).unwrap();
    }

    c.bench_function("memory_list_page", |b| {
        b.iter(|| {
            store
                .list(black_box(&SearchFilters::default()), 50, "", Deadline::none())
                .unwrap()
        })
    });
}

fn bench_delete(c: &mut Criterion) {
    let store = InMemoryStore::new();
    store.ensure_collection(DIMENSIONS, Deadline::none()).unwrap();
    let embedder = TfIdfEmbedder::new(DIMENSIONS);

    c.bench_function("memory_delete", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let content = format!("disposable memory {i}");
            let vector = embedder.embed(&content).unwrap();
            let id = format!("d{i}");
            store.upsert(sample_memory(&id, &content), vector, Deadline::none()).unwrap();
            store.delete(black_box(&id), Deadline::none()).unwrap();
            i += 1;
        })
    });
}

criterion_group!(benches, bench_upsert, bench_get, bench_list, bench_delete);
criterion_main!(benches);
