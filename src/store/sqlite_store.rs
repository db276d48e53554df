//! On-disk `Store` implementation backed by `rusqlite`. Vectors are stored
//! as little-endian `f32` blobs and compared with brute-force cosine
//! similarity; the real vector-database internals (ANN indexes, sharding)
//! are an external collaborator and out of scope (§6 "Upstream
//! collaborators").

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::embedding::cosine_similarity;
use crate::error::{MemoriaError, Result};
use crate::types::{CollectionStats, Memory, MemoryScope, MemoryType, SearchFilters, SearchResult, Visibility};

use super::{top_n, Cursor, Deadline, Store};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    memory_type TEXT NOT NULL,
    scope TEXT NOT NULL,
    visibility TEXT NOT NULL,
    content TEXT NOT NULL,
    confidence REAL NOT NULL,
    source TEXT NOT NULL,
    tags TEXT NOT NULL,
    project TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    last_accessed TEXT NOT NULL,
    access_count INTEGER NOT NULL,
    ttl_seconds INTEGER NOT NULL,
    valid_until TEXT,
    supersedes_id TEXT,
    metadata TEXT NOT NULL,
    content_hash TEXT,
    vector BLOB NOT NULL
);
";

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn row_to_memory(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    let memory_type: String = row.get("memory_type")?;
    let scope: String = row.get("scope")?;
    let visibility: String = row.get("visibility")?;
    let tags: String = row.get("tags")?;
    let metadata: String = row.get("metadata")?;
    let valid_until: Option<String> = row.get("valid_until")?;
    let supersedes_id: Option<String> = row.get("supersedes_id")?;
    let content_hash: Option<String> = row.get("content_hash")?;

    Ok(Memory {
        id: row.get("id")?,
        memory_type: memory_type.parse().unwrap_or(MemoryType::Fact),
        scope: scope.parse().unwrap_or(MemoryScope::Permanent),
        visibility: visibility.parse().unwrap_or(Visibility::Shared),
        content: row.get("content")?,
        confidence: row.get("confidence")?,
        source: row.get("source")?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        project: row.get("project")?,
        created_at: row.get::<_, String>("created_at")?.parse().unwrap_or_else(|_| Utc::now()),
        updated_at: row.get::<_, String>("updated_at")?.parse().unwrap_or_else(|_| Utc::now()),
        last_accessed: row.get::<_, String>("last_accessed")?.parse().unwrap_or_else(|_| Utc::now()),
        access_count: row.get::<_, i64>("access_count")? as u64,
        ttl_seconds: row.get::<_, i64>("ttl_seconds")? as u64,
        valid_until: valid_until.and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        supersedes_id,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        content_hash,
    })
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    dimensions: std::sync::atomic::AtomicUsize,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            dimensions: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    fn visible(filters: &SearchFilters, memory: &Memory) -> bool {
        if filters.visibility.is_none() && memory.visibility == Visibility::Sensitive {
            return false;
        }
        filters.matches(memory)
    }
}

impl Store for SqliteStore {
    fn ensure_collection(&self, dimensions: usize, _deadline: Deadline) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(SCHEMA)?;
        self.dimensions.store(dimensions, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn upsert(&self, memory: Memory, vector: Vec<f32>, _deadline: Deadline) -> Result<()> {
        let expected = self.dimensions.load(std::sync::atomic::Ordering::SeqCst);
        if expected != 0 && vector.len() != expected {
            return Err(MemoriaError::InvalidInput(format!(
                "vector has {} dimensions, expected {}",
                vector.len(),
                expected
            )));
        }
        let memory = memory.deep_clone();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO memories (id, memory_type, scope, visibility, content, confidence, source, \
             tags, project, created_at, updated_at, last_accessed, access_count, ttl_seconds, \
             valid_until, supersedes_id, metadata, content_hash, vector) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19) \
             ON CONFLICT(id) DO UPDATE SET \
             memory_type=excluded.memory_type, scope=excluded.scope, visibility=excluded.visibility, \
             content=excluded.content, confidence=excluded.confidence, source=excluded.source, \
             tags=excluded.tags, project=excluded.project, created_at=excluded.created_at, \
             updated_at=excluded.updated_at, last_accessed=excluded.last_accessed, \
             access_count=excluded.access_count, ttl_seconds=excluded.ttl_seconds, \
             valid_until=excluded.valid_until, supersedes_id=excluded.supersedes_id, \
             metadata=excluded.metadata, content_hash=excluded.content_hash, vector=excluded.vector",
            params![
                memory.id,
                memory.memory_type.as_str(),
                memory.scope.as_str(),
                memory.visibility.as_str(),
                memory.content,
                memory.confidence,
                memory.source,
                serde_json::to_string(&memory.tags)?,
                memory.project,
                memory.created_at.to_rfc3339(),
                memory.updated_at.to_rfc3339(),
                memory.last_accessed.to_rfc3339(),
                memory.access_count as i64,
                memory.ttl_seconds as i64,
                memory.valid_until.map(|d| d.to_rfc3339()),
                memory.supersedes_id,
                serde_json::to_string(&memory.metadata)?,
                memory.content_hash,
                encode_vector(&vector),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str, _deadline: Deadline) -> Result<Memory> {
        let conn = self.conn.lock();
        conn.query_row("SELECT * FROM memories WHERE id = ?1", params![id], row_to_memory)
            .optional()?
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str, _deadline: Deadline) -> Result<()> {
        let conn = self.conn.lock();
        let affected = conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        if affected == 0 {
            return Err(MemoriaError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn list(
        &self,
        filters: &SearchFilters,
        limit: usize,
        cursor: &str,
        _deadline: Deadline,
    ) -> Result<(Vec<Memory>, Cursor)> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM memories WHERE id > ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![cursor], row_to_memory)?;

        let mut matched: Vec<Memory> = Vec::new();
        for row in rows {
            let memory = row?;
            if Self::visible(filters, &memory) {
                matched.push(memory);
                if matched.len() > limit {
                    break;
                }
            }
        }

        let next_cursor = if matched.len() > limit {
            matched.truncate(limit);
            matched.last().map(|m| m.id.clone()).unwrap_or_default()
        } else {
            String::new()
        };

        Ok((matched, next_cursor))
    }

    fn search(
        &self,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
        _deadline: Deadline,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM memories")?;
        let rows = stmt.query_map([], |row| {
            let memory = row_to_memory(row)?;
            let vector_bytes: Vec<u8> = row.get("vector")?;
            Ok((memory, vector_bytes))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (memory, vector_bytes) = row?;
            if !Self::visible(filters, &memory) {
                continue;
            }
            let stored_vector = decode_vector(&vector_bytes);
            results.push(SearchResult {
                similarity_score: cosine_similarity(vector, &stored_vector),
                memory,
            });
        }

        Ok(top_n(results, limit))
    }

    fn find_duplicates(&self, vector: &[f32], threshold: f32, _deadline: Deadline) -> Result<Vec<SearchResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT * FROM memories")?;
        let rows = stmt.query_map([], |row| {
            let memory = row_to_memory(row)?;
            let vector_bytes: Vec<u8> = row.get("vector")?;
            Ok((memory, vector_bytes))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (memory, vector_bytes) = row?;
            let stored_vector = decode_vector(&vector_bytes);
            let score = cosine_similarity(vector, &stored_vector);
            if score >= threshold {
                results.push(SearchResult {
                    memory,
                    similarity_score: score,
                });
            }
        }

        results.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(results)
    }

    fn update_access_metadata(&self, id: &str, _deadline: Deadline) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE memories SET last_accessed = ?1, access_count = access_count + 1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn stats(&self, _deadline: Deadline) -> Result<CollectionStats> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;

        let mut by_type = HashMap::new();
        let mut stmt = conn.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?;
        for row in rows {
            let (k, v) = row?;
            by_type.insert(k, v);
        }

        let mut by_scope = HashMap::new();
        let mut stmt = conn.prepare("SELECT scope, COUNT(*) FROM memories GROUP BY scope")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?;
        for row in rows {
            let (k, v) = row?;
            by_scope.insert(k, v);
        }

        Ok(CollectionStats {
            total: total as u64,
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
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE memories SET confidence = ?1, updated_at = ?2 WHERE id = ?3",
            params![confidence, updated_at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn merge_consolidated_fields(&self, id: &str, tags: Vec<String>, access_count: u64, _deadline: Deadline) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE memories SET tags = ?1, access_count = ?2 WHERE id = ?3",
            params![serde_json::to_string(&tags)?, access_count as i64, id],
        )?;
        Ok(())
    }

    fn get_vector(&self, id: &str, _deadline: Deadline) -> Result<Vec<f32>> {
        let conn = self.conn.lock();
        let bytes: Option<Vec<u8>> = conn
            .query_row("SELECT vector FROM memories WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        bytes
            .map(|b| decode_vector(&b))
            .ok_or_else(|| MemoriaError::NotFound(id.to_string()))
    }
}
