//! Core data model for Memoria: the `Memory` record, its enums, and the
//! auxiliary `Entity` / `SearchResult` / `RecallResult` types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Unique identifier for a memory. Stable for the memory's life.
pub type MemoryId = String;

/// Memory type classification.
///
/// Iteration order here is significant: the [`crate::classifier::Classifier`]
/// breaks ties in favor of the lowest-index type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Rule,
    Procedure,
    Preference,
    Episode,
    Fact,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Rule => "rule",
            MemoryType::Fact => "fact",
            MemoryType::Episode => "episode",
            MemoryType::Procedure => "procedure",
            MemoryType::Preference => "preference",
        }
    }

    /// All variants in classifier tie-break order (rule, procedure, preference,
    /// episode), with `fact` as the default that is never itself matched by a
    /// pattern set.
    pub const CLASSIFIER_ORDER: [MemoryType; 4] = [
        MemoryType::Rule,
        MemoryType::Procedure,
        MemoryType::Preference,
        MemoryType::Episode,
    ];

    /// Ranker type boost (§4.6). Anything not listed defaults to `1.0`.
    pub fn type_boost(&self) -> f32 {
        match self {
            MemoryType::Rule => 1.5,
            MemoryType::Procedure => 1.3,
            MemoryType::Fact => 1.0,
            MemoryType::Episode => 0.8,
            MemoryType::Preference => 0.7,
        }
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rule" => Ok(MemoryType::Rule),
            "fact" => Ok(MemoryType::Fact),
            "episode" => Ok(MemoryType::Episode),
            "procedure" => Ok(MemoryType::Procedure),
            "preference" => Ok(MemoryType::Preference),
            _ => Err(format!("unknown memory type: {s}")),
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Memory scope, governing lifecycle (§3 invariant 3, §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    Permanent,
    Project,
    Session,
    Ttl,
}

impl MemoryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Permanent => "permanent",
            MemoryScope::Project => "project",
            MemoryScope::Session => "session",
            MemoryScope::Ttl => "ttl",
        }
    }
}

impl std::str::FromStr for MemoryScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "permanent" => Ok(MemoryScope::Permanent),
            "project" => Ok(MemoryScope::Project),
            "session" => Ok(MemoryScope::Session),
            "ttl" => Ok(MemoryScope::Ttl),
            _ => Err(format!("unknown memory scope: {s}")),
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Visibility levels. `Sensitive` is opt-in on reads (§3 invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Shared,
    Private,
    Sensitive,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Shared => "shared",
            Visibility::Private => "private",
            Visibility::Sensitive => "sensitive",
        }
    }
}

impl std::str::FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(Visibility::Shared),
            "private" => Ok(Visibility::Private),
            "sensitive" => Ok(Visibility::Sensitive),
            _ => Err(format!("unknown visibility: {s}")),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single typed, scoped memory record (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: MemoryId,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub scope: MemoryScope,
    #[serde(default)]
    pub visibility: Visibility,
    pub content: String,
    pub confidence: f32,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub ttl_seconds: u64,
    /// Zero = none (§3 table).
    pub valid_until: Option<DateTime<Utc>>,
    pub supersedes_id: Option<MemoryId>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// SHA-256 of normalized content, used as a fast dedup pre-filter ahead
    /// of the similarity-threshold check (AMBIENT-6). Not part of the wire
    /// contract described in spec.md, purely an internal optimization.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,
}

impl Memory {
    /// `true` if the absolute TTL deadline (`created_at + ttl_seconds`) has
    /// passed, per §4.12 expiry rule one.
    pub fn ttl_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl_seconds > 0
            && now >= self.created_at + chrono::Duration::seconds(self.ttl_seconds as i64)
    }

    /// `true` if `valid_until` is set and has passed, per §4.12 expiry rule two.
    pub fn valid_until_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.valid_until, Some(vu) if now >= vu)
    }

    /// Deep-copy the mutable collection fields (tags/metadata), as required
    /// by the Store ownership rule in §3 to prevent cross-tenant aliasing.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }

    /// SHA-256 of content normalized by trimming and lowercasing, used as a
    /// fast exact-duplicate pre-filter ahead of the similarity-threshold
    /// `FindDuplicates` scan (AMBIENT-6). Two captures whose content only
    /// differs in surrounding whitespace or casing hash identically.
    pub fn compute_content_hash(content: &str) -> String {
        let normalized = content.trim().to_lowercase();
        hex::encode(Sha256::digest(normalized.as_bytes()))
    }
}

/// Input to `Store::Upsert` validation (type/scope enum membership, §3
/// invariant 4) lives on `Memory` itself; this newtype documents the
/// invariant-3 promotion rule: a `ttl_seconds > 0` memory must carry
/// `scope = Session` before it reaches the store, as capture/store layers
/// are expected to promote it there.
pub fn normalize_scope_for_ttl(scope: MemoryScope, ttl_seconds: u64) -> MemoryScope {
    if ttl_seconds > 0 {
        MemoryScope::Session
    } else {
        scope
    }
}

/// Auxiliary named-entity record, created by the [`crate::entities::EntityExtractor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Project,
    System,
    Decision,
    Concept,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityType::Person => "person",
            EntityType::Project => "project",
            EntityType::System => "system",
            EntityType::Decision => "decision",
            EntityType::Concept => "concept",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub name: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub memory_ids: Vec<MemoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A raw similarity hit from `Store::Search` / `Store::FindDuplicates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub memory: Memory,
    /// Cosine similarity, bounded to `[-1, 1]`.
    pub similarity_score: f32,
}

/// A `SearchResult` rescored by the [`crate::ranker::Ranker`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallResult {
    pub memory: Memory,
    pub similarity_score: f32,
    pub recency_score: f32,
    pub frequency_score: f32,
    pub type_boost: f32,
    pub scope_boost: f32,
    pub final_score: f32,
}

/// Filters accepted by `Store::List` / `Store::Search` (§4.1). All present
/// fields are AND-combined; a `tags` filter requires every listed tag to be
/// present on the memory's tag set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub memory_type: Option<MemoryType>,
    pub scope: Option<MemoryScope>,
    /// `None` means "default visibility only" (excludes `sensitive`, §3
    /// invariant 5). `Some(Visibility::Sensitive)` is the opt-in.
    pub visibility: Option<Visibility>,
    pub project: Option<String>,
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SearchFilters {
    pub fn matches(&self, m: &Memory) -> bool {
        if let Some(t) = self.memory_type {
            if m.memory_type != t {
                return false;
            }
        }
        if let Some(s) = self.scope {
            if m.scope != s {
                return false;
            }
        }
        match self.visibility {
            Some(v) => {
                if m.visibility != v {
                    return false;
                }
            }
            None => {
                if m.visibility == Visibility::Sensitive {
                    return false;
                }
            }
        }
        if let Some(ref p) = self.project {
            if &m.project != p {
                return false;
            }
        }
        if let Some(ref s) = self.source {
            if &m.source != s {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let set: std::collections::HashSet<&String> = m.tags.iter().collect();
            if !self.tags.iter().all(|t| set.contains(t)) {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics returned by `Store::Stats` (§4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionStats {
    pub total: u64,
    pub by_type: HashMap<String, u64>,
    pub by_scope: HashMap<String, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifier_order_excludes_fact() {
        assert!(!MemoryType::CLASSIFIER_ORDER.contains(&MemoryType::Fact));
    }

    #[test]
    fn type_boost_defaults_match_spec() {
        assert_eq!(MemoryType::Rule.type_boost(), 1.5);
        assert_eq!(MemoryType::Procedure.type_boost(), 1.3);
        assert_eq!(MemoryType::Fact.type_boost(), 1.0);
        assert_eq!(MemoryType::Episode.type_boost(), 0.8);
        assert_eq!(MemoryType::Preference.type_boost(), 0.7);
    }

    #[test]
    fn sensitive_excluded_by_default_filter() {
        let filters = SearchFilters::default();
        let mut m = sample_memory();
        m.visibility = Visibility::Sensitive;
        assert!(!filters.matches(&m));
        m.visibility = Visibility::Shared;
        assert!(filters.matches(&m));
    }

    #[test]
    fn tag_filter_requires_all_tags() {
        let mut filters = SearchFilters::default();
        filters.tags = vec!["a".into(), "b".into()];
        let mut m = sample_memory();
        m.tags = vec!["a".into()];
        assert!(!filters.matches(&m));
        m.tags = vec!["a".into(), "b".into(), "c".into()];
        assert!(filters.matches(&m));
    }

    fn sample_memory() -> Memory {
        let now = Utc::now();
        Memory {
            id: "m1".into(),
            memory_type: MemoryType::Fact,
            scope: MemoryScope::Permanent,
            visibility: Visibility::Shared,
            content: "The sky is blue.".into(),
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
}
