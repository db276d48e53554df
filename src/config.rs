//! Runtime configuration (AMBIENT-4), shared by all four binaries. Loaded
//! the way the teacher's `bin/server.rs::Args` is loaded — `clap::Parser`
//! fields with `env = "MEMORIA_..."` fallbacks — plus an optional
//! `config.toml` merged underneath CLI/env for `serve` mode.

use std::path::Path;

use clap::Args;
use serde::Deserialize;

use crate::error::{MemoriaError, Result};
use crate::lifecycle::LifecycleManager;
use crate::ranker::RankerWeights;

/// Explicit-store dedup threshold (§8 scenario 6).
pub const DEDUP_THRESHOLD_EXPLICIT: f32 = 0.92;
/// Post-turn capture dedup threshold, strictly higher than the explicit-store
/// one: captured memories carry more overlap risk (§4.10).
pub const DEDUP_THRESHOLD_POST_TURN: f32 = 0.95;
/// Default consolidation similarity threshold (§9 open question (b),
/// SPEC_FULL AMBIENT-7: configurable, default 0.93).
pub const DEFAULT_CONSOLIDATION_THRESHOLD: f32 = 0.93;
/// Default confidence floor below which a decayed memory is deleted (§4.12).
pub const DEFAULT_DECAY_FLOOR: f32 = 0.2;
/// Default PreTurn token budget when the caller passes <= 0 (§4.9).
pub const DEFAULT_TOKEN_BUDGET: i64 = 2000;
/// Default PreTurn search fan-out before ranking (§4.9 step 2).
pub const DEFAULT_SEARCH_LIMIT: usize = 50;
/// HTTP request body cap (§6 "Auth").
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
/// Hook pipelines wrap the entire call in this deadline (§5 "Cancellation").
pub const HOOK_DEADLINE_SECS: u64 = 30;
/// Graceful shutdown deadline for `serve` mode (§7 "Shutdown").
pub const SHUTDOWN_DEADLINE_SECS: u64 = 10;

/// Which `Store` backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            _ => Err(format!("unknown store backend: {s}")),
        }
    }
}

/// Shared configuration fields, flattened into every binary's `clap::Parser`
/// struct so `memoria-server`, `memoria-mcp`, `memoria-cli`, and
/// `memoria-hook` all accept the same flags/env vars for the pieces they
/// share (store backend, ranker weights, thresholds).
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Store backend: "memory" or "sqlite".
    #[arg(long, env = "MEMORIA_STORE_BACKEND", default_value = "sqlite")]
    pub store_backend: String,

    /// SQLite database path (ignored for the in-memory backend).
    #[arg(
        long,
        env = "MEMORIA_DB_PATH",
        default_value = "~/.local/share/memoria/memories.db"
    )]
    pub db_path: String,

    /// Vector dimension the store and embedder must agree on.
    #[arg(long, env = "MEMORIA_DIMENSIONS", default_value_t = 256)]
    pub dimensions: usize,

    /// Embedding provider: "tfidf" (offline, deterministic) or "openai".
    #[arg(long, env = "MEMORIA_EMBEDDING_PROVIDER", default_value = "tfidf")]
    pub embedding_provider: String,

    /// Embedding model name passed to the provider.
    #[arg(
        long,
        env = "MEMORIA_EMBEDDING_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub embedding_model: String,

    /// Embedding cache capacity (entries), §AMBIENT-6.
    #[arg(long, env = "MEMORIA_EMBED_CACHE_CAPACITY", default_value_t = 1024)]
    pub embed_cache_capacity: usize,

    /// LLM model name for Capturer/ConflictDetector/EntityExtractor/Reasoner.
    #[arg(long, env = "MEMORIA_LLM_MODEL", default_value = "gpt-4o-mini")]
    pub llm_model: String,

    /// OpenAI-compatible API key (embedder and/or LLM provider).
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL override.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// Ranker weight: similarity component.
    #[arg(long, env = "MEMORIA_WEIGHT_SIMILARITY", default_value_t = 0.5)]
    pub weight_similarity: f32,
    /// Ranker weight: recency component.
    #[arg(long, env = "MEMORIA_WEIGHT_RECENCY", default_value_t = 0.2)]
    pub weight_recency: f32,
    /// Ranker weight: frequency component.
    #[arg(long, env = "MEMORIA_WEIGHT_FREQUENCY", default_value_t = 0.1)]
    pub weight_frequency: f32,
    /// Ranker weight: type-boost component.
    #[arg(long, env = "MEMORIA_WEIGHT_TYPE", default_value_t = 0.1)]
    pub weight_type: f32,
    /// Ranker weight: scope-boost component.
    #[arg(long, env = "MEMORIA_WEIGHT_SCOPE", default_value_t = 0.1)]
    pub weight_scope: f32,

    /// Default PreTurn token budget.
    #[arg(long, env = "MEMORIA_DEFAULT_BUDGET", default_value_t = DEFAULT_TOKEN_BUDGET)]
    pub default_budget: i64,

    /// Explicit-store dedup similarity threshold.
    #[arg(long, env = "MEMORIA_DEDUP_THRESHOLD", default_value_t = DEDUP_THRESHOLD_EXPLICIT)]
    pub dedup_threshold: f32,

    /// Post-turn capture dedup similarity threshold.
    #[arg(long, env = "MEMORIA_DEDUP_THRESHOLD_POST_TURN", default_value_t = DEDUP_THRESHOLD_POST_TURN)]
    pub dedup_threshold_post_turn: f32,

    /// Consolidation similarity threshold (§9 open question (b)).
    #[arg(long, env = "MEMORIA_CONSOLIDATION_THRESHOLD", default_value_t = DEFAULT_CONSOLIDATION_THRESHOLD)]
    pub consolidation_threshold: f32,

    /// Confidence floor below which a decayed memory is deleted.
    #[arg(long, env = "MEMORIA_DECAY_FLOOR", default_value_t = DEFAULT_DECAY_FLOOR)]
    pub decay_floor: f32,

    /// Bearer token required on the HTTP surface. Absent disables auth (with
    /// a startup warning), per §6 "Auth".
    #[arg(long, env = "MEMORIA_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// HTTP bind address (`memoria-server` only).
    #[arg(long, env = "MEMORIA_BIND_ADDR", default_value = "127.0.0.1:8088")]
    pub bind_addr: String,
}

impl Config {
    pub fn store_backend(&self) -> Result<StoreBackend> {
        self.store_backend
            .parse()
            .map_err(MemoriaError::InvalidInput)
    }

    pub fn expanded_db_path(&self) -> String {
        shellexpand::tilde(&self.db_path).into_owned()
    }

    pub fn ranker_weights(&self) -> RankerWeights {
        RankerWeights {
            similarity: self.weight_similarity,
            recency: self.weight_recency,
            frequency: self.weight_frequency,
            type_boost: self.weight_type,
            scope_boost: self.weight_scope,
        }
    }

    /// Overlays values found in `path` (TOML) underneath whatever was set on
    /// the command line/environment. Fields absent from the file are left at
    /// their clap-resolved values; an absent or unreadable file is not an
    /// error (§4's "no process-global mutable singletons beyond read-only
    /// configuration" — this runs once, at startup, before any request).
    pub fn merge_toml_file(mut self, path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return Ok(self),
        };
        let file: TomlOverrides = toml::from_str(&text).map_err(|e| MemoriaError::Config(e.to_string()))?;

        if let Some(v) = file.store_backend {
            self.store_backend = v;
        }
        if let Some(v) = file.db_path {
            self.db_path = v;
        }
        if let Some(v) = file.dimensions {
            self.dimensions = v;
        }
        if let Some(v) = file.embedding_provider {
            self.embedding_provider = v;
        }
        if let Some(v) = file.embedding_model {
            self.embedding_model = v;
        }
        if let Some(v) = file.llm_model {
            self.llm_model = v;
        }
        if let Some(v) = file.default_budget {
            self.default_budget = v;
        }
        if let Some(v) = file.dedup_threshold {
            self.dedup_threshold = v;
        }
        if let Some(v) = file.dedup_threshold_post_turn {
            self.dedup_threshold_post_turn = v;
        }
        if let Some(v) = file.consolidation_threshold {
            self.consolidation_threshold = v;
        }
        if let Some(v) = file.decay_floor {
            self.decay_floor = v;
        }
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        Ok(self)
    }

    pub fn lifecycle_manager<'a>(&self, store: &'a dyn crate::store::Store) -> LifecycleManager<'a> {
        LifecycleManager::new(store)
            .with_consolidation_threshold(self.consolidation_threshold)
            .with_decay_floor(self.decay_floor)
    }
}

/// Partial config accepted from `config.toml`; every field optional since the
/// file only overrides a subset.
#[derive(Debug, Default, Deserialize)]
struct TomlOverrides {
    store_backend: Option<String>,
    db_path: Option<String>,
    dimensions: Option<usize>,
    embedding_provider: Option<String>,
    embedding_model: Option<String>,
    llm_model: Option<String>,
    default_budget: Option<i64>,
    dedup_threshold: Option<f32>,
    dedup_threshold_post_turn: Option<f32>,
    consolidation_threshold: Option<f32>,
    decay_floor: Option<f32>,
    bind_addr: Option<String>,
}
