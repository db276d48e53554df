//! memoria-core: a persistent memory layer for LLM coding assistants.
//!
//! A `Store` holds `Memory` records plus their embedding vectors behind a
//! small trait (in-memory or SQLite). Two pipelines sit on top of it: `PreTurn`
//! recalls and ranks relevant memories into a token-budgeted context block,
//! and `PostTurn` captures, classifies, deduplicates, and persists new ones.
//! `LifecycleManager` runs as a separate maintenance pass (expiry, decay,
//! consolidation). Everything above the `Store`/`Embedder`/`LlmProvider`
//! traits is stateless and takes its collaborators by reference, so the
//! binaries in `src/bin/` are free to wire them up however each surface
//! (HTTP, MCP stdio, CLI, hook) needs.

pub mod app;
pub mod auth;
pub mod budget;
pub mod capturer;
pub mod classifier;
pub mod config;
pub mod conflict;
pub mod dto;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod lifecycle;
pub mod llm;
pub mod mcp;
pub mod pipeline;
pub mod ranker;
pub mod reasoner;
pub mod store;
pub mod types;
pub mod xml;

pub use error::{MemoriaError, Result};
pub use store::Store;
pub use types::*;

/// Crate version, exposed for `stats`/`initialize` responses the way the
/// teacher surfaces `engram::VERSION` in its MCP `initialize` result.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
