//! Error types for Memoria

use thiserror::Error;

/// Result type alias for Memoria operations
pub type Result<T> = std::result::Result<T, MemoriaError>;

/// Main error type for the memory service
#[derive(Error, Debug)]
pub enum MemoriaError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Memory not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("LLM degraded: {0}")]
    LlmDegraded(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(feature = "openai")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request error: {0}")]
    #[cfg(not(feature = "openai"))]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Deadline exceeded: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MemoriaError {
    /// Whether this error represents a transient condition worth retrying
    /// (used by batch loops that must not abort on a single-item failure).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemoriaError::Unavailable(_) | MemoriaError::Http(_) | MemoriaError::LlmDegraded(_)
        )
    }

    /// Map to an MCP/JSON-RPC error code.
    pub fn code(&self) -> i64 {
        match self {
            MemoriaError::NotFound(_) => -32001,
            MemoriaError::InvalidInput(_) => -32602,
            MemoriaError::Unauthorized(_) => -32003,
            MemoriaError::Unavailable(_) => -32004,
            MemoriaError::Cancelled(_) => -32005,
            _ => -32000,
        }
    }

    /// Map to an HTTP status code for the JSON surface.
    pub fn http_status(&self) -> u16 {
        match self {
            MemoriaError::NotFound(_) => 404,
            MemoriaError::InvalidInput(_) => 400,
            MemoriaError::Unauthorized(_) => 401,
            MemoriaError::Unavailable(_) => 500,
            _ => 500,
        }
    }
}
