//! Wire-shape request/response DTOs shared by the HTTP, MCP, and hook
//! surfaces (§6). Keeping these in one place means `memoria-server`,
//! `memoria-mcp`, and `memoria-hook` all parse/produce the exact same JSON
//! shapes instead of drifting, the way the teacher keeps its MCP tool
//! argument shapes next to the HTTP request shapes they mirror.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{CollectionStats, Memory, RecallResult, SearchResult};

#[derive(Debug, Clone, Deserialize)]
pub struct RememberRequest {
    pub content: String,
    #[serde(rename = "type", default)]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RememberResponse {
    pub id: String,
    pub stored: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecallRequest {
    pub message: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub budget: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallResponse {
    pub context: String,
    pub memory_count: usize,
    pub tokens_used: usize,
}

impl From<crate::pipeline::PreTurnOutput> for RecallResponse {
    fn from(out: crate::pipeline::PreTurnOutput) -> Self {
        Self {
            context: out.context,
            memory_count: out.memory_count,
            tokens_used: out.tokens_used,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub message: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub project: String,
    #[serde(rename = "type", default)]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedSearchResponse {
    pub results: Vec<RecallResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type", default)]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResponse {
    pub memories: Vec<Memory>,
    pub next_cursor: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: CollectionStats,
}

/// A present-but-null JSON field deserializes to `Some(None)`; an absent
/// field deserializes to `None` (the struct-level default); a present value
/// deserializes to `Some(Some(v))`. Used for `PUT /v1/memories/{id}`'s
/// "fields all optional; `project` and `confidence` are nullable pointers"
/// shape (§6 HTTP table) — a caller must be able to distinguish "don't
/// touch this field" from "clear it".
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryPatch {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "type", default)]
    pub memory_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub project: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub confidence: Option<Option<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostTurnRequest {
    pub session_id: String,
    pub user_message: String,
    pub assistant_message: String,
    #[serde(default)]
    pub project: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostTurnResponse {
    pub stored: bool,
}

impl From<crate::pipeline::PostTurnOutput> for PostTurnResponse {
    fn from(out: crate::pipeline::PostTurnOutput) -> Self {
        Self { stored: out.stored }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookPreRequest {
    pub session_id: String,
    pub prompt: String,
    pub cwd: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub token_budget: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookPostRequest {
    pub session_id: String,
    pub user_message: String,
    pub assistant_message: String,
    #[serde(default)]
    pub project: Option<String>,
}

/// `project` defaults to `basename(cwd)` when absent (§6 "Hook surface").
pub fn project_from_cwd(cwd: &str) -> String {
    std::path::Path::new(cwd)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self { status: "ok" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_distinguishes_absent_null_and_present() {
        let absent: MemoryPatch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.project, None);

        let null: MemoryPatch = serde_json::from_str(r#"{"project": null}"#).unwrap();
        assert_eq!(null.project, Some(None));

        let present: MemoryPatch = serde_json::from_str(r#"{"project": "acme"}"#).unwrap();
        assert_eq!(present.project, Some(Some("acme".to_string())));
    }

    #[test]
    fn project_from_cwd_uses_basename() {
        assert_eq!(project_from_cwd("/home/user/my-project"), "my-project");
        assert_eq!(project_from_cwd(""), "");
    }
}
