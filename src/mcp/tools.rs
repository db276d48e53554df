//! MCP tool surface: `remember`, `recall`, `search`, `forget`, `stats` (§6
//! "Agent-tool surface"). Grounded on the teacher's `mcp::tools` module —
//! same `TOOL_DEFINITIONS` const-table + `get_tool_definitions()` shape,
//! same `{"error": ...}` convention for tool-call failures instead of
//! propagating the JSON-RPC error envelope (a malformed tool argument is a
//! tool-level failure, not a protocol-level one).

use serde_json::{json, Value};

use super::protocol::{methods, InitializeResult, McpHandler, McpRequest, McpResponse, ToolCallResult, ToolDefinition};
use crate::app::AppContext;
use crate::dto::{RecallRequest, RememberRequest, SearchRequest};
use crate::store::Deadline;

/// `(name, description, input_schema_json)` triples, mirroring the
/// teacher's flat table so every tool's contract lives next to its
/// neighbors instead of scattered across match arms.
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        "remember",
        "Store a new memory. Use this proactively to persist durable facts, rules, preferences, and procedures the user states, without waiting to be asked.",
        r#"{
            "type": "object",
            "properties": {
                "content": {"type": "string", "description": "The content to remember"},
                "type": {"type": "string", "enum": ["rule", "procedure", "preference", "episode", "fact"], "description": "Memory type; inferred from content if omitted"},
                "scope": {"type": "string", "enum": ["session", "permanent"], "default": "permanent", "description": "Memory lifetime scope"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Tags for categorization"},
                "project": {"type": "string", "description": "Project this memory belongs to"},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0, "description": "Confidence score (0-1), defaults to 0.8"}
            },
            "required": ["content"]
        }"#,
    ),
    (
        "recall",
        "Recall memories relevant to a message, ranked and packed into a token-budgeted context block ready to prepend to a prompt.",
        r#"{
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "The message or prompt to recall context for"},
                "project": {"type": "string", "description": "Project to scope recall to"},
                "budget": {"type": "integer", "description": "Maximum tokens to pack into the returned context (default 2000)"}
            },
            "required": ["message"]
        }"#,
    ),
    (
        "search",
        "Raw similarity search over stored memories, unranked and unpacked, with optional type/scope/tag/project filters.",
        r#"{
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Query text"},
                "limit": {"type": "integer", "default": 10, "description": "Maximum results to return"},
                "project": {"type": "string"},
                "type": {"type": "string", "enum": ["rule", "procedure", "preference", "episode", "fact"]},
                "scope": {"type": "string", "enum": ["session", "permanent"]},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["message"]
        }"#,
    ),
    (
        "forget",
        "Delete a memory by id.",
        r#"{
            "type": "object",
            "properties": {
                "id": {"type": "string", "description": "Memory id to delete"}
            },
            "required": ["id"]
        }"#,
    ),
    (
        "stats",
        "Return aggregate statistics over the memory collection (counts by type/scope/project).",
        r#"{
            "type": "object",
            "properties": {}
        }"#,
    ),
];

pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

pub struct MemoriaHandler {
    ctx: AppContext,
}

impl MemoriaHandler {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    fn handle_tool_call(&self, name: &str, params: Value) -> Value {
        match name {
            "remember" => self.tool_remember(params),
            "recall" => self.tool_recall(params),
            "search" => self.tool_search(params),
            "forget" => self.tool_forget(params),
            "stats" => self.tool_stats(params),
            other => json!({"error": format!("unknown tool: {other}")}),
        }
    }

    fn tool_remember(&self, params: Value) -> Value {
        let req: RememberRequest = match serde_json::from_value(params) {
            Ok(r) => r,
            Err(e) => return json!({"error": e.to_string()}),
        };
        match self.ctx.remember(req, Deadline::none()) {
            Ok((id, stored)) => json!({"id": id, "stored": stored}),
            Err(e) => json!({"error": e.to_string()}),
        }
    }

    fn tool_recall(&self, params: Value) -> Value {
        let req: RecallRequest = match serde_json::from_value(params) {
            Ok(r) => r,
            Err(e) => return json!({"error": e.to_string()}),
        };
        match self.ctx.recall(req, Deadline::none()) {
            Ok(out) => json!(crate::dto::RecallResponse::from(out)),
            Err(e) => json!({"error": e.to_string()}),
        }
    }

    fn tool_search(&self, params: Value) -> Value {
        let req: SearchRequest = match serde_json::from_value(params) {
            Ok(r) => r,
            Err(e) => return json!({"error": e.to_string()}),
        };
        match self.ctx.search(req, Deadline::none()) {
            Ok(results) => json!({"results": results}),
            Err(e) => json!({"error": e.to_string()}),
        }
    }

    fn tool_forget(&self, params: Value) -> Value {
        let id = match params.get("id").and_then(|v| v.as_str()) {
            Some(id) => id.to_string(),
            None => return json!({"error": "id is required"}),
        };
        match self.ctx.forget(&id, Deadline::none()) {
            Ok(deleted) => json!({"deleted": deleted}),
            Err(e) => json!({"error": e.to_string()}),
        }
    }

    fn tool_stats(&self, _params: Value) -> Value {
        match self.ctx.stats(Deadline::none()) {
            Ok(stats) => json!(stats),
            Err(e) => json!({"error": e.to_string()}),
        }
    }
}

impl McpHandler for MemoriaHandler {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = InitializeResult::default();
                McpResponse::success(request.id, json!(result))
            }
            methods::INITIALIZED => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => {
                let tools = get_tool_definitions();
                McpResponse::success(request.id, json!({ "tools": tools }))
            }
            methods::CALL_TOOL => {
                let name = request.params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let arguments = request.params.get("arguments").cloned().unwrap_or_else(|| json!({}));

                let result = self.handle_tool_call(name, arguments);
                let is_error = result.get("error").is_some();
                let tool_result = if is_error {
                    ToolCallResult::error(result.get("error").and_then(|v| v.as_str()).unwrap_or("tool error").to_string())
                } else {
                    ToolCallResult::json(&result)
                };
                McpResponse::success(request.id, json!(tool_result))
            }
            other => McpResponse::error(request.id, -32601, format!("Method not found: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use clap::Parser;
    use serde_json::json;

    fn test_handler() -> MemoriaHandler {
        #[derive(Parser)]
        struct Args {
            #[command(flatten)]
            config: Config,
        }
        let mut cfg = Args::parse_from(["test", "--store-backend", "memory", "--dimensions", "16"]).config;
        cfg.embedding_provider = "tfidf".to_string();
        MemoriaHandler::new(AppContext::build(cfg).unwrap())
    }

    #[test]
    fn initialize_returns_server_info() {
        let handler = test_handler();
        let response = handler.handle_request(McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: methods::INITIALIZE.to_string(),
            params: json!({}),
        });
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "memoria");
    }

    #[test]
    fn list_tools_includes_remember_and_recall() {
        let handler = test_handler();
        let response = handler.handle_request(McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(2)),
            method: methods::LIST_TOOLS.to_string(),
            params: json!({}),
        });
        let tools = response.result.unwrap();
        let names: Vec<String> = tools["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"remember".to_string()));
        assert!(names.contains(&"recall".to_string()));
    }

    #[test]
    fn call_tool_remember_then_recall_round_trips() {
        let handler = test_handler();
        let remember_response = handler.handle_request(McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(3)),
            method: methods::CALL_TOOL.to_string(),
            params: json!({"name": "remember", "arguments": {"content": "Prefer tabs over spaces."}}),
        });
        assert!(remember_response.error.is_none());

        let recall_response = handler.handle_request(McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(4)),
            method: methods::CALL_TOOL.to_string(),
            params: json!({"name": "recall", "arguments": {"message": "Prefer tabs over spaces."}}),
        });
        let result = recall_response.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("memory_count"));
    }

    #[test]
    fn call_unknown_tool_reports_error_without_jsonrpc_error() {
        let handler = test_handler();
        let response = handler.handle_request(McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(5)),
            method: methods::CALL_TOOL.to_string(),
            params: json!({"name": "bogus", "arguments": {}}),
        });
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(true));
    }
}
