//! Agent-tool surface: stdio JSON-RPC (§6 "Agent-tool surface"). Five tools
//! — `remember`, `recall`, `forget`, `search`, `stats` — mirroring the
//! HTTP/JSON request shapes over the same `AppContext`.

mod protocol;
mod tools;

pub use protocol::{
    methods, InitializeResult, McpError, McpHandler, McpRequest, McpResponse, McpServer,
    ServerCapabilities, ServerInfo, ToolCallResult, ToolContent, ToolDefinition, ToolsCapability,
};
pub use tools::MemoriaHandler;
