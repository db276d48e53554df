//! Turn → candidate memories (§4.4), LLM-backed.

use serde::Deserialize;

use crate::error::Result;
use crate::llm::LlmProvider;
use crate::types::MemoryType;
use crate::xml;

const SYSTEM_PROMPT: &str = "You extract durable memories (rules, facts, episodes, procedures, \
preferences) worth remembering from a single conversation turn. Respond with a JSON array of \
objects, each shaped as {\"content\": string, \"type\": string (optional), \"confidence\": number \
0-1, \"tags\": string[] (optional)}. Only emit memories with standalone, self-contained content.";

/// Minimum confidence to keep a captured memory; anything below is silently
/// dropped (§4.4).
const MIN_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct CapturedMemory {
    pub content: String,
    pub memory_type: Option<MemoryType>,
    pub confidence: f32,
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCapturedMemory {
    content: String,
    #[serde(rename = "type", default)]
    memory_type: Option<String>,
    confidence: f32,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponse {
    Array(Vec<RawCapturedMemory>),
    Wrapped { memories: Vec<RawCapturedMemory> },
}

pub struct Capturer<'a> {
    llm: &'a dyn LlmProvider,
    model: String,
}

impl<'a> Capturer<'a> {
    pub fn new(llm: &'a dyn LlmProvider, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Extract candidate memories from a user/assistant turn. Both message
    /// strings are XML-escaped before being embedded in the prompt (§4.11),
    /// to defeat prompt injection via fake closing tags.
    pub fn extract(&self, user_message: &str, assistant_message: &str) -> Result<Vec<CapturedMemory>> {
        let prompt = format!(
            "<user_message>{}</user_message>\n<assistant_message>{}</assistant_message>",
            xml::escape(user_message),
            xml::escape(assistant_message),
        );

        let response = self.llm.complete(&self.model, 1024, SYSTEM_PROMPT, &prompt)?;
        let raw: RawResponse = serde_json::from_str(response.trim())?;

        let items = match raw {
            RawResponse::Array(items) => items,
            RawResponse::Wrapped { memories } => memories,
        };

        Ok(items
            .into_iter()
            .filter(|m| m.confidence >= MIN_CONFIDENCE)
            .map(|m| CapturedMemory {
                content: m.content,
                memory_type: m.memory_type.and_then(|t| t.parse().ok()),
                confidence: m.confidence,
                tags: m.tags,
            })
            .collect())
    }
}
