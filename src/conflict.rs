//! Contradiction detection against a candidate set (§4.5), LLM-backed.

use serde::Deserialize;

use crate::llm::LlmProvider;
use crate::types::{Memory, MemoryId};
use crate::xml;

const SYSTEM_PROMPT: &str = "You detect whether a new memory contradicts any memory in a \
candidate set. Respond with a single JSON object shaped as {\"contradicts\": bool, \
\"contradicted_id\": string, \"reason\": string}. If nothing contradicts, set contradicts to \
false.";

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictVerdict {
    pub contradicts: bool,
    pub contradicted_id: Option<MemoryId>,
    pub reason: String,
}

impl ConflictVerdict {
    fn no_conflict() -> Self {
        Self {
            contradicts: false,
            contradicted_id: None,
            reason: String::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    contradicts: bool,
    #[serde(default)]
    contradicted_id: String,
    #[serde(default)]
    reason: String,
}

pub struct ConflictDetector<'a> {
    llm: &'a dyn LlmProvider,
    model: String,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(llm: &'a dyn LlmProvider, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Checks `new_content` against `candidates`. Any API error, empty
    /// response, JSON-parse failure, or a `contradicted_id` outside the
    /// candidate set is treated as "no conflict" — the safe default is to
    /// store (§4.5).
    pub fn detect(&self, new_content: &str, candidates: &[Memory]) -> ConflictVerdict {
        let candidate_block: String = candidates
            .iter()
            .map(|m| format!("<candidate id=\"{}\">{}</candidate>", xml::escape(&m.id), xml::escape(&m.content)))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "<new_memory>{}</new_memory>\n<candidates>\n{}\n</candidates>",
            xml::escape(new_content),
            candidate_block,
        );

        let response = match self.llm.complete(&self.model, 256, SYSTEM_PROMPT, &prompt) {
            Ok(r) => r,
            Err(_) => return ConflictVerdict::no_conflict(),
        };

        let trimmed = response.trim();
        if trimmed.is_empty() {
            return ConflictVerdict::no_conflict();
        }

        let raw: RawVerdict = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(_) => return ConflictVerdict::no_conflict(),
        };

        if !raw.contradicts {
            return ConflictVerdict::no_conflict();
        }

        let in_candidate_set = candidates.iter().any(|m| m.id == raw.contradicted_id);
        if !in_candidate_set {
            return ConflictVerdict::no_conflict();
        }

        ConflictVerdict {
            contradicts: true,
            contradicted_id: Some(raw.contradicted_id),
            reason: raw.reason,
        }
    }
}
