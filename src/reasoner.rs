//! Optional LLM-backed reordering of the top-K ranked results (§4.7).

use serde::Deserialize;

use crate::llm::LlmProvider;
use crate::types::RecallResult;
use crate::xml;

const SYSTEM_PROMPT: &str = "You are given a query and a numbered list of candidate memories. \
Reorder the indices by relevance to the query, most relevant first. Respond with a JSON array \
of the 0-based indices in your preferred order, e.g. [2, 0, 1].";

/// Default top-K window reordered by the LLM (§4.7).
pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawOrder {
    indices: Vec<i64>,
}

pub struct Reasoner<'a> {
    llm: &'a dyn LlmProvider,
    model: String,
    top_k: usize,
}

impl<'a> Reasoner<'a> {
    pub fn new(llm: &'a dyn LlmProvider, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Reorders the top `top_k` of `results` by LLM judgment against `query`.
    /// Anything beyond `top_k` is appended untouched. Invalid, out-of-range,
    /// or duplicate indices returned by the LLM are dropped; any index never
    /// mentioned is appended back in its original relative position. Any API
    /// error or unparsable response leaves the input order unchanged (§4.7).
    pub fn reorder(&self, query: &str, results: Vec<RecallResult>) -> Vec<RecallResult> {
        if results.len() <= 1 {
            return results;
        }

        let k = self.top_k.min(results.len());
        let (head, tail) = results.split_at(k);
        let mut head: Vec<RecallResult> = head.to_vec();
        let tail: Vec<RecallResult> = tail.to_vec();

        let listing: String = head
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{i}: {}", xml::escape(&r.memory.content)))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!("<query>{}</query>\n<candidates>\n{}\n</candidates>", xml::escape(query), listing);

        let response = match self.llm.complete(&self.model, 256, SYSTEM_PROMPT, &prompt) {
            Ok(r) => r,
            Err(_) => {
                head.extend(tail);
                return head;
            }
        };

        let raw: RawOrder = match serde_json::from_str(response.trim()) {
            Ok(r) => r,
            Err(_) => {
                head.extend(tail);
                return head;
            }
        };

        let mut seen = std::collections::HashSet::new();
        let mut order: Vec<usize> = Vec::with_capacity(k);
        for idx in raw.indices {
            if idx < 0 || idx as usize >= k {
                continue;
            }
            let idx = idx as usize;
            if seen.insert(idx) {
                order.push(idx);
            }
        }

        for i in 0..k {
            if !seen.contains(&i) {
                order.push(i);
            }
        }

        let mut reordered: Vec<RecallResult> = Vec::with_capacity(head.len());
        let mut slots: Vec<Option<RecallResult>> = head.into_iter().map(Some).collect();
        for idx in order {
            if let Some(item) = slots[idx].take() {
                reordered.push(item);
            }
        }

        reordered.extend(tail);
        reordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::ScriptedLlm;
    use crate::types::{Memory, MemoryScope, MemoryType, Visibility};
    use std::collections::HashMap;

    fn result(id: &str, content: &str) -> RecallResult {
        let now = chrono::Utc::now();
        RecallResult {
            memory: Memory {
                id: id.into(),
                memory_type: MemoryType::Fact,
                scope: MemoryScope::Permanent,
                visibility: Visibility::Shared,
                content: content.into(),
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
            },
            similarity_score: 0.5,
            recency_score: 0.5,
            frequency_score: 0.0,
            type_boost: 1.0,
            scope_boost: 1.0,
            final_score: 0.5,
        }
    }

    #[test]
    fn reorders_per_llm_permutation() {
        let llm = ScriptedLlm::ok("[2, 0, 1]");
        let reasoner = Reasoner::new(&llm, "test-model");
        let results = vec![result("a", "a"), result("b", "b"), result("c", "c")];
        let reordered = reasoner.reorder("query", results);
        assert_eq!(
            reordered.iter().map(|r| r.memory.id.clone()).collect::<Vec<_>>(),
            vec!["c", "a", "b"]
        );
    }

    #[test]
    fn drops_invalid_and_duplicate_indices_appends_omitted() {
        // index 5 is out of range, 1 is duplicated; 2 is never mentioned.
        let llm = ScriptedLlm::ok("[1, 5, 1, 0]");
        let reasoner = Reasoner::new(&llm, "test-model");
        let results = vec![result("a", "a"), result("b", "b"), result("c", "c")];
        let reordered = reasoner.reorder("query", results);
        assert_eq!(
            reordered.iter().map(|r| r.memory.id.clone()).collect::<Vec<_>>(),
            vec!["b", "a", "c"]
        );
    }

    #[test]
    fn unchanged_on_llm_error() {
        let llm = ScriptedLlm::erroring();
        let reasoner = Reasoner::new(&llm, "test-model");
        let results = vec![result("a", "a"), result("b", "b")];
        let reordered = reasoner.reorder("query", results);
        assert_eq!(
            reordered.iter().map(|r| r.memory.id.clone()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn unchanged_on_unparsable_response() {
        let llm = ScriptedLlm::ok("not an array");
        let reasoner = Reasoner::new(&llm, "test-model");
        let results = vec![result("a", "a"), result("b", "b")];
        let reordered = reasoner.reorder("query", results);
        assert_eq!(
            reordered.iter().map(|r| r.memory.id.clone()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn results_beyond_top_k_appended_untouched() {
        let llm = ScriptedLlm::ok("[1, 0]");
        let reasoner = Reasoner::new(&llm, "test-model").with_top_k(2);
        let results = vec![result("a", "a"), result("b", "b"), result("c", "c")];
        let reordered = reasoner.reorder("query", results);
        assert_eq!(
            reordered.iter().map(|r| r.memory.id.clone()).collect::<Vec<_>>(),
            vec!["b", "a", "c"]
        );
    }

    #[test]
    fn single_result_short_circuits() {
        let llm = ScriptedLlm::ok("[]");
        let reasoner = Reasoner::new(&llm, "test-model");
        let results = vec![result("a", "a")];
        let reordered = reasoner.reorder("query", results);
        assert_eq!(reordered.len(), 1);
    }
}
