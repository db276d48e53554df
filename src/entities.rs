//! Named-entity extraction from a stored memory (§3 Entity, §4 component
//! table), LLM-backed. Degrades to "no entities" on any error, matching the
//! degrade discipline shared by Capturer/ConflictDetector/Reasoner.

use serde::Deserialize;

use crate::llm::LlmProvider;
use crate::types::{Entity, EntityType, Memory};
use crate::xml;

const SYSTEM_PROMPT: &str = "You extract named entities mentioned in a memory's content. \
Respond with a JSON array of objects shaped as {\"name\": string, \"type\": string (one of \
person, project, system, decision, concept), \"aliases\": string[] (optional)}. Return an \
empty array if nothing qualifies.";

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type")]
    entity_type: String,
    #[serde(default)]
    aliases: Vec<String>,
}

pub struct EntityExtractor<'a> {
    llm: &'a dyn LlmProvider,
    model: String,
}

impl<'a> EntityExtractor<'a> {
    pub fn new(llm: &'a dyn LlmProvider, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Extracts entities mentioned by `memory.content`, each already linked
    /// to the memory that mentioned it (§3 Entity lifecycle). Any API error,
    /// empty response, or parse failure yields no entities rather than a
    /// hard error — entity extraction is an enrichment, not a requirement
    /// for the memory itself to be stored.
    pub fn extract(&self, memory: &Memory) -> Vec<Entity> {
        let prompt = format!("<memory>{}</memory>", xml::escape(&memory.content));

        let response = match self.llm.complete(&self.model, 512, SYSTEM_PROMPT, &prompt) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };

        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let raw: Vec<RawEntity> = match serde_json::from_str(trimmed) {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };

        let now = chrono::Utc::now();
        raw.into_iter()
            .filter_map(|e| {
                let entity_type: EntityType = match e.entity_type.to_lowercase().as_str() {
                    "person" => EntityType::Person,
                    "project" => EntityType::Project,
                    "system" => EntityType::System,
                    "decision" => EntityType::Decision,
                    "concept" => EntityType::Concept,
                    _ => return None,
                };
                Some(Entity {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: e.name,
                    entity_type,
                    aliases: e.aliases,
                    memory_ids: vec![memory.id.clone()],
                    created_at: now,
                    updated_at: now,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::ScriptedLlm;
    use crate::types::{MemoryScope, MemoryType, Visibility};
    use std::collections::HashMap;

    fn sample_memory(content: &str) -> Memory {
        let now = chrono::Utc::now();
        Memory {
            id: "m1".into(),
            memory_type: MemoryType::Episode,
            scope: MemoryScope::Project,
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
        }
    }

    #[test]
    fn extracts_typed_entities_linked_to_memory() {
        let llm = ScriptedLlm::ok(
            r#"[{"name": "Alice", "type": "person"}, {"name": "Memoria", "type": "project"}]"#,
        );
        let extractor = EntityExtractor::new(&llm, "test-model");
        let memory = sample_memory("Alice shipped the Memoria release.");
        let entities = extractor.extract(&memory);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].name, "Alice");
        assert_eq!(entities[0].entity_type, EntityType::Person);
        assert_eq!(entities[0].memory_ids, vec!["m1".to_string()]);
    }

    #[test]
    fn unknown_entity_type_is_dropped() {
        let llm = ScriptedLlm::ok(r#"[{"name": "x", "type": "not-a-real-type"}]"#);
        let extractor = EntityExtractor::new(&llm, "test-model");
        let entities = extractor.extract(&sample_memory("some text"));
        assert!(entities.is_empty());
    }

    #[test]
    fn degrades_to_empty_on_llm_error() {
        let llm = ScriptedLlm::erroring();
        let extractor = EntityExtractor::new(&llm, "test-model");
        assert!(extractor.extract(&sample_memory("x")).is_empty());
    }

    #[test]
    fn degrades_to_empty_on_unparsable_response() {
        let llm = ScriptedLlm::ok("not json");
        let extractor = EntityExtractor::new(&llm, "test-model");
        assert!(extractor.extract(&sample_memory("x")).is_empty());
    }
}
