//! LLM-backed relationship extraction over a pre-extracted entity list.
//!
//! Same normalization and validation rules as the combined strategy, but
//! the entity set is supplied by an earlier pass. Completion errors
//! propagate verbatim; absent optional fields stay absent.

use super::{ExtractionConfig, RelationshipExtractor};
use crate::domain::graph::{ExtractedEntity, ExtractedRelationship};
use crate::error::GraphError;
use crate::extraction::llm_graph::parse_extraction_response;
use crate::extraction::normalize::validate_relationships;
use crate::llm::CompletionProvider;
use async_trait::async_trait;
use std::sync::Arc;

/// Relationship extraction given known entities, via one LLM call.
#[derive(Debug, Clone)]
pub struct LlmRelationshipExtractor {
    provider: Arc<dyn CompletionProvider>,
    #[allow(dead_code)]
    config: ExtractionConfig,
}

impl LlmRelationshipExtractor {
    /// Create a new extractor bound to a completion provider.
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            config: ExtractionConfig::default(),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(provider: Arc<dyn CompletionProvider>, config: ExtractionConfig) -> Self {
        Self { provider, config }
    }

    /// Render the relationship prompt for a chunk and its entities.
    #[must_use]
    pub fn build_prompt(&self, text: &str, entities: &[ExtractedEntity]) -> String {
        let entity_lines: Vec<String> = entities
            .iter()
            .map(|e| format!("- {} ({})", e.name, e.entity_type.as_str()))
            .collect();

        format!(
            "Identify relationships between the entities listed below, using only the text.\n\
             Respond with a single JSON object and nothing else:\n\
             {{\n\
             \x20 \"relationships\": [{{\"source\": \"...\", \"target\": \"...\", \"type\": \"...\", \"description\": \"...\", \"strength\": 1-10}}]\n\
             }}\n\
             Relationship \"type\" must be a short UPPER_SNAKE_CASE verb phrase.\n\
             \"source\" and \"target\" must be names from the entity list. Omit \"description\" \
             and \"strength\" when the text gives no basis for them.\n\n\
             Entities:\n{}\n\n\
             Text:\n{}",
            entity_lines.join("\n"),
            text
        )
    }
}

#[async_trait]
impl RelationshipExtractor for LlmRelationshipExtractor {
    async fn extract_relationships(
        &self,
        text: &str,
        entities: &[ExtractedEntity],
    ) -> Result<Vec<ExtractedRelationship>, GraphError> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = self.build_prompt(text, entities);
        let response = self.provider.complete(&prompt).await?;

        let result = parse_extraction_response(&response)?;
        Ok(validate_relationships(result.relationships, entities))
    }

    fn name(&self) -> &'static str {
        "llm_relations"
    }
}

// =============================================================================
// Tests
// =============================================================================
