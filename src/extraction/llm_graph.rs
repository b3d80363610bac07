//! LLM-backed combined extraction strategy.
//!
//! Builds a structured-output prompt, calls the caller-supplied
//! completion provider, and parses the response as JSON (tolerating a
//! surrounding code fence). Output is normalized: entity types
//! lowercased and leniently parsed, relationship types upper-snake-cased,
//! unknown-endpoint and self-referencing edges dropped, strength clamped.

use super::{EntityExtractor, ExtractionConfig, GraphExtractor};
use crate::domain::graph::{
    EntityType, ExtractedEntity, ExtractedRelationship, ExtractionResult,
};
use crate::error::GraphError;
use crate::extraction::normalize::{normalize_result, strip_code_fence};
use crate::llm::CompletionProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

// =============================================================================
// Response DTOs
// =============================================================================

/// Entity as returned by the model.
#[derive(Debug, Deserialize)]
struct EntityDto {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Relationship as returned by the model.
#[derive(Debug, Deserialize)]
struct RelationshipDto {
    source: String,
    target: String,
    #[serde(rename = "type", default)]
    relation_type: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    strength: Option<f32>,
}

/// Top-level extraction payload.
#[derive(Debug, Deserialize)]
struct ExtractionDto {
    #[serde(default)]
    entities: Vec<EntityDto>,
    #[serde(default)]
    relationships: Vec<RelationshipDto>,
}

impl From<EntityDto> for ExtractedEntity {
    fn from(dto: EntityDto) -> Self {
        Self {
            name: dto.name.trim().to_string(),
            entity_type: dto
                .entity_type
                .as_deref()
                .map(EntityType::from_label)
                .unwrap_or_default(),
            description: dto.description,
        }
    }
}

impl From<RelationshipDto> for ExtractedRelationship {
    fn from(dto: RelationshipDto) -> Self {
        Self {
            source: dto.source.trim().to_string(),
            target: dto.target.trim().to_string(),
            relation_type: dto.relation_type,
            description: dto.description,
            strength: dto.strength,
            metadata: None,
        }
    }
}

/// Parse a model response into a raw extraction result, stripping a
/// surrounding code fence first. Parse failure carries the raw response.
pub(crate) fn parse_extraction_response(response: &str) -> Result<ExtractionResult, GraphError> {
    let body = strip_code_fence(response);
    let dto: ExtractionDto =
        serde_json::from_str(body).map_err(|e| GraphError::JsonParse {
            message: e.to_string(),
            raw: response.to_string(),
        })?;

    Ok(ExtractionResult {
        entities: dto.entities.into_iter().map(Into::into).collect(),
        relationships: dto.relationships.into_iter().map(Into::into).collect(),
    })
}

// =============================================================================
// LLM Graph Extractor
// =============================================================================

/// Combined entity + relationship extraction via one LLM call per chunk.
#[derive(Debug, Clone)]
pub struct LlmGraphExtractor {
    provider: Arc<dyn CompletionProvider>,
    config: ExtractionConfig,
}

impl LlmGraphExtractor {
    /// Create a new extractor. The completion provider is required at
    /// construction; there is no unconfigured state.
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

    /// Render the structured-output prompt for a chunk of text.
    #[must_use]
    pub fn build_prompt(&self, text: &str) -> String {
        let types: Vec<&str> = self
            .config
            .target_types()
            .iter()
            .map(EntityType::as_str)
            .collect();

        format!(
            "Extract named entities and the relationships between them from the text below.\n\
             Respond with a single JSON object and nothing else:\n\
             {{\n\
             \x20 \"entities\": [{{\"name\": \"...\", \"type\": \"...\", \"description\": \"...\"}}],\n\
             \x20 \"relationships\": [{{\"source\": \"...\", \"target\": \"...\", \"type\": \"...\", \"description\": \"...\", \"strength\": 1-10}}]\n\
             }}\n\
             Entity \"type\" must be one of: {}.\n\
             Relationship \"type\" must be a short UPPER_SNAKE_CASE verb phrase (e.g. WORKS_AT, LOCATED_IN).\n\
             \"strength\" rates how strongly the text supports the relationship, 1 (weak) to 10 (explicit).\n\
             Only relate entities that appear in \"entities\". Extract at most {} entities.\n\n\
             Text:\n{}",
            types.join(", "),
            self.config.max_entities,
            text
        )
    }
}

#[async_trait]
impl GraphExtractor for LlmGraphExtractor {
    async fn extract(&self, text: &str) -> Result<ExtractionResult, GraphError> {
        let prompt = self.build_prompt(text);
        let response = self.provider.complete(&prompt).await?;

        let mut result = normalize_result(parse_extraction_response(&response)?);
        result.entities.truncate(self.config.max_entities);
        Ok(result)
    }

    fn name(&self) -> &'static str {
        "llm_graph"
    }
}

// The combined extractor doubles as an entity-only strategy for callers
// running separate passes.
#[async_trait]
impl EntityExtractor for LlmGraphExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, GraphError> {
        Ok(self.extract(text).await?.entities)
    }

    fn name(&self) -> &'static str {
        "llm_graph"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::CompletionFn;

    fn fixed_response(body: &'static str) -> Arc<dyn CompletionProvider> {
        Arc::new(CompletionFn::new(move |_| async move {
            Ok(body.to_string())
        }))
    }

    #[tokio::test]
    async fn test_extract_parses_fenced_json() {
        let response = "```json\n{\"entities\": [{\"name\": \"Alice\", \"type\": \"PERSON\"}, \
                        {\"name\": \"Acme\", \"type\": \"organization\"}], \
                        \"relationships\": [{\"source\": \"Alice\", \"target\": \"Acme\", \
                        \"type\": \"works at\", \"strength\": 15}]}\n```";
        let extractor = LlmGraphExtractor::new(fixed_response(response));

        let result = extractor.extract("Alice works at Acme.").await.unwrap();
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.entities[0].entity_type, EntityType::Person);
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.relationships[0].relation_type, "WORKS_AT");
        assert_eq!(result.relationships[0].strength, Some(10.0));
    }

    #[tokio::test]
    async fn test_extract_drops_unknown_and_self_edges() {
        let response = "{\"entities\": [{\"name\": \"Alice\"}], \
                        \"relationships\": [\
                        {\"source\": \"Alice\", \"target\": \"Alice\", \"type\": \"KNOWS\"}, \
                        {\"source\": \"Alice\", \"target\": \"Ghost\", \"type\": \"KNOWS\"}]}";
        let extractor = LlmGraphExtractor::new(fixed_response(response));

        let result = extractor.extract("text").await.unwrap();
        assert!(result.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_response_carries_raw() {
        let extractor = LlmGraphExtractor::new(fixed_response("I cannot help with that."));

        let err = extractor.extract("text").await.unwrap_err();
        match err {
            GraphError::JsonParse { raw, .. } => {
                assert_eq!(raw, "I cannot help with that.");
            }
            other => panic!("expected JsonParse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_completion_error_propagates() {
        let provider: Arc<dyn CompletionProvider> =
            Arc::new(CompletionFn::new(|_| async { anyhow::bail!("timeout") }));
        let extractor = LlmGraphExtractor::new(provider);

        let err = extractor.extract("text").await.unwrap_err();
        assert!(matches!(err, GraphError::Completion(_)));
    }

    #[test]
    fn test_prompt_names_types_and_convention() {
        let extractor = LlmGraphExtractor::new(fixed_response("{}"));
        let prompt = extractor.build_prompt("sample");
        assert!(prompt.contains("person"));
        assert!(prompt.contains("technology"));
        assert!(prompt.contains("UPPER_SNAKE_CASE"));
        assert!(prompt.contains("sample"));
    }
}
