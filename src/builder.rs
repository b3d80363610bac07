//! Graph construction over a batch of text chunks.
//!
//! Runs extraction strategies per chunk, records chunk→entity provenance,
//! deduplicates entities globally by name, and materializes query
//! snapshots. Per-chunk extraction failures are contained: the chunk is
//! skipped and the batch continues, favoring partial results over
//! all-or-nothing ingestion.

use crate::domain::graph::{
    Entity, EntityMention, GraphData, MentionDraft, Relationship, TextChunk,
};
use crate::extraction::{EntityExtractor, GraphExtractor, RelationshipExtractor};
use crate::query::QueryGraph;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Builds flat graph data from chunks and extraction strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Create a builder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Extract a graph from a batch of chunks using separate entity and
    /// relationship passes.
    ///
    /// Each chunk is processed independently: entity extraction failure
    /// skips the whole chunk; relationship extraction failure keeps the
    /// chunk's entities and mentions but drops its relationships.
    pub async fn build(
        &self,
        chunks: &[TextChunk],
        entity_extractor: &dyn EntityExtractor,
        relationship_extractor: &dyn RelationshipExtractor,
    ) -> GraphData {
        let mut raw_entities = Vec::new();
        let mut relationships = Vec::new();
        let mut mentions = Vec::new();

        for chunk in chunks {
            let entities = match entity_extractor.extract_entities(&chunk.text).await {
                Ok(entities) => entities,
                Err(e) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %e, "skipping chunk: entity extraction failed");
                    continue;
                }
            };

            // One mention per extracted entity per chunk. Mentions are
            // evidence records and are never deduplicated.
            for entity in &entities {
                mentions.push(MentionDraft {
                    entity_name: entity.name.clone(),
                    chunk_id: chunk.id,
                    span_start: None,
                    span_end: None,
                    context: None,
                });
            }

            match relationship_extractor
                .extract_relationships(&chunk.text, &entities)
                .await
            {
                Ok(rels) => relationships.extend(rels),
                Err(e) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %e, "relationship extraction failed; keeping chunk entities");
                }
            }

            raw_entities.extend(entities);
        }

        let entities = dedup_entities(raw_entities);
        tracing::info!(
            entities = entities.len(),
            relationships = relationships.len(),
            mentions = mentions.len(),
            chunks = chunks.len(),
            "graph build complete"
        );

        GraphData {
            entities,
            relationships,
            mentions,
        }
    }

    /// Extract a graph using a combined single-pass strategy.
    pub async fn build_combined(
        &self,
        chunks: &[TextChunk],
        extractor: &dyn GraphExtractor,
    ) -> GraphData {
        let mut raw_entities = Vec::new();
        let mut relationships = Vec::new();
        let mut mentions = Vec::new();

        for chunk in chunks {
            let result = match extractor.extract(&chunk.text).await {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(chunk_id = %chunk.id, error = %e, "skipping chunk: extraction failed");
                    continue;
                }
            };

            for entity in &result.entities {
                mentions.push(MentionDraft {
                    entity_name: entity.name.clone(),
                    chunk_id: chunk.id,
                    span_start: None,
                    span_end: None,
                    context: None,
                });
            }

            relationships.extend(result.relationships);
            raw_entities.extend(result.entities);
        }

        GraphData {
            entities: dedup_entities(raw_entities),
            relationships,
            mentions,
        }
    }

    /// Merge two independently built graphs: entities deduplicated by
    /// name across both inputs (first input wins), relationships and
    /// mentions concatenated.
    #[must_use]
    pub fn merge(&self, mut a: GraphData, b: GraphData) -> GraphData {
        let mut seen: HashSet<String> = a
            .entities
            .iter()
            .map(|e| e.name.to_lowercase())
            .collect();

        for entity in b.entities {
            if seen.insert(entity.name.to_lowercase()) {
                a.entities.push(entity);
            }
        }

        a.relationships.extend(b.relationships);
        a.mentions.extend(b.mentions);
        a
    }

    /// Materialize flat builder output into the adjacency-indexed
    /// snapshot consumed by the query layer. Relationship and mention
    /// drafts whose names do not resolve are dropped here, mirroring the
    /// store's write-time filtering.
    #[must_use]
    pub fn into_query_graph(&self, data: GraphData, chunks: Vec<TextChunk>) -> QueryGraph {
        let name_map: HashMap<String, Uuid> = data
            .entities
            .iter()
            .map(|e| (e.name.to_lowercase(), e.id))
            .collect();

        let now = chrono::Utc::now().to_rfc3339();
        let relationships: Vec<Relationship> = data
            .relationships
            .into_iter()
            .filter_map(|rel| {
                let source_id = *name_map.get(&rel.source.to_lowercase())?;
                let target_id = *name_map.get(&rel.target.to_lowercase())?;
                if source_id == target_id {
                    return None;
                }
                Some(Relationship {
                    id: Uuid::new_v4(),
                    source_id,
                    target_id,
                    relation_type: rel.relation_type,
                    description: rel.description,
                    strength: rel.strength,
                    metadata: rel.metadata,
                    created_at: now.clone(),
                })
            })
            .collect();

        let mentions: Vec<EntityMention> = data
            .mentions
            .into_iter()
            .filter_map(|m| {
                let entity_id = *name_map.get(&m.entity_name.to_lowercase())?;
                Some(EntityMention {
                    id: Uuid::new_v4(),
                    entity_id,
                    chunk_id: m.chunk_id,
                    span_start: m.span_start,
                    span_end: m.span_end,
                    context: m.context,
                })
            })
            .collect();

        QueryGraph::build(data.entities, relationships, chunks, mentions, Vec::new())
    }
}

/// Deduplicate extracted entities by lowercased name. The first
/// occurrence's type and description win; each survivor gets a fresh id.
fn dedup_entities(raw: Vec<crate::domain::graph::ExtractedEntity>) -> Vec<Entity> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();

    for extracted in raw {
        let key = extracted.name.to_lowercase();
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        let mut entity = Entity::new(extracted.name, extracted.entity_type);
        entity.description = extracted.description;
        out.push(entity);
    }

    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{EntityType, ExtractedEntity, ExtractedRelationship};
    use crate::error::GraphError;
    use crate::extraction::{FnEntityExtractor, FnRelationshipExtractor, LlmGraphExtractor};
    use crate::llm::{CompletionFn, CompletionProvider};
    use std::sync::Arc;

    fn extracted(name: &str) -> ExtractedEntity {
        ExtractedEntity {
            name: name.to_string(),
            entity_type: EntityType::Person,
            description: None,
        }
    }

    /// Entity extractor that returns every capitalized word as a person.
    fn naive_entities() -> FnEntityExtractor {
        FnEntityExtractor::new(|text: String| async move {
            let mut names = Vec::new();
            for word in text.split_whitespace() {
                let word = word.trim_matches(|c: char| !c.is_alphanumeric());
                if word.chars().next().is_some_and(char::is_uppercase) {
                    names.push(extracted(word));
                }
            }
            Ok(names)
        })
    }

    fn no_relationships() -> FnRelationshipExtractor {
        FnRelationshipExtractor::new(|_, _| async { Ok(Vec::new()) })
    }

    #[tokio::test]
    async fn test_dedup_by_name_first_wins() {
        let builder = GraphBuilder::new();
        let chunks = vec![
            TextChunk::new("Alice met Bob"),
            TextChunk::new("Bob met Alice again"),
        ];

        let data = builder
            .build(&chunks, &naive_entities(), &no_relationships())
            .await;

        assert_eq!(data.entities.len(), 2);
        // Alice+Bob in chunk 1, Bob+Alice in chunk 2: four mention events.
        assert_eq!(data.mentions.len(), 4);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_skipped_not_fatal() {
        let builder = GraphBuilder::new();
        let chunks = vec![TextChunk::new("FAIL"), TextChunk::new("Alice works")];

        let flaky = FnEntityExtractor::new(|text: String| async move {
            if text.contains("FAIL") {
                Err(GraphError::JsonParse {
                    message: "bad output".to_string(),
                    raw: text,
                })
            } else {
                Ok(vec![extracted("Alice")])
            }
        });

        let data = builder.build(&chunks, &flaky, &no_relationships()).await;
        assert_eq!(data.entities.len(), 1);
        assert_eq!(data.entities[0].name, "Alice");
        assert_eq!(data.mentions.len(), 1);
    }

    #[tokio::test]
    async fn test_mentions_are_per_chunk_evidence() {
        let builder = GraphBuilder::new();
        let chunks = vec![
            TextChunk::new("Alice one"),
            TextChunk::new("Alice two"),
            TextChunk::new("Alice three"),
        ];

        let data = builder
            .build(&chunks, &naive_entities(), &no_relationships())
            .await;

        assert_eq!(data.entities.len(), 1);
        assert_eq!(data.mentions.len(), 3);
        let chunk_ids: std::collections::HashSet<_> =
            data.mentions.iter().map(|m| m.chunk_id).collect();
        assert_eq!(chunk_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_build_combined_skips_failed_chunks() {
        let builder = GraphBuilder::new();
        let chunks = vec![
            TextChunk::new("garbled"),
            TextChunk::new("Alice works at Acme"),
        ];

        // The prompt embeds the chunk text, so the provider can fail one
        // chunk and answer the other.
        let provider: Arc<dyn CompletionProvider> =
            Arc::new(CompletionFn::new(|prompt: String| async move {
                if prompt.contains("garbled") {
                    Ok("no json here".to_string())
                } else {
                    Ok("{\"entities\": [\
                        {\"name\": \"Alice\", \"type\": \"person\"}, \
                        {\"name\": \"Acme\", \"type\": \"organization\"}], \
                        \"relationships\": [{\"source\": \"Alice\", \
                        \"target\": \"Acme\", \"type\": \"WORKS_AT\"}]}"
                        .to_string())
                }
            }));
        let extractor = LlmGraphExtractor::new(provider);

        let data = builder.build_combined(&chunks, &extractor).await;
        assert_eq!(data.entities.len(), 2);
        assert_eq!(data.relationships.len(), 1);
        assert_eq!(data.mentions.len(), 2);
        // All surviving evidence points at the chunk that parsed.
        assert!(data.mentions.iter().all(|m| m.chunk_id == chunks[1].id));
    }

    #[tokio::test]
    async fn test_merge_dedups_entities_concats_rest() {
        let builder = GraphBuilder::new();

        let mut a = GraphData::default();
        let mut alice = Entity::new("Alice", EntityType::Person);
        alice.description = Some("from a".to_string());
        a.entities.push(alice);
        a.mentions.push(MentionDraft {
            entity_name: "Alice".to_string(),
            chunk_id: Uuid::new_v4(),
            span_start: None,
            span_end: None,
            context: None,
        });

        let mut b = GraphData::default();
        let mut alice_b = Entity::new("alice", EntityType::Other);
        alice_b.description = Some("from b".to_string());
        b.entities.push(alice_b);
        b.entities.push(Entity::new("Bob", EntityType::Person));
        b.mentions.push(MentionDraft {
            entity_name: "alice".to_string(),
            chunk_id: Uuid::new_v4(),
            span_start: None,
            span_end: None,
            context: None,
        });

        let merged = builder.merge(a, b);
        assert_eq!(merged.entities.len(), 2);
        assert_eq!(merged.entities[0].description.as_deref(), Some("from a"));
        assert_eq!(merged.mentions.len(), 2);
    }

    #[tokio::test]
    async fn test_into_query_graph_resolves_names() {
        let builder = GraphBuilder::new();
        let chunk = TextChunk::new("Alice manages Bob");
        let chunks = vec![chunk.clone()];

        let entities = FnEntityExtractor::new(|_| async {
            Ok(vec![extracted("Alice"), extracted("Bob")])
        });
        let rels = FnRelationshipExtractor::new(|_, _| async {
            Ok(vec![ExtractedRelationship {
                source: "Alice".to_string(),
                target: "Bob".to_string(),
                relation_type: "MANAGES".to_string(),
                description: None,
                strength: Some(8.0),
                metadata: None,
            }])
        });

        let data = builder.build(&chunks, &entities, &rels).await;
        let graph = builder.into_query_graph(data, chunks);

        assert_eq!(graph.entity_count(), 2);
        assert_eq!(graph.relationships().len(), 1);

        let alice = graph.find_entities_by_name("alice", false);
        assert_eq!(alice.len(), 1);
        assert_eq!(graph.entity(alice[0].id).unwrap().name, "Alice");
        let reachable = graph.traverse(alice[0].id, 1);
        assert_eq!(reachable.len(), 1);
        assert_eq!(reachable[0].name, "Bob");

        // Both entities were mentioned in the single source chunk.
        assert_eq!(graph.entities_in_chunk(chunk.id).len(), 2);
        assert!(graph.entities_in_chunk(Uuid::new_v4()).is_empty());
    }
}
