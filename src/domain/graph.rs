//! Knowledge Graph Domain Models
//!
//! Entity, relationship, mention, and community structures for
//! knowledge graph-enhanced retrieval, plus the flat builder output
//! and the filter/pagination types used by list queries.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Entity Types
// =============================================================================

/// Types of entities that can be extracted from documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A person or individual
    Person,
    /// An organization, company, or institution
    Organization,
    /// A geographical or political location
    Location,
    /// An event or occurrence
    Event,
    /// A technical or abstract concept
    Concept,
    /// A product, system, or technology
    Technology,
    /// Anything that does not fit the other categories
    Other,
}

impl Default for EntityType {
    fn default() -> Self {
        Self::Other
    }
}

impl EntityType {
    /// All known types, in prompt/display order.
    pub const ALL: [EntityType; 7] = [
        Self::Person,
        Self::Organization,
        Self::Location,
        Self::Event,
        Self::Concept,
        Self::Technology,
        Self::Other,
    ];

    /// Parse a type label leniently. Unknown labels map to `Other`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "person" | "people" | "per" => Self::Person,
            "organization" | "organisation" | "org" | "company" => Self::Organization,
            "location" | "place" | "gpe" | "loc" => Self::Location,
            "event" => Self::Event,
            "concept" | "idea" | "topic" => Self::Concept,
            "technology" | "tech" | "product" | "tool" => Self::Technology,
            _ => Self::Other,
        }
    }

    /// The canonical lowercase label for this type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Event => "event",
            Self::Concept => "concept",
            Self::Technology => "technology",
            Self::Other => "other",
        }
    }
}

// =============================================================================
// Entity
// =============================================================================

/// A deduplicated named graph node. `(name, collection_id)` is unique:
/// re-extracting the same name within a collection resolves to the
/// existing row at persist time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: Uuid,
    /// Entity name as extracted (dedup key, case-insensitive)
    pub name: String,
    /// Entity type classification
    pub entity_type: EntityType,
    /// LLM-generated description of the entity
    #[serde(default)]
    pub description: Option<String>,
    /// Vector embedding for similarity search
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Owning collection (assigned at persist time for builder output)
    #[serde(default)]
    pub collection_id: String,
    /// Creation timestamp (RFC3339)
    pub created_at: String,
}

impl Entity {
    /// Create an entity with a fresh id, no embedding, and no collection.
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            entity_type,
            description: None,
            embedding: None,
            collection_id: String::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// =============================================================================
// Relationship
// =============================================================================

/// Lower bound for relationship strength; values below clamp up.
pub const STRENGTH_MIN: f32 = 1.0;
/// Upper bound for relationship strength; values above clamp down.
pub const STRENGTH_MAX: f32 = 10.0;

/// A typed, strength-weighted directed edge between two entities.
/// Stored directed; traversal treats edges as undirected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier
    pub id: Uuid,
    /// Source entity ID
    pub source_id: Uuid,
    /// Target entity ID
    pub target_id: Uuid,
    /// Relationship type, normalized to UPPER_SNAKE_CASE (e.g., "WORKS_AT")
    pub relation_type: String,
    /// LLM-generated description of the relationship
    #[serde(default)]
    pub description: Option<String>,
    /// Strength in [1, 10] when present; absent means unrated
    #[serde(default)]
    pub strength: Option<f32>,
    /// Arbitrary extra attributes
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Creation timestamp (RFC3339)
    pub created_at: String,
}

/// Clamp a strength value into the valid `[1, 10]` range.
/// Zero and negative values clamp up to 1.
#[must_use]
pub fn clamp_strength(value: f32) -> f32 {
    value.clamp(STRENGTH_MIN, STRENGTH_MAX)
}

// =============================================================================
// Entity Mention
// =============================================================================

/// Provenance record linking a text chunk to an entity it mentions.
/// Mentions are per-chunk evidence and are never deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    /// Unique identifier
    pub id: Uuid,
    /// Mentioned entity
    pub entity_id: Uuid,
    /// Chunk the mention occurred in
    pub chunk_id: Uuid,
    /// Byte offset of the mention start, when known
    #[serde(default)]
    pub span_start: Option<i32>,
    /// Byte offset of the mention end, when known
    #[serde(default)]
    pub span_end: Option<i32>,
    /// Surrounding text, when captured
    #[serde(default)]
    pub context: Option<String>,
}

// =============================================================================
// Community
// =============================================================================

/// A detected cluster of entities at a hierarchy level, with a cached,
/// change-tracked summary. `dirty` and `change_count` form the
/// cache-invalidation pair: graph mutations bump them cheaply, and a
/// separate batch pass regenerates summaries where needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    /// Unique identifier
    pub id: Uuid,
    /// Hierarchy level (0 = finest partition, higher = coarser)
    pub level: u32,
    /// Member entity ids (weak references — membership, not ownership)
    pub entity_ids: Vec<Uuid>,
    /// Cached LLM-generated summary
    #[serde(default)]
    pub summary: Option<String>,
    /// Set when membership changed since the summary was generated
    #[serde(default)]
    pub dirty: bool,
    /// Number of graph mutations affecting this community since the
    /// summary was last generated
    #[serde(default)]
    pub change_count: i32,
    /// Owning collection
    pub collection_id: String,
    /// Creation timestamp (RFC3339)
    pub created_at: String,
}

// =============================================================================
// Text Chunk
// =============================================================================

/// The engine's view of an ingested text chunk. Chunking and embedding
/// happen upstream; the graph layer only consumes chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    /// Unique identifier (assigned by the ingestion pipeline)
    pub id: Uuid,
    /// Raw chunk text
    pub text: String,
    /// Chunk embedding, when the caller supplies one
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl TextChunk {
    /// Create a chunk with a fresh id and no embedding.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            embedding: None,
        }
    }
}

// =============================================================================
// Extraction Output (name-based, pre-resolution)
// =============================================================================

/// An entity as returned by an extraction strategy, before ids are
/// assigned and names are resolved against the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Entity name as it appeared in the text
    pub name: String,
    /// Type classification (lowercased, leniently parsed)
    pub entity_type: EntityType,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// A relationship as returned by an extraction strategy. Endpoints are
/// entity names; resolution to ids happens at persist time via the
/// name-to-id map, and unresolved rows are silently dropped there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    /// Source entity name
    pub source: String,
    /// Target entity name
    pub target: String,
    /// Relationship type, normalized to UPPER_SNAKE_CASE
    pub relation_type: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// Optional strength, clamped to [1, 10] when present
    #[serde(default)]
    pub strength: Option<f32>,
    /// Arbitrary extra attributes
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Result of entity/relationship extraction from one chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted entities
    pub entities: Vec<ExtractedEntity>,
    /// Extracted relationships
    pub relationships: Vec<ExtractedRelationship>,
}

/// A mention awaiting persistence. The entity is referenced by name
/// because ids are only resolved during `persist_entities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionDraft {
    /// Name of the mentioned entity
    pub entity_name: String,
    /// Chunk the mention occurred in
    pub chunk_id: Uuid,
    /// Byte offset of the mention start, when known
    #[serde(default)]
    pub span_start: Option<i32>,
    /// Byte offset of the mention end, when known
    #[serde(default)]
    pub span_end: Option<i32>,
    /// Surrounding text, when captured
    #[serde(default)]
    pub context: Option<String>,
}

/// Flat graph produced by the builder: deduplicated entities with fresh
/// ids, plus name-based relationship and mention drafts ready for the
/// store's resolution map.
#[derive(Debug, Clone, Default)]
pub struct GraphData {
    pub entities: Vec<Entity>,
    pub relationships: Vec<ExtractedRelationship>,
    pub mentions: Vec<MentionDraft>,
}

// =============================================================================
// Search Results
// =============================================================================

/// A chunk scored by graph evidence: `mention_count * mention_weight`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Chunk id
    pub chunk_id: Uuid,
    /// Number of mentions of the queried entities in this chunk
    pub mention_count: usize,
    /// Final score (descending sort key)
    pub score: f32,
}

// =============================================================================
// List Filters & Pagination
// =============================================================================

/// Filter for paginated entity listing.
#[derive(Debug, Clone, Default)]
pub struct EntityFilter {
    /// Restrict to a single type
    pub entity_type: Option<EntityType>,
    /// Case-insensitive name substring
    pub search: Option<String>,
}

/// Filter for paginated relationship listing.
#[derive(Debug, Clone, Default)]
pub struct RelationshipFilter {
    /// Restrict to a normalized type
    pub relation_type: Option<String>,
    /// Strength bucket lower bound (inclusive)
    pub min_strength: Option<f32>,
    /// Strength bucket upper bound (inclusive)
    pub max_strength: Option<f32>,
}

/// Filter for paginated community listing.
#[derive(Debug, Clone, Default)]
pub struct CommunityFilter {
    /// Restrict to a hierarchy level
    pub level: Option<u32>,
    /// Case-insensitive summary substring
    pub search: Option<String>,
}

/// Offset/limit pagination window.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_lenient_parse() {
        assert_eq!(EntityType::from_label("PERSON"), EntityType::Person);
        assert_eq!(EntityType::from_label(" org "), EntityType::Organization);
        assert_eq!(EntityType::from_label("tool"), EntityType::Technology);
        assert_eq!(EntityType::from_label("gibberish"), EntityType::Other);
    }

    #[test]
    fn test_strength_clamp_bounds() {
        assert_eq!(clamp_strength(15.0), 10.0);
        assert_eq!(clamp_strength(0.0), 1.0);
        assert_eq!(clamp_strength(-3.0), 1.0);
        assert_eq!(clamp_strength(5.5), 5.5);
        assert_eq!(clamp_strength(1.0), 1.0);
        assert_eq!(clamp_strength(10.0), 10.0);
    }

    #[test]
    fn test_entity_type_round_trip() {
        for t in EntityType::ALL {
            assert_eq!(EntityType::from_label(t.as_str()), t);
        }
    }
}
