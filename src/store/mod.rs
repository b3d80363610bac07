//! Storage-backend-agnostic persistence contract for the knowledge graph.
//!
//! Two interchangeable backends implement this trait: a durable Postgres
//! backend and a transient single-owner in-memory backend. Both must
//! behave identically; the shared contract test suite in
//! `tests/graph_store_contract.rs` exercises each.
//!
//! Write semantics shared by all backends:
//! - `persist_entities` upserts by `(name, collection)`; an existing row
//!   keeps its id and content, and the returned map is the resolution
//!   table for subsequent relationship/mention writes.
//! - `persist_relationships` / `persist_mentions` silently drop records
//!   whose names are absent from the resolution map — partial graphs from
//!   imperfect extraction are an expected outcome, not a write error.
//! - The three writes have no enclosing atomic boundary; callers needing
//!   all-or-nothing semantics coordinate their own transaction.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryGraphStore;
pub use postgres::PostgresGraphStore;

use crate::domain::graph::{
    Community, CommunityFilter, Entity, EntityFilter, EntityMention, ExtractedRelationship,
    MentionDraft, Page, Relationship, RelationshipFilter, ScoredChunk,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

/// The abstract contract a storage backend must satisfy to be
/// interchangeable.
#[async_trait]
pub trait GraphStore: Send + Sync + std::fmt::Debug {
    // =========================================================================
    // Graph Writes
    // =========================================================================

    /// Upsert entities by `(name, collection)`. Returns the
    /// lowercased-name → id resolution map covering every input entity,
    /// with existing rows resolving to their existing ids.
    async fn persist_entities(
        &self,
        collection_id: &str,
        entities: &[Entity],
    ) -> Result<HashMap<String, Uuid>>;

    /// Write relationships, resolving endpoint names through `name_map`.
    /// Unresolvable and self-referencing rows are dropped; strength is
    /// clamped to [1, 10]. Returns the number of rows written.
    async fn persist_relationships(
        &self,
        relationships: &[ExtractedRelationship],
        name_map: &HashMap<String, Uuid>,
    ) -> Result<usize>;

    /// Write mentions, resolving entity names through `name_map`.
    /// Unresolvable rows are dropped. Returns the number written.
    async fn persist_mentions(
        &self,
        mentions: &[MentionDraft],
        name_map: &HashMap<String, Uuid>,
    ) -> Result<usize>;

    // =========================================================================
    // Graph Reads
    // =========================================================================

    /// Resolve entity names (optionally scoped to collections) and score
    /// every chunk mentioning any of them: `mention_count * mention_weight`,
    /// sorted descending. Unknown names simply contribute nothing.
    async fn search(
        &self,
        entity_names: &[String],
        collections: Option<&[String]>,
    ) -> Result<Vec<ScoredChunk>>;

    /// All entities in a collection.
    async fn find_entities(&self, collection_id: &str) -> Result<Vec<Entity>>;

    /// Breadth-first closure over relationship edges treated as
    /// undirected, bounded to `depth` hops, origin included.
    /// `depth = 0` returns only the origin.
    async fn find_related_entities(&self, entity_id: Uuid, depth: u32) -> Result<Vec<Entity>>;

    /// Relationships whose both endpoints are in the given entity set.
    async fn find_relationships(&self, entity_ids: &[Uuid]) -> Result<Vec<Relationship>>;

    // =========================================================================
    // Communities
    // =========================================================================

    /// Replace the stored communities for a collection.
    async fn persist_communities(
        &self,
        collection_id: &str,
        communities: &[Community],
    ) -> Result<()>;

    /// All communities (with summaries and change tracking) for a
    /// collection.
    async fn get_community_summaries(&self, collection_id: &str) -> Result<Vec<Community>>;

    /// Bump `change_count` and set `dirty` on every community in the
    /// collection containing any of the given entities. The cheap,
    /// write-coalescing half of summary cache invalidation; regeneration
    /// is a separate batch pass. Returns the number of communities
    /// marked.
    async fn mark_communities_changed(
        &self,
        collection_id: &str,
        entity_ids: &[Uuid],
    ) -> Result<usize>;

    /// Store a freshly generated summary and reset the community's
    /// change tracking (`dirty = false`, `change_count = 0`).
    async fn update_community_summary(&self, community_id: Uuid, summary: &str) -> Result<()>;

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete mentions referencing the given chunks, then reap orphaned
    /// entities (zero remaining mentions) and every relationship touching
    /// a reaped entity.
    async fn delete_by_chunks(&self, chunk_ids: &[Uuid]) -> Result<()>;

    /// Cascade-delete everything scoped to a collection: entities,
    /// relationships, mentions, communities.
    async fn delete_by_collection(&self, collection_id: &str) -> Result<()>;

    // =========================================================================
    // Detail Lookups
    // =========================================================================

    /// Get an entity by id; `None` when absent.
    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>>;

    /// Get a relationship by id; `None` when absent.
    async fn get_relationship(&self, id: Uuid) -> Result<Option<Relationship>>;

    /// All mentions of an entity.
    async fn get_mentions(&self, entity_id: Uuid) -> Result<Vec<EntityMention>>;

    /// Get a community by id; `None` when absent.
    async fn get_community(&self, id: Uuid) -> Result<Option<Community>>;

    // =========================================================================
    // Paginated List Queries (UI consumption)
    // =========================================================================

    /// Entities in a collection, filtered by type and/or name substring.
    async fn list_entities(
        &self,
        collection_id: &str,
        filter: &EntityFilter,
        page: Page,
    ) -> Result<Vec<Entity>>;

    /// Relationships in a collection (via their source entity), filtered
    /// by type and/or strength bucket.
    async fn list_relationships(
        &self,
        collection_id: &str,
        filter: &RelationshipFilter,
        page: Page,
    ) -> Result<Vec<Relationship>>;

    /// Communities in a collection, filtered by level and/or summary
    /// substring.
    async fn list_communities(
        &self,
        collection_id: &str,
        filter: &CommunityFilter,
        page: Page,
    ) -> Result<Vec<Community>>;
}
