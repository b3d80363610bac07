//! Transient in-memory graph store.
//!
//! All state lives in one struct behind a single `tokio::sync::Mutex`:
//! every read and write linearizes through that one logical owner, giving
//! per-call atomicity without external locking. Multiple independent
//! instances may coexist (one per test, one per ephemeral deployment).

use super::GraphStore;
use crate::config::GraphConfig;
use crate::domain::graph::{
    clamp_strength, Community, CommunityFilter, Entity, EntityFilter, EntityMention,
    ExtractedRelationship, MentionDraft, Page, Relationship, RelationshipFilter, ScoredChunk,
};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    entities: HashMap<Uuid, Entity>,
    /// `(collection_id, lowercased name)` → entity id. The uniqueness
    /// invariant lives here.
    name_index: HashMap<(String, String), Uuid>,
    relationships: HashMap<Uuid, Relationship>,
    mentions: HashMap<Uuid, EntityMention>,
    communities: HashMap<Uuid, Community>,
}

/// In-memory [`GraphStore`] backend.
#[derive(Debug)]
pub struct InMemoryGraphStore {
    state: Mutex<MemoryState>,
    mention_weight: f32,
}

impl InMemoryGraphStore {
    /// Create an empty store with default scoring configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&GraphConfig::default())
    }

    /// Create an empty store with the given configuration.
    #[must_use]
    pub fn with_config(config: &GraphConfig) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            mention_weight: config.scoring.mention_weight,
        }
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryState {
    fn undirected_neighbors(&self, id: Uuid) -> Vec<Uuid> {
        self.relationships
            .values()
            .filter_map(|rel| {
                if rel.source_id == id {
                    Some(rel.target_id)
                } else if rel.target_id == id {
                    Some(rel.source_id)
                } else {
                    None
                }
            })
            .collect()
    }

    /// Remove an entity together with its relationships and mentions.
    fn remove_entity(&mut self, id: Uuid) {
        if let Some(entity) = self.entities.remove(&id) {
            self.name_index
                .remove(&(entity.collection_id.clone(), entity.name.to_lowercase()));
        }
        self.relationships
            .retain(|_, rel| rel.source_id != id && rel.target_id != id);
        self.mentions.retain(|_, m| m.entity_id != id);
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn persist_entities(
        &self,
        collection_id: &str,
        entities: &[Entity],
    ) -> Result<HashMap<String, Uuid>> {
        let mut state = self.state.lock().await;
        let mut name_map = HashMap::with_capacity(entities.len());

        for entity in entities {
            let name_key = entity.name.to_lowercase();
            let index_key = (collection_id.to_string(), name_key.clone());

            let id = match state.name_index.get(&index_key) {
                // Existing row wins; the caller's content is discarded.
                Some(existing) => *existing,
                None => {
                    let mut row = entity.clone();
                    row.collection_id = collection_id.to_string();
                    let id = row.id;
                    state.entities.insert(id, row);
                    state.name_index.insert(index_key, id);
                    id
                }
            };
            name_map.insert(name_key, id);
        }

        Ok(name_map)
    }

    async fn persist_relationships(
        &self,
        relationships: &[ExtractedRelationship],
        name_map: &HashMap<String, Uuid>,
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        let now = chrono::Utc::now().to_rfc3339();
        let mut written = 0;

        for rel in relationships {
            let (Some(&source_id), Some(&target_id)) = (
                name_map.get(&rel.source.to_lowercase()),
                name_map.get(&rel.target.to_lowercase()),
            ) else {
                tracing::debug!(source = %rel.source, target = %rel.target, "dropping unresolved relationship");
                continue;
            };
            if source_id == target_id {
                continue;
            }

            let row = Relationship {
                id: Uuid::new_v4(),
                source_id,
                target_id,
                relation_type: rel.relation_type.clone(),
                description: rel.description.clone(),
                strength: rel.strength.map(clamp_strength),
                metadata: rel.metadata.clone(),
                created_at: now.clone(),
            };
            state.relationships.insert(row.id, row);
            written += 1;
        }

        Ok(written)
    }

    async fn persist_mentions(
        &self,
        mentions: &[MentionDraft],
        name_map: &HashMap<String, Uuid>,
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut written = 0;

        for mention in mentions {
            let Some(&entity_id) = name_map.get(&mention.entity_name.to_lowercase()) else {
                tracing::debug!(entity = %mention.entity_name, "dropping unresolved mention");
                continue;
            };

            let row = EntityMention {
                id: Uuid::new_v4(),
                entity_id,
                chunk_id: mention.chunk_id,
                span_start: mention.span_start,
                span_end: mention.span_end,
                context: mention.context.clone(),
            };
            state.mentions.insert(row.id, row);
            written += 1;
        }

        Ok(written)
    }

    async fn search(
        &self,
        entity_names: &[String],
        collections: Option<&[String]>,
    ) -> Result<Vec<ScoredChunk>> {
        let state = self.state.lock().await;

        let mut entity_ids: HashSet<Uuid> = HashSet::new();
        for name in entity_names {
            let name_key = name.to_lowercase();
            for ((collection, indexed_name), id) in &state.name_index {
                let in_scope =
                    collections.is_none_or(|cols| cols.iter().any(|c| c == collection));
                if in_scope && *indexed_name == name_key {
                    entity_ids.insert(*id);
                }
            }
        }

        let mut counts: HashMap<Uuid, usize> = HashMap::new();
        for mention in state.mentions.values() {
            if entity_ids.contains(&mention.entity_id) {
                *counts.entry(mention.chunk_id).or_default() += 1;
            }
        }

        let mut scored: Vec<ScoredChunk> = counts
            .into_iter()
            .map(|(chunk_id, mention_count)| ScoredChunk {
                chunk_id,
                mention_count,
                score: mention_count as f32 * self.mention_weight,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(scored)
    }

    async fn find_entities(&self, collection_id: &str) -> Result<Vec<Entity>> {
        let state = self.state.lock().await;
        Ok(state
            .entities
            .values()
            .filter(|e| e.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn find_related_entities(&self, entity_id: Uuid, depth: u32) -> Result<Vec<Entity>> {
        let state = self.state.lock().await;
        let Some(origin) = state.entities.get(&entity_id) else {
            return Ok(Vec::new());
        };

        let mut visited: HashSet<Uuid> = HashSet::from([entity_id]);
        let mut queue: VecDeque<(Uuid, u32)> = VecDeque::from([(entity_id, 0)]);
        let mut found = vec![origin.clone()];

        while let Some((current, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for next in state.undirected_neighbors(current) {
                if visited.insert(next) {
                    if let Some(entity) = state.entities.get(&next) {
                        found.push(entity.clone());
                    }
                    queue.push_back((next, dist + 1));
                }
            }
        }

        Ok(found)
    }

    async fn find_relationships(&self, entity_ids: &[Uuid]) -> Result<Vec<Relationship>> {
        let state = self.state.lock().await;
        let set: HashSet<Uuid> = entity_ids.iter().copied().collect();
        Ok(state
            .relationships
            .values()
            .filter(|rel| set.contains(&rel.source_id) && set.contains(&rel.target_id))
            .cloned()
            .collect())
    }

    async fn persist_communities(
        &self,
        collection_id: &str,
        communities: &[Community],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .communities
            .retain(|_, c| c.collection_id != collection_id);
        for community in communities {
            let mut row = community.clone();
            row.collection_id = collection_id.to_string();
            state.communities.insert(row.id, row);
        }
        Ok(())
    }

    async fn get_community_summaries(&self, collection_id: &str) -> Result<Vec<Community>> {
        let state = self.state.lock().await;
        Ok(state
            .communities
            .values()
            .filter(|c| c.collection_id == collection_id)
            .cloned()
            .collect())
    }

    async fn mark_communities_changed(
        &self,
        collection_id: &str,
        entity_ids: &[Uuid],
    ) -> Result<usize> {
        let mut state = self.state.lock().await;
        let set: HashSet<Uuid> = entity_ids.iter().copied().collect();
        let mut marked = 0;

        for community in state.communities.values_mut() {
            if community.collection_id == collection_id
                && community.entity_ids.iter().any(|id| set.contains(id))
            {
                community.change_count += 1;
                community.dirty = true;
                marked += 1;
            }
        }

        Ok(marked)
    }

    async fn update_community_summary(&self, community_id: Uuid, summary: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(community) = state.communities.get_mut(&community_id) {
            community.summary = Some(summary.to_string());
            community.dirty = false;
            community.change_count = 0;
        }
        Ok(())
    }

    async fn delete_by_chunks(&self, chunk_ids: &[Uuid]) -> Result<()> {
        let mut state = self.state.lock().await;
        let chunks: HashSet<Uuid> = chunk_ids.iter().copied().collect();

        // Entities whose evidence is being deleted are reap candidates.
        let affected: HashSet<Uuid> = state
            .mentions
            .values()
            .filter(|m| chunks.contains(&m.chunk_id))
            .map(|m| m.entity_id)
            .collect();

        state.mentions.retain(|_, m| !chunks.contains(&m.chunk_id));

        for entity_id in affected {
            let still_mentioned = state
                .mentions
                .values()
                .any(|m| m.entity_id == entity_id);
            if !still_mentioned {
                state.remove_entity(entity_id);
            }
        }

        Ok(())
    }

    async fn delete_by_collection(&self, collection_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        let doomed: Vec<Uuid> = state
            .entities
            .values()
            .filter(|e| e.collection_id == collection_id)
            .map(|e| e.id)
            .collect();
        for id in doomed {
            state.remove_entity(id);
        }

        state
            .communities
            .retain(|_, c| c.collection_id != collection_id);

        Ok(())
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        let state = self.state.lock().await;
        Ok(state.entities.get(&id).cloned())
    }

    async fn get_relationship(&self, id: Uuid) -> Result<Option<Relationship>> {
        let state = self.state.lock().await;
        Ok(state.relationships.get(&id).cloned())
    }

    async fn get_mentions(&self, entity_id: Uuid) -> Result<Vec<EntityMention>> {
        let state = self.state.lock().await;
        Ok(state
            .mentions
            .values()
            .filter(|m| m.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn get_community(&self, id: Uuid) -> Result<Option<Community>> {
        let state = self.state.lock().await;
        Ok(state.communities.get(&id).cloned())
    }

    async fn list_entities(
        &self,
        collection_id: &str,
        filter: &EntityFilter,
        page: Page,
    ) -> Result<Vec<Entity>> {
        let state = self.state.lock().await;
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut rows: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| e.collection_id == collection_id)
            .filter(|e| filter.entity_type.is_none_or(|t| e.entity_type == t))
            .filter(|e| {
                needle
                    .as_ref()
                    .is_none_or(|n| e.name.to_lowercase().contains(n))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(rows.into_iter().skip(page.offset).take(page.limit).collect())
    }

    async fn list_relationships(
        &self,
        collection_id: &str,
        filter: &RelationshipFilter,
        page: Page,
    ) -> Result<Vec<Relationship>> {
        let state = self.state.lock().await;

        let mut rows: Vec<Relationship> = state
            .relationships
            .values()
            .filter(|rel| {
                state
                    .entities
                    .get(&rel.source_id)
                    .is_some_and(|e| e.collection_id == collection_id)
            })
            .filter(|rel| {
                filter
                    .relation_type
                    .as_ref()
                    .is_none_or(|t| rel.relation_type == *t)
            })
            .filter(|rel| {
                filter
                    .min_strength
                    .is_none_or(|min| rel.strength.is_some_and(|s| s >= min))
            })
            .filter(|rel| {
                filter
                    .max_strength
                    .is_none_or(|max| rel.strength.is_some_and(|s| s <= max))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(rows.into_iter().skip(page.offset).take(page.limit).collect())
    }

    async fn list_communities(
        &self,
        collection_id: &str,
        filter: &CommunityFilter,
        page: Page,
    ) -> Result<Vec<Community>> {
        let state = self.state.lock().await;
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());

        let mut rows: Vec<Community> = state
            .communities
            .values()
            .filter(|c| c.collection_id == collection_id)
            .filter(|c| filter.level.is_none_or(|l| c.level == l))
            .filter(|c| {
                needle.as_ref().is_none_or(|n| {
                    c.summary
                        .as_ref()
                        .is_some_and(|s| s.to_lowercase().contains(n))
                })
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.level, c.id));

        Ok(rows.into_iter().skip(page.offset).take(page.limit).collect())
    }
}
