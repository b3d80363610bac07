//! In-memory, read-only query layer over a materialized graph snapshot.
//!
//! The snapshot holds entities and relationships in flat, id-indexed
//! collections and operates on ids throughout; traversal treats the
//! directed relationship rows as undirected for reachability.

use crate::domain::graph::{Community, Entity, EntityMention, Relationship, TextChunk};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

/// An adjacency-indexed snapshot of a knowledge graph.
#[derive(Debug, Default)]
pub struct QueryGraph {
    entities: HashMap<Uuid, Entity>,
    relationships: Vec<Relationship>,
    adjacency: HashMap<Uuid, Vec<Uuid>>,
    chunks: HashMap<Uuid, TextChunk>,
    entity_chunks: HashMap<Uuid, Vec<Uuid>>,
    chunk_entities: HashMap<Uuid, Vec<Uuid>>,
    communities: Vec<Community>,
}

impl QueryGraph {
    /// Assemble a snapshot from flat collections. Mentions drive the
    /// bidirectional chunk↔entity indices.
    #[must_use]
    pub fn build(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
        chunks: Vec<TextChunk>,
        mentions: Vec<EntityMention>,
        communities: Vec<Community>,
    ) -> Self {
        let entities: HashMap<Uuid, Entity> = entities.into_iter().map(|e| (e.id, e)).collect();
        let chunks: HashMap<Uuid, TextChunk> = chunks.into_iter().map(|c| (c.id, c)).collect();

        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for rel in &relationships {
            adjacency.entry(rel.source_id).or_default().push(rel.target_id);
            adjacency.entry(rel.target_id).or_default().push(rel.source_id);
        }

        let mut entity_chunks: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut chunk_entities: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for mention in &mentions {
            entity_chunks
                .entry(mention.entity_id)
                .or_default()
                .push(mention.chunk_id);
            chunk_entities
                .entry(mention.chunk_id)
                .or_default()
                .push(mention.entity_id);
        }

        Self {
            entities,
            relationships,
            adjacency,
            chunks,
            entity_chunks,
            chunk_entities,
            communities,
        }
    }

    /// Number of entities in the snapshot.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// All relationships in the snapshot.
    #[must_use]
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Look up an entity by id.
    #[must_use]
    pub fn entity(&self, id: Uuid) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Entities mentioned in a chunk.
    #[must_use]
    pub fn entities_in_chunk(&self, chunk_id: Uuid) -> Vec<&Entity> {
        self.chunk_entities
            .get(&chunk_id)
            .map(|ids| ids.iter().filter_map(|id| self.entities.get(id)).collect())
            .unwrap_or_default()
    }

    /// Find entities by name. Case-insensitive exact match by default;
    /// `fuzzy` matches case-insensitive substrings.
    #[must_use]
    pub fn find_entities_by_name(&self, name: &str, fuzzy: bool) -> Vec<&Entity> {
        let needle = name.to_lowercase();
        self.entities
            .values()
            .filter(|e| {
                let candidate = e.name.to_lowercase();
                if fuzzy {
                    candidate.contains(&needle)
                } else {
                    candidate == needle
                }
            })
            .collect()
    }

    /// Rank entities by cosine similarity against a query vector.
    /// Entities without embeddings are skipped; `min_similarity` floors
    /// the result when given; at most `top_k` entities return.
    #[must_use]
    pub fn find_entities_by_embedding(
        &self,
        query: &[f32],
        top_k: usize,
        min_similarity: Option<f32>,
    ) -> Vec<(&Entity, f32)> {
        let mut scored: Vec<(&Entity, f32)> = self
            .entities
            .values()
            .filter_map(|e| {
                let embedding = e.embedding.as_ref()?;
                let score = cosine_similarity(embedding, query);
                if let Some(min) = min_similarity {
                    if score < min {
                        return None;
                    }
                }
                Some((e, score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    /// BFS over the relationship adjacency, undirected, bounded to
    /// `depth` hops. Excludes the origin; unknown origin yields an empty
    /// result. Reachable sets never shrink as `depth` grows.
    #[must_use]
    pub fn traverse(&self, entity_id: Uuid, depth: u32) -> Vec<&Entity> {
        if !self.entities.contains_key(&entity_id) {
            return Vec::new();
        }

        let mut visited: HashSet<Uuid> = HashSet::from([entity_id]);
        let mut queue: VecDeque<(Uuid, u32)> = VecDeque::from([(entity_id, 0)]);
        let mut found = Vec::new();

        while let Some((current, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            let Some(neighbors) = self.adjacency.get(&current) else {
                continue;
            };
            for &next in neighbors {
                if visited.insert(next) {
                    if let Some(entity) = self.entities.get(&next) {
                        found.push(entity);
                    }
                    queue.push_back((next, dist + 1));
                }
            }
        }

        found
    }

    /// Deduplicated union of chunks referencing any of the given entities.
    #[must_use]
    pub fn chunks_for_entities(&self, entity_ids: &[Uuid]) -> Vec<&TextChunk> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for entity_id in entity_ids {
            let Some(chunk_ids) = self.entity_chunks.get(entity_id) else {
                continue;
            };
            for chunk_id in chunk_ids {
                if seen.insert(*chunk_id) {
                    if let Some(chunk) = self.chunks.get(chunk_id) {
                        out.push(chunk);
                    }
                }
            }
        }

        out
    }

    /// Communities filtered by hierarchy level and/or membership.
    #[must_use]
    pub fn community_summaries(
        &self,
        level: Option<u32>,
        entity_id: Option<Uuid>,
    ) -> Vec<&Community> {
        self.communities
            .iter()
            .filter(|c| level.is_none_or(|l| c.level == l))
            .filter(|c| entity_id.is_none_or(|id| c.entity_ids.contains(&id)))
            .collect()
    }
}

/// Cosine similarity between two vectors; zero when either norm is zero.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::EntityType;

    fn entity(name: &str) -> Entity {
        Entity::new(name, EntityType::Person)
    }

    fn edge(source: Uuid, target: Uuid, strength: f32) -> Relationship {
        Relationship {
            id: Uuid::new_v4(),
            source_id: source,
            target_id: target,
            relation_type: "RELATED_TO".to_string(),
            description: None,
            strength: Some(strength),
            metadata: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A–B–C chain with strong edges.
    fn chain() -> (QueryGraph, Uuid, Uuid, Uuid) {
        let a = entity("A");
        let b = entity("B");
        let c = entity("C");
        let (ida, idb, idc) = (a.id, b.id, c.id);
        let graph = QueryGraph::build(
            vec![a, b, c],
            vec![edge(ida, idb, 10.0), edge(idb, idc, 10.0)],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        (graph, ida, idb, idc)
    }

    #[test]
    fn test_traverse_depth_bounds() {
        let (graph, a, b, c) = chain();

        assert!(graph.traverse(a, 0).is_empty());

        let one_hop: Vec<Uuid> = graph.traverse(a, 1).iter().map(|e| e.id).collect();
        assert_eq!(one_hop, vec![b]);

        let two_hop: HashSet<Uuid> = graph.traverse(a, 2).iter().map(|e| e.id).collect();
        assert_eq!(two_hop, HashSet::from([b, c]));
    }

    #[test]
    fn test_traverse_monotone_in_depth() {
        let (graph, a, _, _) = chain();
        let mut previous: HashSet<Uuid> = HashSet::new();
        for depth in 0..5 {
            let current: HashSet<Uuid> =
                graph.traverse(a, depth).iter().map(|e| e.id).collect();
            assert!(previous.is_subset(&current), "shrank at depth {depth}");
            previous = current;
        }
    }

    #[test]
    fn test_traverse_is_undirected() {
        let (graph, a, _, c) = chain();
        // C reaches A against edge direction.
        let from_c: HashSet<Uuid> = graph.traverse(c, 2).iter().map(|e| e.id).collect();
        assert!(from_c.contains(&a));
    }

    #[test]
    fn test_traverse_unknown_origin() {
        let (graph, _, _, _) = chain();
        assert!(graph.traverse(Uuid::new_v4(), 3).is_empty());
    }

    #[test]
    fn test_find_by_name_exact_and_fuzzy() {
        let mut anna = entity("Anna Karenina");
        anna.description = Some("character".to_string());
        let graph = QueryGraph::build(
            vec![anna, entity("Anna")],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );

        assert_eq!(graph.find_entities_by_name("ANNA", false).len(), 1);
        assert_eq!(graph.find_entities_by_name("anna", true).len(), 2);
        assert!(graph.find_entities_by_name("bob", true).is_empty());
    }

    #[test]
    fn test_find_by_embedding_ranked_and_floored() {
        let mut close = entity("close");
        close.embedding = Some(vec![1.0, 0.0]);
        let mut far = entity("far");
        far.embedding = Some(vec![0.0, 1.0]);
        let no_embedding = entity("none");

        let graph = QueryGraph::build(
            vec![close, far, no_embedding],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );

        let hits = graph.find_entities_by_embedding(&[1.0, 0.0], 10, None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.name, "close");

        let floored = graph.find_entities_by_embedding(&[1.0, 0.0], 10, Some(0.5));
        assert_eq!(floored.len(), 1);

        let capped = graph.find_entities_by_embedding(&[1.0, 0.0], 1, None);
        assert_eq!(capped.len(), 1);
    }

    #[test]
    fn test_chunks_for_entities_dedups() {
        let alice = entity("Alice");
        let bob = entity("Bob");
        let chunk = TextChunk::new("Alice and Bob");
        let mentions = vec![
            EntityMention {
                id: Uuid::new_v4(),
                entity_id: alice.id,
                chunk_id: chunk.id,
                span_start: None,
                span_end: None,
                context: None,
            },
            EntityMention {
                id: Uuid::new_v4(),
                entity_id: bob.id,
                chunk_id: chunk.id,
                span_start: None,
                span_end: None,
                context: None,
            },
        ];
        let ids = vec![alice.id, bob.id];
        let graph = QueryGraph::build(
            vec![alice, bob],
            Vec::new(),
            vec![chunk],
            mentions,
            Vec::new(),
        );

        assert_eq!(graph.chunks_for_entities(&ids).len(), 1);
    }

    #[test]
    fn test_community_filters() {
        let alice = entity("Alice");
        let alice_id = alice.id;
        let communities = vec![
            Community {
                id: Uuid::new_v4(),
                level: 0,
                entity_ids: vec![alice_id],
                summary: Some("fine".to_string()),
                dirty: false,
                change_count: 0,
                collection_id: "c".to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
            Community {
                id: Uuid::new_v4(),
                level: 1,
                entity_ids: Vec::new(),
                summary: Some("coarse".to_string()),
                dirty: false,
                change_count: 0,
                collection_id: "c".to_string(),
                created_at: chrono::Utc::now().to_rfc3339(),
            },
        ];
        let graph = QueryGraph::build(
            vec![alice],
            Vec::new(),
            Vec::new(),
            Vec::new(),
            communities,
        );

        assert_eq!(graph.community_summaries(None, None).len(), 2);
        assert_eq!(graph.community_summaries(Some(1), None).len(), 1);
        assert_eq!(graph.community_summaries(None, Some(alice_id)).len(), 1);
        assert_eq!(
            graph.community_summaries(Some(1), Some(alice_id)).len(),
            0
        );
    }
}
