//! Hierarchical Community Detection
//!
//! Groups densely connected entities into communities with a
//! Leiden-style modularity optimization: local moving of nodes over a
//! petgraph representation, then aggregation of communities into
//! super-nodes for the next hierarchy level. Level 0 is the finest
//! partition; each higher level merges connected lower-level
//! communities, up to `max_level`.

use crate::config::GraphConfig;
use crate::domain::graph::Relationship;
use crate::error::GraphError;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Detector Contract
// =============================================================================

/// Parameters for community detection.
#[derive(Debug, Clone)]
pub struct DetectorOptions {
    /// Resolution parameter (higher = more, smaller communities).
    pub resolution: f64,
    /// Deepest hierarchy level to build; level 0 always exists.
    pub max_level: u32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_level: 2,
        }
    }
}

impl DetectorOptions {
    /// Derive options from engine configuration.
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            resolution: config.communities.resolution,
            max_level: config.communities.max_level,
        }
    }
}

/// One detected community: a set of entity ids at a hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedCommunity {
    pub level: u32,
    pub entity_ids: Vec<Uuid>,
}

/// Strategy for partitioning a graph into communities.
pub trait CommunityDetector: Send + Sync + std::fmt::Debug {
    /// Partition the given entities using the relationship edges.
    /// Relationships with endpoints outside `entity_ids` are ignored.
    fn detect(
        &self,
        entity_ids: &[Uuid],
        relationships: &[Relationship],
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedCommunity>, GraphError>;

    /// Get the name of this detection strategy.
    fn name(&self) -> &'static str;
}

/// Adapter turning a bare function into a [`CommunityDetector`].
#[derive(Clone)]
pub struct FnCommunityDetector {
    #[allow(clippy::type_complexity)]
    f: Arc<
        dyn Fn(
                &[Uuid],
                &[Relationship],
                &DetectorOptions,
            ) -> Result<Vec<DetectedCommunity>, GraphError>
            + Send
            + Sync,
    >,
}

impl FnCommunityDetector {
    /// Wrap a function of matching arity.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(
                &[Uuid],
                &[Relationship],
                &DetectorOptions,
            ) -> Result<Vec<DetectedCommunity>, GraphError>
            + Send
            + Sync
            + 'static,
    {
        Self { f: Arc::new(f) }
    }
}

impl std::fmt::Debug for FnCommunityDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnCommunityDetector").finish_non_exhaustive()
    }
}

impl CommunityDetector for FnCommunityDetector {
    fn detect(
        &self,
        entity_ids: &[Uuid],
        relationships: &[Relationship],
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedCommunity>, GraphError> {
        (self.f)(entity_ids, relationships, options)
    }

    fn name(&self) -> &'static str {
        "fn_community_detector"
    }
}

// =============================================================================
// Leiden-Style Detector
// =============================================================================

/// Modularity-based hierarchical community detector.
#[derive(Debug, Default)]
pub struct LeidenDetector;

impl LeidenDetector {
    pub fn new() -> Self {
        Self
    }

    /// Build the level-0 graph: one node per entity, edges merged across
    /// parallel relationships, weight defaulting to 1.0 when strength is
    /// absent. Self-loops and unknown endpoints never enter the graph.
    fn build_graph(
        &self,
        entity_ids: &[Uuid],
        relationships: &[Relationship],
    ) -> (UnGraph<Uuid, f64>, Vec<Uuid>) {
        let mut graph = UnGraph::new_undirected();
        let mut id_to_node: HashMap<Uuid, NodeIndex> = HashMap::new();
        let mut ordered = Vec::new();

        for &id in entity_ids {
            if !id_to_node.contains_key(&id) {
                let node = graph.add_node(id);
                id_to_node.insert(id, node);
                ordered.push(id);
            }
        }

        for rel in relationships {
            if rel.source_id == rel.target_id {
                continue;
            }
            let (Some(&source), Some(&target)) = (
                id_to_node.get(&rel.source_id),
                id_to_node.get(&rel.target_id),
            ) else {
                continue;
            };
            let weight = f64::from(rel.strength.unwrap_or(1.0));
            match graph.find_edge(source, target) {
                Some(edge) => graph[edge] += weight,
                None => {
                    graph.add_edge(source, target, weight);
                }
            }
        }

        (graph, ordered)
    }
}

impl CommunityDetector for LeidenDetector {
    fn detect(
        &self,
        entity_ids: &[Uuid],
        relationships: &[Relationship],
        options: &DetectorOptions,
    ) -> Result<Vec<DetectedCommunity>, GraphError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        if options.resolution <= 0.0 {
            return Err(GraphError::Detector(format!(
                "resolution must be positive, got {}",
                options.resolution
            )));
        }

        let (graph, ordered) = self.build_graph(entity_ids, relationships);

        let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); ordered.len()];
        for edge in graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            adjacency[a].push((b, *edge.weight()));
            adjacency[b].push((a, *edge.weight()));
        }
        let mut self_loops = vec![0.0; ordered.len()];

        let mut result = Vec::new();

        // Level 0: local moving over the entity graph.
        let mut assignment = local_move(&adjacency, &self_loops, options.resolution);
        let mut membership = assignment.clone();
        let mut community_count = count_communities(&assignment);
        push_level(&mut result, 0, &membership, &ordered);

        // Higher levels: aggregate communities into super-nodes and rerun
        // until the partition stops changing.
        for level in 1..=options.max_level {
            if community_count <= 1 {
                break;
            }
            let (agg_adjacency, agg_self_loops) =
                aggregate(&adjacency, &self_loops, &assignment, community_count);
            let next = local_move(&agg_adjacency, &agg_self_loops, options.resolution);
            let next_count = count_communities(&next);
            if next_count == community_count {
                break;
            }

            for slot in membership.iter_mut() {
                *slot = next[*slot];
            }
            push_level(&mut result, level, &membership, &ordered);

            adjacency = agg_adjacency;
            self_loops = agg_self_loops;
            assignment = next;
            community_count = next_count;
        }

        tracing::info!(
            communities = result.len(),
            entities = ordered.len(),
            "community detection complete"
        );

        Ok(result)
    }

    fn name(&self) -> &'static str {
        "leiden"
    }
}

// =============================================================================
// Partition Mechanics
// =============================================================================

/// One round of modularity local moving. Returns a dense community
/// assignment per node. The gain of placing node `n` into community `B`
/// is `w(n, B) - resolution * k_n * K_B / 2m`; a node moves only when
/// some community beats staying put.
fn local_move(adjacency: &[Vec<(usize, f64)>], self_loops: &[f64], resolution: f64) -> Vec<usize> {
    let n = adjacency.len();
    let mut assignment: Vec<usize> = (0..n).collect();

    let degrees: Vec<f64> = (0..n)
        .map(|v| {
            adjacency[v].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self_loops[v]
        })
        .collect();
    let two_m: f64 = degrees.iter().sum();
    if two_m == 0.0 {
        return assignment;
    }

    let mut community_degrees = degrees.clone();
    let mut moved = true;
    while moved {
        moved = false;
        for node in 0..n {
            let current = assignment[node];

            // BTreeMap keeps candidate order deterministic across runs.
            let mut weight_to: BTreeMap<usize, f64> = BTreeMap::new();
            for &(neighbor, weight) in &adjacency[node] {
                *weight_to.entry(assignment[neighbor]).or_insert(0.0) += weight;
            }

            community_degrees[current] -= degrees[node];
            let mut best = current;
            let mut best_gain = weight_to.get(&current).copied().unwrap_or(0.0)
                - resolution * degrees[node] * community_degrees[current] / two_m;

            for (&candidate, &weight) in &weight_to {
                if candidate == current {
                    continue;
                }
                let gain =
                    weight - resolution * degrees[node] * community_degrees[candidate] / two_m;
                if gain > best_gain + 1e-12 {
                    best_gain = gain;
                    best = candidate;
                }
            }

            community_degrees[best] += degrees[node];
            if best != current {
                assignment[node] = best;
                moved = true;
            }
        }
    }

    renumber(assignment)
}

/// Relabel communities to dense indices in order of first appearance.
fn renumber(assignment: Vec<usize>) -> Vec<usize> {
    let mut labels: HashMap<usize, usize> = HashMap::new();
    assignment
        .into_iter()
        .map(|label| {
            let next = labels.len();
            *labels.entry(label).or_insert(next)
        })
        .collect()
}

fn count_communities(assignment: &[usize]) -> usize {
    assignment.iter().max().map_or(0, |&m| m + 1)
}

/// Collapse each community into a super-node. Intra-community edge
/// weight (and carried self-loops) becomes the super-node's self-loop;
/// inter-community weight is summed onto a single edge.
fn aggregate(
    adjacency: &[Vec<(usize, f64)>],
    self_loops: &[f64],
    assignment: &[usize],
    community_count: usize,
) -> (Vec<Vec<(usize, f64)>>, Vec<f64>) {
    let mut agg_self_loops = vec![0.0; community_count];
    let mut between: HashMap<(usize, usize), f64> = HashMap::new();

    for (node, neighbors) in adjacency.iter().enumerate() {
        agg_self_loops[assignment[node]] += self_loops[node];
        for &(neighbor, weight) in neighbors {
            // Each undirected edge appears twice in the adjacency lists;
            // take it once.
            if neighbor <= node {
                continue;
            }
            let (a, b) = (assignment[node], assignment[neighbor]);
            if a == b {
                agg_self_loops[a] += weight;
            } else {
                *between.entry((a.min(b), a.max(b))).or_insert(0.0) += weight;
            }
        }
    }

    let mut agg_adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); community_count];
    for ((a, b), weight) in between {
        agg_adjacency[a].push((b, weight));
        agg_adjacency[b].push((a, weight));
    }

    (agg_adjacency, agg_self_loops)
}

/// Group entities by membership and append one [`DetectedCommunity`]
/// per group for the given level.
fn push_level(
    result: &mut Vec<DetectedCommunity>,
    level: u32,
    membership: &[usize],
    ordered: &[Uuid],
) {
    let mut groups: BTreeMap<usize, Vec<Uuid>> = BTreeMap::new();
    for (index, &community) in membership.iter().enumerate() {
        groups.entry(community).or_default().push(ordered[index]);
    }
    result.extend(groups.into_values().map(|entity_ids| DetectedCommunity {
        level,
        entity_ids,
    }));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: Uuid, target: Uuid, strength: Option<f32>) -> Relationship {
        Relationship {
            id: Uuid::new_v4(),
            source_id: source,
            target_id: target,
            relation_type: "RELATED_TO".to_string(),
            description: None,
            strength,
            metadata: None,
            created_at: String::new(),
        }
    }

    fn clique(ids: &[Uuid]) -> Vec<Relationship> {
        let mut edges = Vec::new();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                edges.push(edge(ids[i], ids[j], Some(1.0)));
            }
        }
        edges
    }

    #[test]
    fn test_empty_graph() {
        let detector = LeidenDetector::new();
        let result = detector
            .detect(&[], &[], &DetectorOptions::default())
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_single_entity_is_singleton() {
        let detector = LeidenDetector::new();
        let id = Uuid::new_v4();
        let result = detector
            .detect(&[id], &[], &DetectorOptions::default())
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].level, 0);
        assert_eq!(result[0].entity_ids, vec![id]);
    }

    #[test]
    fn test_isolated_entities_stay_singletons() {
        let detector = LeidenDetector::new();
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let result = detector
            .detect(&ids, &[], &DetectorOptions::default())
            .unwrap();
        assert_eq!(result.len(), 3);
        assert!(result.iter().all(|c| c.level == 0 && c.entity_ids.len() == 1));
    }

    #[test]
    fn test_two_cliques_stay_separate() {
        let detector = LeidenDetector::new();
        let left: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let right: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let ids: Vec<Uuid> = left.iter().chain(right.iter()).copied().collect();

        let mut edges = clique(&left);
        edges.extend(clique(&right));
        edges.push(edge(left[0], right[0], Some(1.0)));

        let result = detector
            .detect(&ids, &edges, &DetectorOptions::default())
            .unwrap();

        let level0: Vec<_> = result.iter().filter(|c| c.level == 0).collect();
        assert_eq!(level0.len(), 2);
        for community in level0 {
            assert_eq!(community.entity_ids.len(), 4);
            let in_left = community.entity_ids.iter().all(|id| left.contains(id));
            let in_right = community.entity_ids.iter().all(|id| right.contains(id));
            assert!(in_left || in_right, "community mixes the two cliques");
        }
    }

    #[test]
    fn test_low_resolution_merges_at_higher_level() {
        let detector = LeidenDetector::new();
        let left: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let right: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        let ids: Vec<Uuid> = left.iter().chain(right.iter()).copied().collect();

        let mut edges = clique(&left);
        edges.extend(clique(&right));
        edges.push(edge(left[0], right[0], Some(1.0)));

        let options = DetectorOptions {
            resolution: 0.01,
            max_level: 2,
        };
        let result = detector.detect(&ids, &edges, &options).unwrap();

        let level1: Vec<_> = result.iter().filter(|c| c.level == 1).collect();
        assert_eq!(level1.len(), 1);
        assert_eq!(level1[0].entity_ids.len(), 8);
    }

    #[test]
    fn test_unknown_endpoints_ignored() {
        let detector = LeidenDetector::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let edges = vec![edge(a, b, None), edge(a, stranger, Some(5.0))];
        let result = detector
            .detect(&[a, b], &edges, &DetectorOptions::default())
            .unwrap();

        let members: usize = result.iter().map(|c| c.entity_ids.len()).sum();
        assert_eq!(members, 2);
        assert!(result
            .iter()
            .all(|c| !c.entity_ids.contains(&stranger)));
    }

    #[test]
    fn test_non_positive_resolution_rejected() {
        let detector = LeidenDetector::new();
        let options = DetectorOptions {
            resolution: 0.0,
            max_level: 1,
        };
        let err = detector
            .detect(&[Uuid::new_v4()], &[], &options)
            .unwrap_err();
        assert!(matches!(err, GraphError::Detector(_)));
    }

    #[test]
    fn test_fn_adapter_dispatches() {
        let detector = FnCommunityDetector::new(|ids, _rels, _opts| {
            Ok(vec![DetectedCommunity {
                level: 0,
                entity_ids: ids.to_vec(),
            }])
        });
        let id = Uuid::new_v4();
        let result = detector
            .detect(&[id], &[], &DetectorOptions::default())
            .unwrap();
        assert_eq!(result[0].entity_ids, vec![id]);
        assert_eq!(detector.name(), "fn_community_detector");
    }
}
