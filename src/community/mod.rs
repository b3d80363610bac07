//! Community detection and summarization over the knowledge graph.
//!
//! Detection groups densely connected entities into hierarchical
//! communities; summarization turns each community's subgraph into a
//! cached natural-language summary with change tracking deciding when
//! the cache goes stale.

pub mod detector;
pub mod summarizer;

pub use detector::{
    CommunityDetector, DetectedCommunity, DetectorOptions, FnCommunityDetector, LeidenDetector,
};
pub use summarizer::CommunitySummarizer;

use crate::domain::graph::Community;
use uuid::Uuid;

/// Materialize detector output into storable [`Community`] rows for a
/// collection. Fresh communities start with no summary and clean change
/// tracking.
pub fn into_communities(detected: Vec<DetectedCommunity>, collection_id: &str) -> Vec<Community> {
    detected
        .into_iter()
        .map(|d| Community {
            id: Uuid::new_v4(),
            level: d.level,
            entity_ids: d.entity_ids,
            summary: None,
            dirty: false,
            change_count: 0,
            collection_id: collection_id.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::domain::graph::{Entity, EntityType, ExtractedRelationship};
    use crate::llm::CompletionFn;
    use crate::store::{GraphStore, InMemoryGraphStore};

    fn draft(source: &str, target: &str) -> ExtractedRelationship {
        ExtractedRelationship {
            source: source.to_string(),
            target: target.to_string(),
            relation_type: "KNOWS".to_string(),
            description: None,
            strength: Some(5.0),
            metadata: None,
        }
    }

    /// Detection output flows through `into_communities` into a store and
    /// comes back summarized: the full detect → persist → summarize path.
    #[tokio::test]
    async fn test_detection_to_summarization_pipeline() {
        let store = InMemoryGraphStore::new();
        let entities = vec![
            Entity::new("Alice", EntityType::Person),
            Entity::new("Bob", EntityType::Person),
        ];
        let name_map = store.persist_entities("col", &entities).await.unwrap();
        store
            .persist_relationships(&[draft("Alice", "Bob")], &name_map)
            .await
            .unwrap();

        let ids: Vec<Uuid> = name_map.values().copied().collect();
        let relationships = store.find_relationships(&ids).await.unwrap();

        let config = GraphConfig::default();
        let options = DetectorOptions::from_config(&config);
        let detected = LeidenDetector::new()
            .detect(&ids, &relationships, &options)
            .unwrap();
        // One connected pair merges into a single level-0 community.
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].entity_ids.len(), 2);

        let communities = into_communities(detected, "col");
        assert!(communities.iter().all(|c| {
            c.summary.is_none() && !c.dirty && c.change_count == 0 && c.collection_id == "col"
        }));
        store
            .persist_communities("col", &communities)
            .await
            .unwrap();

        let provider = CompletionFn::new(|prompt: String| async move {
            assert!(prompt.contains("Alice"));
            assert!(prompt.contains("KNOWS"));
            Ok("Two acquainted people.".to_string())
        });
        let summarizer = CommunitySummarizer::with_config(&config);
        let regenerated = summarizer
            .regenerate_stale(&store, "col", &provider)
            .await
            .unwrap();
        assert_eq!(regenerated, 1);

        let summaries = store.get_community_summaries("col").await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].summary.as_deref(),
            Some("Two acquainted people.")
        );
        assert!(!summaries[0].dirty);
    }

    #[test]
    fn test_detector_options_follow_config() {
        let mut config = GraphConfig::default();
        config.communities.resolution = 2.5;
        config.communities.max_level = 4;

        let options = DetectorOptions::from_config(&config);
        assert!((options.resolution - 2.5).abs() < f64::EPSILON);
        assert_eq!(options.max_level, 4);
    }
}
