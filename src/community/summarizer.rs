//! Community summarization with change-tracked caching.
//!
//! A summary is regenerated when the community is dirty, has never been
//! summarized, or has accumulated `regen_threshold` graph mutations
//! since the last generation. Everything else serves the cached text.

use crate::config::GraphConfig;
use crate::domain::graph::{Community, Entity, Relationship};
use crate::error::GraphError;
use crate::llm::CompletionProvider;
use crate::store::GraphStore;
use anyhow::Result;
use std::collections::HashMap;
use uuid::Uuid;

/// Generates and refreshes community summaries.
#[derive(Debug, Clone)]
pub struct CommunitySummarizer {
    regen_threshold: i32,
}

impl Default for CommunitySummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommunitySummarizer {
    /// Create a summarizer with the default regeneration threshold.
    pub fn new() -> Self {
        Self {
            regen_threshold: GraphConfig::default().communities.regen_threshold,
        }
    }

    /// Derive the regeneration threshold from engine configuration.
    pub fn with_config(config: &GraphConfig) -> Self {
        Self {
            regen_threshold: config.communities.regen_threshold,
        }
    }

    /// Whether the cached summary is stale under this summarizer's
    /// threshold.
    pub fn needs_regeneration(&self, community: &Community) -> bool {
        Self::needs_regeneration_with(community, self.regen_threshold)
    }

    /// The staleness predicate with an explicit threshold.
    pub fn needs_regeneration_with(community: &Community, threshold: i32) -> bool {
        community.dirty || community.summary.is_none() || community.change_count >= threshold
    }

    /// Clear the dirty flag and mutation counter on an in-memory
    /// community after its summary was refreshed.
    pub fn reset_change_tracking(community: &mut Community) {
        community.dirty = false;
        community.change_count = 0;
    }

    /// Build the summarization prompt from a community's subgraph.
    fn build_prompt(&self, entities: &[Entity], relationships: &[Relationship]) -> String {
        let mut prompt = String::from(
            "Summarize the following group of related entities and their \
             relationships in a short paragraph. Describe what connects them \
             and what the group is about. Respond with the summary text only.\n\n\
             Entities:\n",
        );

        for entity in entities {
            prompt.push_str(&format!("- {} ({})", entity.name, entity.entity_type.as_str()));
            if let Some(description) = &entity.description {
                prompt.push_str(&format!(": {description}"));
            }
            prompt.push('\n');
        }

        let names: HashMap<Uuid, &str> = entities
            .iter()
            .map(|e| (e.id, e.name.as_str()))
            .collect();

        prompt.push_str("\nRelationships:\n");
        for rel in relationships {
            let (Some(source), Some(target)) =
                (names.get(&rel.source_id), names.get(&rel.target_id))
            else {
                continue;
            };
            prompt.push_str(&format!("- {source} {} {target}", rel.relation_type));
            if let Some(description) = &rel.description {
                prompt.push_str(&format!(": {description}"));
            }
            prompt.push('\n');
        }

        prompt
    }

    /// Generate a fresh summary for a community subgraph.
    pub async fn summarize(
        &self,
        entities: &[Entity],
        relationships: &[Relationship],
        provider: &dyn CompletionProvider,
    ) -> Result<String, GraphError> {
        let prompt = self.build_prompt(entities, relationships);
        let response = provider.complete(&prompt).await?;
        Ok(response.trim().to_string())
    }

    /// Batch pass: regenerate every stale community summary in a
    /// collection and persist it (which also resets the stored change
    /// tracking). Returns the number regenerated.
    pub async fn regenerate_stale(
        &self,
        store: &dyn GraphStore,
        collection_id: &str,
        provider: &dyn CompletionProvider,
    ) -> Result<usize> {
        let communities = store.get_community_summaries(collection_id).await?;
        let entities = store.find_entities(collection_id).await?;
        let by_id: HashMap<Uuid, &Entity> = entities.iter().map(|e| (e.id, e)).collect();

        let mut regenerated = 0;
        for community in &communities {
            if !self.needs_regeneration(community) {
                continue;
            }

            let members: Vec<Entity> = community
                .entity_ids
                .iter()
                .filter_map(|id| by_id.get(id).map(|&e| e.clone()))
                .collect();
            let relationships = store.find_relationships(&community.entity_ids).await?;

            let summary = self.summarize(&members, &relationships, provider).await?;
            store.update_community_summary(community.id, &summary).await?;
            regenerated += 1;

            tracing::debug!(
                community = %community.id,
                level = community.level,
                "community summary regenerated"
            );
        }

        if regenerated > 0 {
            tracing::info!(
                collection = collection_id,
                regenerated,
                total = communities.len(),
                "summary regeneration pass complete"
            );
        }

        Ok(regenerated)
    }
}
