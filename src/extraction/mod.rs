//! Entity and Relationship Extraction Strategies
//!
//! Provides the trait interfaces, closure adapters, and LLM-backed
//! implementations for extracting entities and relationships from
//! document chunks. Strategies are selected per call: any concrete
//! implementation or a bare async function of matching arity works.

pub mod llm_graph;
pub mod llm_relations;
mod normalize;

pub use llm_graph::LlmGraphExtractor;
pub use llm_relations::LlmRelationshipExtractor;
pub use normalize::{normalize_relation_type, strip_code_fence};

use crate::domain::graph::{
    EntityType, ExtractedEntity, ExtractedRelationship, ExtractionResult,
};
use crate::error::GraphError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

// =============================================================================
// Extraction Strategy Traits
// =============================================================================

/// Strategy for extracting named entities from text.
#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Extract entities from raw text.
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, GraphError>;

    /// Get the name of this extraction strategy.
    fn name(&self) -> &'static str;
}

/// Strategy for extracting relationships given a pre-extracted entity
/// list (used when entity and relationship extraction are independent
/// passes, e.g. a fast local recognizer feeding an LLM relationship
/// pass).
#[async_trait]
pub trait RelationshipExtractor: Send + Sync {
    /// Extract relationships among the given entities from raw text.
    async fn extract_relationships(
        &self,
        text: &str,
        entities: &[ExtractedEntity],
    ) -> Result<Vec<ExtractedRelationship>, GraphError>;

    /// Get the name of this extraction strategy.
    fn name(&self) -> &'static str;
}

/// Combined strategy extracting entities and relationships in one pass.
#[async_trait]
pub trait GraphExtractor: Send + Sync {
    /// Extract entities and relationships from raw text.
    async fn extract(&self, text: &str) -> Result<ExtractionResult, GraphError>;

    /// Get the name of this extraction strategy.
    fn name(&self) -> &'static str;
}

// =============================================================================
// Closure Adapters
// =============================================================================

/// Adapter turning a bare async function into an [`EntityExtractor`].
#[derive(Clone)]
pub struct FnEntityExtractor {
    f: Arc<
        dyn Fn(String) -> BoxFuture<'static, Result<Vec<ExtractedEntity>, GraphError>>
            + Send
            + Sync,
    >,
}

impl FnEntityExtractor {
    /// Wrap an async closure of matching arity.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<ExtractedEntity>, GraphError>>
            + Send
            + 'static,
    {
        Self {
            f: Arc::new(move |text| Box::pin(f(text))),
        }
    }
}

impl std::fmt::Debug for FnEntityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEntityExtractor").finish_non_exhaustive()
    }
}

#[async_trait]
impl EntityExtractor for FnEntityExtractor {
    async fn extract_entities(&self, text: &str) -> Result<Vec<ExtractedEntity>, GraphError> {
        (self.f)(text.to_string()).await
    }

    fn name(&self) -> &'static str {
        "fn_entity_extractor"
    }
}

/// Adapter turning a bare async function into a [`RelationshipExtractor`].
#[derive(Clone)]
pub struct FnRelationshipExtractor {
    #[allow(clippy::type_complexity)]
    f: Arc<
        dyn Fn(
                String,
                Vec<ExtractedEntity>,
            )
                -> BoxFuture<'static, Result<Vec<ExtractedRelationship>, GraphError>>
            + Send
            + Sync,
    >,
}

impl FnRelationshipExtractor {
    /// Wrap an async closure of matching arity.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String, Vec<ExtractedEntity>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Vec<ExtractedRelationship>, GraphError>>
            + Send
            + 'static,
    {
        Self {
            f: Arc::new(move |text, entities| Box::pin(f(text, entities))),
        }
    }
}

impl std::fmt::Debug for FnRelationshipExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnRelationshipExtractor").finish_non_exhaustive()
    }
}

#[async_trait]
impl RelationshipExtractor for FnRelationshipExtractor {
    async fn extract_relationships(
        &self,
        text: &str,
        entities: &[ExtractedEntity],
    ) -> Result<Vec<ExtractedRelationship>, GraphError> {
        (self.f)(text.to_string(), entities.to_vec()).await
    }

    fn name(&self) -> &'static str {
        "fn_relationship_extractor"
    }
}

// =============================================================================
// Extraction Configuration
// =============================================================================

/// Configuration for LLM-backed extraction strategies.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Entity types to ask for (empty = all known types)
    pub entity_types: Vec<EntityType>,
    /// Maximum entities per chunk
    pub max_entities: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            entity_types: Vec::new(),
            max_entities: 50,
        }
    }
}

impl ExtractionConfig {
    /// The types this configuration targets, defaulting to all.
    pub(crate) fn target_types(&self) -> Vec<EntityType> {
        if self.entity_types.is_empty() {
            EntityType::ALL.to_vec()
        } else {
            self.entity_types.clone()
        }
    }
}
