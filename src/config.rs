//! Engine configuration.
//!
//! Layered the same way across deployments: hard defaults, then
//! `GRAPHRAG_`-prefixed environment variables (double-underscore
//! separator, e.g. `GRAPHRAG_SCORING__MENTION_WEIGHT=0.2`).

use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    pub scoring: ScoringConfig,
    pub communities: CommunityConfig,
    pub storage: StorageConfig,
}

/// Chunk-scoring parameters for graph search.
#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    /// Score contributed per entity mention in a chunk.
    pub mention_weight: f32,
}

/// Community summary cache parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct CommunityConfig {
    /// `change_count` at which a summary regenerates even without the
    /// dirty flag.
    pub regen_threshold: i32,
    /// Deepest aggregation level community detection builds.
    pub max_level: u32,
    /// Clustering resolution; higher yields more, smaller communities.
    pub resolution: f64,
}

/// Durable backend parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Postgres connection string; unset when running in-memory only.
    pub database_url: Option<String>,
    /// Connection pool size for the durable backend.
    pub max_connections: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig {
                mention_weight: 0.1,
            },
            communities: CommunityConfig {
                regen_threshold: 10,
                max_level: 2,
                resolution: 1.0,
            },
            storage: StorageConfig {
                database_url: None,
                max_connections: 5,
            },
        }
    }
}

impl GraphConfig {
    /// Load configuration from defaults and environment.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = Config::builder()
            .set_default("scoring.mention_weight", 0.1)?
            .set_default("communities.regen_threshold", 10)?
            .set_default("communities.max_level", 2)?
            .set_default("communities.resolution", 1.0)?
            .set_default("storage.max_connections", 5)?
            .set_default("storage.database_url", None::<String>)?
            .add_source(
                Environment::with_prefix("GRAPHRAG")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = GraphConfig::default();
        assert!((cfg.scoring.mention_weight - 0.1).abs() < f32::EPSILON);
        assert_eq!(cfg.communities.regen_threshold, 10);
        assert!(cfg.storage.database_url.is_none());
    }

    #[test]
    fn test_load_uses_defaults_without_env() {
        let cfg = GraphConfig::load().expect("load should succeed");
        assert_eq!(cfg.storage.max_connections, 5);
    }
}
