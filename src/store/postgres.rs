//! Durable Postgres graph store.
//!
//! Persists the four graph relations (entities, relationships, mentions,
//! communities) with pgvector embeddings. The three graph-write calls are
//! independent operations with no enclosing transaction; concurrent
//! writers racing to create the same `(name, collection)` entity resolve
//! benignly to the existing row's id via the upsert.

use super::GraphStore;
use crate::config::GraphConfig;
use crate::domain::graph::{
    clamp_strength, Community, CommunityFilter, Entity, EntityFilter, EntityMention, EntityType,
    ExtractedRelationship, MentionDraft, Page, Relationship, RelationshipFilter, ScoredChunk,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Postgres-backed [`GraphStore`].
#[derive(Debug)]
pub struct PostgresGraphStore {
    pool: PgPool,
    mention_weight: f32,
}

impl PostgresGraphStore {
    /// Connect with default configuration and run migrations.
    pub async fn new(connection_string: &str) -> Result<Self> {
        let mut config = GraphConfig::default();
        config.storage.database_url = Some(connection_string.to_string());
        Self::with_config(&config).await
    }

    /// Connect with the given configuration and run migrations.
    pub async fn with_config(config: &GraphConfig) -> Result<Self> {
        let url = config
            .storage
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow!("storage.database_url is required for the Postgres backend"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.storage.max_connections)
            .connect(url)
            .await?;

        // Run Migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            mention_weight: config.scoring.mention_weight,
        })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

fn entity_from_row(row: &PgRow) -> Result<Entity> {
    let id: Uuid = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    let type_str: String = row.try_get("entity_type")?;
    let description: Option<String> = row.try_get("description")?;
    let embedding: Option<Vector> = row.try_get("embedding")?;
    let collection_id: String = row.try_get("collection_id")?;
    let created_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("created_at")?;

    Ok(Entity {
        id,
        name,
        entity_type: EntityType::from_label(&type_str),
        description,
        embedding: embedding.map(|v| v.to_vec()),
        collection_id,
        created_at: created_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
    })
}

fn relationship_from_row(row: &PgRow) -> Result<Relationship> {
    let created_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("created_at")?;

    Ok(Relationship {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        target_id: row.try_get("target_id")?,
        relation_type: row.try_get("relation_type")?,
        description: row.try_get("description")?,
        strength: row.try_get("strength")?,
        metadata: row.try_get("metadata")?,
        created_at: created_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
    })
}

fn mention_from_row(row: &PgRow) -> Result<EntityMention> {
    Ok(EntityMention {
        id: row.try_get("id")?,
        entity_id: row.try_get("entity_id")?,
        chunk_id: row.try_get("chunk_id")?,
        span_start: row.try_get("span_start")?,
        span_end: row.try_get("span_end")?,
        context: row.try_get("context")?,
    })
}

fn community_from_row(row: &PgRow) -> Result<Community> {
    let level: i32 = row.try_get("level")?;
    let created_at: Option<chrono::DateTime<chrono::Utc>> = row.try_get("created_at")?;

    Ok(Community {
        id: row.try_get("id")?,
        level: level as u32,
        entity_ids: row.try_get("entity_ids")?,
        summary: row.try_get("summary")?,
        dirty: row.try_get("dirty")?,
        change_count: row.try_get("change_count")?,
        collection_id: row.try_get("collection_id")?,
        created_at: created_at.map(|d| d.to_rfc3339()).unwrap_or_default(),
    })
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    async fn persist_entities(
        &self,
        collection_id: &str,
        entities: &[Entity],
    ) -> Result<HashMap<String, Uuid>> {
        let mut name_map = HashMap::with_capacity(entities.len());

        for entity in entities {
            let embedding = entity.embedding.as_ref().map(|e| Vector::from(e.clone()));

            // The no-op DO UPDATE makes RETURNING yield the existing id
            // on conflict; the existing row's content is kept.
            let row = sqlx::query(
                r#"
                INSERT INTO graph_entities (id, name, entity_type, description, embedding, collection_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, NOW())
                ON CONFLICT (collection_id, lower(name)) DO UPDATE SET
                    name = graph_entities.name
                RETURNING id
                "#,
            )
            .bind(entity.id)
            .bind(&entity.name)
            .bind(entity.entity_type.as_str())
            .bind(&entity.description)
            .bind(embedding)
            .bind(collection_id)
            .fetch_one(&self.pool)
            .await?;

            let id: Uuid = row.try_get("id")?;
            name_map.insert(entity.name.to_lowercase(), id);
        }

        Ok(name_map)
    }

    async fn persist_relationships(
        &self,
        relationships: &[ExtractedRelationship],
        name_map: &HashMap<String, Uuid>,
    ) -> Result<usize> {
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

            sqlx::query(
                r#"
                INSERT INTO graph_relationships (id, source_id, target_id, relation_type, description, strength, metadata, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(source_id)
            .bind(target_id)
            .bind(&rel.relation_type)
            .bind(&rel.description)
            .bind(rel.strength.map(clamp_strength))
            .bind(&rel.metadata)
            .execute(&self.pool)
            .await?;
            written += 1;
        }

        Ok(written)
    }

    async fn persist_mentions(
        &self,
        mentions: &[MentionDraft],
        name_map: &HashMap<String, Uuid>,
    ) -> Result<usize> {
        let mut written = 0;

        for mention in mentions {
            let Some(&entity_id) = name_map.get(&mention.entity_name.to_lowercase()) else {
                tracing::debug!(entity = %mention.entity_name, "dropping unresolved mention");
                continue;
            };

            sqlx::query(
                r#"
                INSERT INTO graph_mentions (id, entity_id, chunk_id, span_start, span_end, context)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(entity_id)
            .bind(mention.chunk_id)
            .bind(mention.span_start)
            .bind(mention.span_end)
            .bind(&mention.context)
            .execute(&self.pool)
            .await?;
            written += 1;
        }

        Ok(written)
    }

    async fn search(
        &self,
        entity_names: &[String],
        collections: Option<&[String]>,
    ) -> Result<Vec<ScoredChunk>> {
        let names: Vec<String> = entity_names.iter().map(|n| n.to_lowercase()).collect();
        let collections: Option<Vec<String>> = collections.map(<[String]>::to_vec);

        let rows = sqlx::query(
            r#"
            SELECT m.chunk_id, COUNT(*) AS mention_count
            FROM graph_mentions m
            JOIN graph_entities e ON e.id = m.entity_id
            WHERE lower(e.name) = ANY($1)
              AND ($2::text[] IS NULL OR e.collection_id = ANY($2))
            GROUP BY m.chunk_id
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(&names)
        .bind(&collections)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in rows {
            let chunk_id: Uuid = row.try_get("chunk_id")?;
            let mention_count: i64 = row.try_get("mention_count")?;
            scored.push(ScoredChunk {
                chunk_id,
                mention_count: mention_count as usize,
                score: mention_count as f32 * self.mention_weight,
            });
        }
        Ok(scored)
    }

    async fn find_entities(&self, collection_id: &str) -> Result<Vec<Entity>> {
        let rows = sqlx::query(
            "SELECT id, name, entity_type, description, embedding, collection_id, created_at
             FROM graph_entities WHERE collection_id = $1 ORDER BY name",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    async fn find_related_entities(&self, entity_id: Uuid, depth: u32) -> Result<Vec<Entity>> {
        let origin_exists: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM graph_entities WHERE id = $1")
                .bind(entity_id)
                .fetch_optional(&self.pool)
                .await?;
        if origin_exists.is_none() {
            return Ok(Vec::new());
        }

        // One round trip per hop, expanding the undirected frontier.
        let mut visited: HashSet<Uuid> = HashSet::from([entity_id]);
        let mut frontier: Vec<Uuid> = vec![entity_id];

        for _ in 0..depth {
            if frontier.is_empty() {
                break;
            }
            let rows = sqlx::query(
                "SELECT source_id, target_id FROM graph_relationships
                 WHERE source_id = ANY($1) OR target_id = ANY($1)",
            )
            .bind(&frontier)
            .fetch_all(&self.pool)
            .await?;

            let mut next = Vec::new();
            for row in rows {
                let source: Uuid = row.try_get("source_id")?;
                let target: Uuid = row.try_get("target_id")?;
                for id in [source, target] {
                    if visited.insert(id) {
                        next.push(id);
                    }
                }
            }
            frontier = next;
        }

        let ids: Vec<Uuid> = visited.into_iter().collect();
        let rows = sqlx::query(
            "SELECT id, name, entity_type, description, embedding, collection_id, created_at
             FROM graph_entities WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    async fn find_relationships(&self, entity_ids: &[Uuid]) -> Result<Vec<Relationship>> {
        let ids: Vec<Uuid> = entity_ids.to_vec();
        let rows = sqlx::query(
            "SELECT id, source_id, target_id, relation_type, description, strength, metadata, created_at
             FROM graph_relationships
             WHERE source_id = ANY($1) AND target_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(relationship_from_row).collect()
    }

    async fn persist_communities(
        &self,
        collection_id: &str,
        communities: &[Community],
    ) -> Result<()> {
        // A detection pass replaces the collection's communities wholesale.
        sqlx::query("DELETE FROM graph_communities WHERE collection_id = $1")
            .bind(collection_id)
            .execute(&self.pool)
            .await?;

        for community in communities {
            sqlx::query(
                r#"
                INSERT INTO graph_communities (id, level, entity_ids, summary, dirty, change_count, collection_id, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                "#,
            )
            .bind(community.id)
            .bind(community.level as i32)
            .bind(&community.entity_ids)
            .bind(&community.summary)
            .bind(community.dirty)
            .bind(community.change_count)
            .bind(collection_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn get_community_summaries(&self, collection_id: &str) -> Result<Vec<Community>> {
        let rows = sqlx::query(
            "SELECT id, level, entity_ids, summary, dirty, change_count, collection_id, created_at
             FROM graph_communities WHERE collection_id = $1 ORDER BY level, id",
        )
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(community_from_row).collect()
    }

    async fn mark_communities_changed(
        &self,
        collection_id: &str,
        entity_ids: &[Uuid],
    ) -> Result<usize> {
        let ids: Vec<Uuid> = entity_ids.to_vec();
        let result = sqlx::query(
            "UPDATE graph_communities
             SET change_count = change_count + 1, dirty = TRUE
             WHERE collection_id = $1 AND entity_ids && $2",
        )
        .bind(collection_id)
        .bind(&ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn update_community_summary(&self, community_id: Uuid, summary: &str) -> Result<()> {
        sqlx::query(
            "UPDATE graph_communities
             SET summary = $1, dirty = FALSE, change_count = 0
             WHERE id = $2",
        )
        .bind(summary)
        .bind(community_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_by_chunks(&self, chunk_ids: &[Uuid]) -> Result<()> {
        let chunks: Vec<Uuid> = chunk_ids.to_vec();

        let affected: Vec<Uuid> = sqlx::query_scalar(
            "SELECT DISTINCT entity_id FROM graph_mentions WHERE chunk_id = ANY($1)",
        )
        .bind(&chunks)
        .fetch_all(&self.pool)
        .await?;

        sqlx::query("DELETE FROM graph_mentions WHERE chunk_id = ANY($1)")
            .bind(&chunks)
            .execute(&self.pool)
            .await?;

        // Reap orphans; FK cascades remove their relationships and any
        // remaining mention rows.
        sqlx::query(
            "DELETE FROM graph_entities e
             WHERE e.id = ANY($1)
               AND NOT EXISTS (SELECT 1 FROM graph_mentions m WHERE m.entity_id = e.id)",
        )
        .bind(&affected)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_by_collection(&self, collection_id: &str) -> Result<()> {
        // Entity deletion cascades to relationships and mentions.
        sqlx::query("DELETE FROM graph_entities WHERE collection_id = $1")
            .bind(collection_id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM graph_communities WHERE collection_id = $1")
            .bind(collection_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
        let row = sqlx::query(
            "SELECT id, name, entity_type, description, embedding, collection_id, created_at
             FROM graph_entities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(entity_from_row).transpose()
    }

    async fn get_relationship(&self, id: Uuid) -> Result<Option<Relationship>> {
        let row = sqlx::query(
            "SELECT id, source_id, target_id, relation_type, description, strength, metadata, created_at
             FROM graph_relationships WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(relationship_from_row).transpose()
    }

    async fn get_mentions(&self, entity_id: Uuid) -> Result<Vec<EntityMention>> {
        let rows = sqlx::query(
            "SELECT id, entity_id, chunk_id, span_start, span_end, context
             FROM graph_mentions WHERE entity_id = $1",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(mention_from_row).collect()
    }

    async fn get_community(&self, id: Uuid) -> Result<Option<Community>> {
        let row = sqlx::query(
            "SELECT id, level, entity_ids, summary, dirty, change_count, collection_id, created_at
             FROM graph_communities WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(community_from_row).transpose()
    }

    async fn list_entities(
        &self,
        collection_id: &str,
        filter: &EntityFilter,
        page: Page,
    ) -> Result<Vec<Entity>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, entity_type, description, embedding, collection_id, created_at
            FROM graph_entities
            WHERE collection_id = $1
              AND ($2::text IS NULL OR entity_type = $2)
              AND ($3::text IS NULL OR name ILIKE '%' || $3 || '%')
            ORDER BY name
            OFFSET $4 LIMIT $5
            "#,
        )
        .bind(collection_id)
        .bind(filter.entity_type.map(|t| t.as_str()))
        .bind(&filter.search)
        .bind(page.offset as i64)
        .bind(page.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entity_from_row).collect()
    }

    async fn list_relationships(
        &self,
        collection_id: &str,
        filter: &RelationshipFilter,
        page: Page,
    ) -> Result<Vec<Relationship>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id, r.source_id, r.target_id, r.relation_type, r.description, r.strength, r.metadata, r.created_at
            FROM graph_relationships r
            JOIN graph_entities e ON e.id = r.source_id
            WHERE e.collection_id = $1
              AND ($2::text IS NULL OR r.relation_type = $2)
              AND ($3::real IS NULL OR r.strength >= $3)
              AND ($4::real IS NULL OR r.strength <= $4)
            ORDER BY r.created_at
            OFFSET $5 LIMIT $6
            "#,
        )
        .bind(collection_id)
        .bind(&filter.relation_type)
        .bind(filter.min_strength)
        .bind(filter.max_strength)
        .bind(page.offset as i64)
        .bind(page.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(relationship_from_row).collect()
    }

    async fn list_communities(
        &self,
        collection_id: &str,
        filter: &CommunityFilter,
        page: Page,
    ) -> Result<Vec<Community>> {
        let rows = sqlx::query(
            r#"
            SELECT id, level, entity_ids, summary, dirty, change_count, collection_id, created_at
            FROM graph_communities
            WHERE collection_id = $1
              AND ($2::int IS NULL OR level = $2)
              AND ($3::text IS NULL OR summary ILIKE '%' || $3 || '%')
            ORDER BY level, id
            OFFSET $4 LIMIT $5
            "#,
        )
        .bind(collection_id)
        .bind(filter.level.map(|l| l as i32))
        .bind(&filter.search)
        .bind(page.offset as i64)
        .bind(page.limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(community_from_row).collect()
    }
}
