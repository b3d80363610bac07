//! Normalization and validation shared by the LLM extraction strategies.

use crate::domain::graph::{
    clamp_strength, ExtractedEntity, ExtractedRelationship, ExtractionResult,
};
use std::collections::HashSet;

/// Strip a surrounding Markdown code fence (``` or ```json) from a model
/// response, if present. Returns the inner text untouched otherwise.
#[must_use]
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Normalize a relationship type to UPPER_SNAKE_CASE: non-alphanumeric
/// runs collapse to a single underscore.
#[must_use]
pub fn normalize_relation_type(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = true;
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_uppercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Apply the shared validation rules to relationships extracted for a
/// known entity set: drop edges whose endpoints are not among the
/// extracted entity names, drop self-referencing edges, and clamp
/// strength into `[1, 10]` when present.
pub(crate) fn validate_relationships(
    relationships: Vec<ExtractedRelationship>,
    entities: &[ExtractedEntity],
) -> Vec<ExtractedRelationship> {
    let known: HashSet<String> = entities.iter().map(|e| e.name.to_lowercase()).collect();

    relationships
        .into_iter()
        .filter_map(|mut rel| {
            let source_key = rel.source.to_lowercase();
            let target_key = rel.target.to_lowercase();

            if !known.contains(&source_key) || !known.contains(&target_key) {
                tracing::debug!(
                    source = %rel.source,
                    target = %rel.target,
                    "dropping relationship with unknown endpoint"
                );
                return None;
            }
            if source_key == target_key {
                tracing::debug!(entity = %rel.source, "dropping self-referencing relationship");
                return None;
            }

            rel.relation_type = normalize_relation_type(&rel.relation_type);
            rel.strength = rel.strength.map(clamp_strength);
            Some(rel)
        })
        .collect()
}

/// Normalize a full extraction result in place: entity types are already
/// parsed leniently at deserialization; relationships get endpoint
/// validation and strength clamping.
pub(crate) fn normalize_result(mut result: ExtractionResult) -> ExtractionResult {
    result.relationships = validate_relationships(result.relationships, &result.entities);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::EntityType;

    fn entity(name: &str) -> ExtractedEntity {
        ExtractedEntity {
            name: name.to_string(),
            entity_type: EntityType::Concept,
            description: None,
        }
    }

    fn rel(source: &str, target: &str, strength: Option<f32>) -> ExtractedRelationship {
        ExtractedRelationship {
            source: source.to_string(),
            target: target.to_string(),
            relation_type: "works at".to_string(),
            description: None,
            strength,
            metadata: None,
        }
    }

    #[test]
    fn test_strip_fence_json_tag() {
        let raw = "```json\n{\"entities\": []}\n```";
        assert_eq!(strip_code_fence(raw), "{\"entities\": []}");
    }

    #[test]
    fn test_strip_fence_bare() {
        let raw = "```\n{}\n```";
        assert_eq!(strip_code_fence(raw), "{}");
    }

    #[test]
    fn test_strip_fence_absent() {
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_normalize_relation_type() {
        assert_eq!(normalize_relation_type("works at"), "WORKS_AT");
        assert_eq!(normalize_relation_type("  is-part--of "), "IS_PART_OF");
        assert_eq!(normalize_relation_type("LEADS"), "LEADS");
        assert_eq!(normalize_relation_type("reports_to!"), "REPORTS_TO");
    }

    #[test]
    fn test_unknown_endpoint_dropped() {
        let entities = vec![entity("Alice"), entity("Acme")];
        let rels = vec![rel("Alice", "Acme", None), rel("Alice", "Nobody", None)];
        let valid = validate_relationships(rels, &entities);
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].target, "Acme");
    }

    #[test]
    fn test_self_loop_dropped_regardless_of_strength() {
        let entities = vec![entity("Alice")];
        let rels = vec![rel("Alice", "alice", Some(9.0))];
        assert!(validate_relationships(rels, &entities).is_empty());
    }

    #[test]
    fn test_strength_clamped_on_validation() {
        let entities = vec![entity("Alice"), entity("Acme")];
        let rels = vec![rel("Alice", "Acme", Some(15.0)), rel("Acme", "Alice", Some(0.0))];
        let valid = validate_relationships(rels, &entities);
        assert_eq!(valid[0].strength, Some(10.0));
        assert_eq!(valid[1].strength, Some(1.0));
    }

    #[test]
    fn test_absent_strength_preserved() {
        let entities = vec![entity("Alice"), entity("Acme")];
        let valid = validate_relationships(vec![rel("Alice", "Acme", None)], &entities);
        assert_eq!(valid[0].strength, None);
    }
}
