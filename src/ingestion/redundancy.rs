//! Redundant location pruning
//!
//! Place trees are walked from several directions, so a twin can end up
//! located in (or part of) its building, its level and its room at once.
//! Only the most specific links are kept.

use indexmap::IndexMap;
use tracing::debug;

use super::vocabulary::{relationship_types, BUILDING_MODEL_ID, LEVEL_MODEL_ID, ZONE_MODEL_ID};
use crate::ontology::TargetModelSet;
use crate::value_objects::{Relationship, Twin};

/// Drop redundant `isLocatedIn` / `isPartOf` links; returns how many were removed
///
/// For a twin with two or more links of one kind, building and level links
/// are dropped when a link to a more specific place exists, and building
/// links are dropped when a level link exists. A zone that has parts of its
/// own loses its link to a level. Targets outside the batch are ignored.
pub fn remove_redundant_relationships(
    twins: &IndexMap<String, Twin>,
    relationships: &mut IndexMap<String, Relationship>,
    targets: &TargetModelSet,
) -> usize {
    let mut removed = 0;
    for name in [relationship_types::IS_LOCATED_IN, relationship_types::IS_PART_OF] {
        let redundant = redundant_place_links(twins, relationships, targets, name);
        removed += remove_all(relationships, redundant);
    }

    let redundant = redundant_zone_links(twins, relationships, targets);
    removed += remove_all(relationships, redundant);
    removed
}

fn redundant_place_links(
    twins: &IndexMap<String, Twin>,
    relationships: &IndexMap<String, Relationship>,
    targets: &TargetModelSet,
    name: &str,
) -> Vec<String> {
    let mut redundant = Vec::new();
    for twin_id in twins.keys() {
        let links: Vec<(&Relationship, &Twin)> = relationships
            .values()
            .filter(|r| r.name == name && &r.source_id == twin_id)
            .filter_map(|r| twins.get(&r.target_id).map(|target| (r, target)))
            .collect();
        if links.len() < 2 {
            continue;
        }

        let is_building = |twin: &Twin| targets.is_a(twin.model_id(), BUILDING_MODEL_ID);
        let is_level = |twin: &Twin| targets.is_a(twin.model_id(), LEVEL_MODEL_ID);

        let buildings = links.iter().filter(|(_, t)| is_building(t)).count();
        let levels = links.iter().filter(|(_, t)| is_level(t)).count();

        for (relationship, target) in &links {
            let drop = if links.len() > buildings + levels {
                is_building(target) || is_level(target)
            } else {
                links.len() > buildings && is_building(target)
            };
            if drop {
                redundant.push(relationship.id.clone());
            }
        }
    }
    redundant
}

fn redundant_zone_links(
    twins: &IndexMap<String, Twin>,
    relationships: &IndexMap<String, Relationship>,
    targets: &TargetModelSet,
) -> Vec<String> {
    let part_of = relationship_types::IS_PART_OF;
    twins
        .values()
        .filter(|twin| targets.is_a(twin.model_id(), ZONE_MODEL_ID))
        .filter(|zone| {
            relationships
                .values()
                .any(|r| r.name == part_of && r.target_id == zone.id)
        })
        .flat_map(|zone| {
            relationships.values().filter(move |r| {
                r.name == part_of
                    && r.source_id == zone.id
                    && twins
                        .get(&r.target_id)
                        .is_some_and(|level| targets.is_a(level.model_id(), LEVEL_MODEL_ID))
            })
        })
        .map(|r| r.id.clone())
        .collect()
}

fn remove_all(relationships: &mut IndexMap<String, Relationship>, ids: Vec<String>) -> usize {
    let mut removed = 0;
    for id in ids {
        if relationships.shift_remove(&id).is_some() {
            debug!(relationship_id = %id, "Removed redundant relationship");
            removed += 1;
        }
    }
    removed
}
