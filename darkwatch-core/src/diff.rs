//! Entity change detection between consecutive snapshots of a URL

use chrono::Utc;
use std::collections::HashSet;

use crate::model::{Entity, EntityChange, EntityType};

/// Entities in `current` whose (type, value) is absent from `previous`.
///
/// Only additions are reported; entities that disappeared are not changes.
/// An empty `previous` means there is nothing to compare against, so the
/// result is empty as well.
pub fn detect_new(current: &[Entity], previous: &[Entity]) -> Vec<EntityChange> {
    if previous.is_empty() {
        return Vec::new();
    }

    let known: HashSet<(EntityType, &str)> = previous
        .iter()
        .map(|e| (e.entity_type, e.value.as_str()))
        .collect();

    let now = Utc::now();
    let mut reported: HashSet<(EntityType, &str)> = HashSet::new();
    let mut changes = Vec::new();

    for entity in current {
        let key = (entity.entity_type, entity.value.as_str());
        if known.contains(&key) || !reported.insert(key) {
            continue;
        }
        changes.push(EntityChange {
            entity_type: entity.entity_type,
            value: entity.value.clone(),
            is_new: true,
            detected_at: now,
        });
    }

    changes
}
