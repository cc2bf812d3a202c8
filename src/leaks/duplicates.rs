//! Duplicate singleton instances

use super::{HeapView, LeakKind, LeakSuspect, PatternBook};
use crate::model::{HeapObject, Identifier, ObjectIndex};
use fnv::FnvHashMap;
use std::collections::BTreeMap;

/// Classes matching the singleton patterns with more than one reachable instance
pub fn scan(view: &HeapView<'_>, patterns: &PatternBook) -> Vec<LeakSuspect> {
    let snapshot = view.snapshot;
    let mut is_singleton: FnvHashMap<Identifier, bool> = FnvHashMap::default();
    let mut groups: BTreeMap<&str, Vec<ObjectIndex>> = BTreeMap::new();

    for (idx, object) in snapshot.objects().iter().enumerate() {
        let HeapObject::Instance(instance) = object else {
            continue;
        };
        let node = idx as ObjectIndex;
        if !view.dominators.is_reachable(node) {
            continue;
        }
        let name = snapshot.class_name(instance.class_id);
        let matches = *is_singleton
            .entry(instance.class_id)
            .or_insert_with(|| patterns.singleton.matches(name));
        if matches {
            groups.entry(name).or_default().push(node);
        }
    }

    groups
        .into_iter()
        .filter(|(_, nodes)| nodes.len() > 1)
        .map(|(name, nodes)| {
            let mut objects: Vec<Identifier> = nodes.iter().map(|&n| view.id(n)).collect();
            objects.sort_unstable();
            let size = nodes
                .iter()
                .fold(0u64, |acc, &n| acc.saturating_add(view.retained(n)));
            LeakSuspect {
                kind: LeakKind::DuplicateInstance,
                class_name: name.to_string(),
                description: format!(
                    "{} live instances of {} (expected at most one), retaining {} bytes",
                    nodes.len(),
                    name,
                    size
                ),
                objects,
                size,
                holder_chain: None,
            }
        })
        .collect()
}
