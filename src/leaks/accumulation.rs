//! Accumulation points: objects retaining far more than their own size

use super::{HeapView, HolderResolver, LeakKind, LeakSuspect};
use crate::config::LeakConfig;
use crate::model::ObjectIndex;

pub fn scan(
    view: &HeapView<'_>,
    config: &LeakConfig,
    holders: &mut HolderResolver<'_, '_>,
) -> Vec<LeakSuspect> {
    let mut candidates: Vec<(u64, ObjectIndex)> = view
        .dominators
        .reachable()
        .iter()
        .copied()
        .filter_map(|node| {
            let shallow = view.shallow(node);
            let retained = view.retained(node);
            let qualifies = shallow > 0
                && retained >= config.accumulation_min_retained
                && retained as f64 / shallow as f64 >= config.accumulation_min_ratio;
            qualifies.then_some((retained, node))
        })
        .collect();

    // Only the highest-ranked candidates get a holder chain
    candidates.sort_unstable_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| view.id(a.1).cmp(&view.id(b.1)))
    });
    candidates.truncate(config.max_suspects_per_scan);

    candidates
        .into_iter()
        .map(|(retained, node)| {
            let shallow = view.shallow(node);
            let class_name = view.type_name(node).into_owned();
            LeakSuspect {
                kind: LeakKind::AccumulationPoint,
                description: format!(
                    "{} retains {} bytes, {:.1}x its own {} bytes",
                    class_name,
                    retained,
                    retained as f64 / shallow as f64,
                    shallow
                ),
                class_name,
                objects: vec![view.id(node)],
                size: retained,
                holder_chain: Some(holders.resolve(node)),
            }
        })
        .collect()
}
