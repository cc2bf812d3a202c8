//! Holder chains, static holders and large arrays

use super::{HeapView, LeakKind, LeakSuspect, PatternBook};
use crate::config::LeakConfig;
use crate::hprof::FieldLayouts;
use crate::model::{HeapObject, Identifier, ObjectIndex, RootKind};
use fnv::FnvHashSet;
use serde::Serialize;

/// One object on a holder chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderLink {
    pub object_id: Identifier,
    pub class_name: String,
    /// Field, static field or array slot of this object that references the
    /// previous link; `None` for the chain's starting object
    pub via: Option<String>,
}

/// Why a holder chain stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ChainEnd {
    GcRoot { kind: RootKind },
    Interesting,
    StaticField,
    Exhausted,
    DepthLimit,
}

/// Path from an object towards whatever keeps it alive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderChain {
    /// Starting object first, each following link references the one before
    pub links: Vec<HolderLink>,
    pub end: ChainEnd,
}

impl HolderChain {
    /// Number of referrer hops
    pub fn depth(&self) -> usize {
        self.links.len().saturating_sub(1)
    }
}

/// Walks incoming references with a per-class layout cache
pub struct HolderResolver<'v, 'a> {
    view: &'v HeapView<'a>,
    patterns: &'v PatternBook,
    layouts: FieldLayouts<'a>,
    max_depth: usize,
}

impl<'v, 'a> HolderResolver<'v, 'a> {
    pub fn new(view: &'v HeapView<'a>, patterns: &'v PatternBook, max_depth: usize) -> Self {
        Self {
            view,
            patterns,
            layouts: FieldLayouts::new(view.snapshot, view.field_order),
            max_depth,
        }
    }

    /// Resolve the holder chain of `target`
    ///
    /// Referrers of a reachable object are limited to reachable ones. Among
    /// unvisited referrers each step prefers an interesting class, then
    /// a class outside the noise list, then anything; ties go to the lowest
    /// identifier. The walk stops at a GC root, at an interesting referrer,
    /// when no unvisited referrer is left, or at the depth limit.
    pub fn resolve(&mut self, target: ObjectIndex) -> HolderChain {
        let view = self.view;
        let mut links = vec![self.link(target, None)];
        let mut visited = FnvHashSet::default();
        visited.insert(target);
        let mut current = target;

        let end = loop {
            if let Some(kind) = view.root_kind(current) {
                break ChainEnd::GcRoot { kind };
            }
            if current != target && self.is_interesting(current) {
                break ChainEnd::Interesting;
            }
            if links.len() > self.max_depth {
                break ChainEnd::DepthLimit;
            }

            let Some(holder) = self.pick_referrer(current, &visited) else {
                break ChainEnd::Exhausted;
            };
            visited.insert(holder);
            let via = self.referring_slot(holder, view.id(current));
            links.push(self.link(holder, via));
            current = holder;
        };

        HolderChain { links, end }
    }

    fn is_interesting(&self, node: ObjectIndex) -> bool {
        self.patterns.interesting.matches(&self.view.type_name(node))
    }

    fn pick_referrer(
        &self,
        node: ObjectIndex,
        visited: &FnvHashSet<ObjectIndex>,
    ) -> Option<ObjectIndex> {
        let view = self.view;
        // Garbage never keeps a live object alive
        let live = view.dominators.is_reachable(node);
        view.graph
            .incoming(node)
            .iter()
            .copied()
            .filter(|holder| !visited.contains(holder))
            .filter(|&holder| !live || view.dominators.is_reachable(holder))
            .min_by_key(|&holder| {
                let name = view.type_name(holder);
                let rank = if self.patterns.interesting.matches(&name) {
                    0
                } else if !self.patterns.noise.matches(&name) {
                    1
                } else {
                    2
                };
                (rank, view.id(holder))
            })
    }

    fn referring_slot(&mut self, holder: ObjectIndex, target: Identifier) -> Option<String> {
        let snapshot = self.view.snapshot;
        let field_name = |name_id: Identifier| {
            snapshot
                .string(name_id)
                .map_or_else(|| name_id.to_string(), str::to_string)
        };

        match snapshot.object(holder) {
            HeapObject::Instance(instance) => self
                .layouts
                .referring_field(instance, target)
                .map(field_name),
            HeapObject::ObjectArray(array) => array
                .elements
                .iter()
                .position(|&element| element == target)
                .map(|i| format!("[{}]", i)),
            HeapObject::Class(class) => class
                .static_fields
                .iter()
                .find(|field| field.reference() == Some(target))
                .map(|field| format!("static {}", field_name(field.name_id))),
            HeapObject::PrimitiveArray(_) => None,
        }
    }

    fn link(&self, node: ObjectIndex, via: Option<String>) -> HolderLink {
        HolderLink {
            object_id: self.view.id(node),
            class_name: self.view.type_name(node).into_owned(),
            via,
        }
    }
}

/// Static reference fields of application classes pinning large graphs or
/// lifecycle components
pub fn scan_static_holders(
    view: &HeapView<'_>,
    config: &LeakConfig,
    patterns: &PatternBook,
) -> Vec<LeakSuspect> {
    let snapshot = view.snapshot;
    let mut suspects = Vec::new();

    for class in snapshot.classes() {
        if patterns.runtime.matches(&class.name) {
            continue;
        }
        for field in &class.static_fields {
            let Some(target) = field.reference().and_then(|id| snapshot.index_of(id)) else {
                continue;
            };
            let retained = view.retained(target);
            let target_name = view.type_name(target);
            let field_name = snapshot
                .string(field.name_id)
                .map_or_else(|| field.name_id.to_string(), str::to_string);

            let kind = if patterns.lifecycle.matches(&target_name) {
                LeakKind::LifecycleLeak
            } else if retained >= config.static_holder_min_retained {
                LeakKind::StaticHolder
            } else {
                continue;
            };

            let description = match kind {
                LeakKind::LifecycleLeak => format!(
                    "{} is held by static field {}.{} and outlives its lifecycle",
                    target_name, class.name, field_name
                ),
                _ => format!(
                    "static field {}.{} retains {} bytes through {}",
                    class.name, field_name, retained, target_name
                ),
            };

            let chain = HolderChain {
                links: vec![
                    HolderLink {
                        object_id: view.id(target),
                        class_name: target_name.to_string(),
                        via: None,
                    },
                    HolderLink {
                        object_id: class.id,
                        class_name: class.name.clone(),
                        via: Some(format!("static {}", field_name)),
                    },
                ],
                end: ChainEnd::StaticField,
            };

            suspects.push(LeakSuspect {
                kind,
                class_name: target_name.into_owned(),
                description,
                objects: vec![view.id(target)],
                size: retained,
                holder_chain: Some(chain),
            });
        }
    }
    suspects
}

/// Primitive arrays above the size threshold, with their owners explained
pub fn scan_large_arrays(
    view: &HeapView<'_>,
    config: &LeakConfig,
    holders: &mut HolderResolver<'_, '_>,
) -> Vec<LeakSuspect> {
    let mut suspects = Vec::new();
    for (idx, object) in view.snapshot.objects().iter().enumerate() {
        let HeapObject::PrimitiveArray(array) = object else {
            continue;
        };
        if array.shallow_size < config.large_array_threshold {
            continue;
        }

        let node = idx as ObjectIndex;
        let chain = holders.resolve(node);
        let owner = chain
            .links
            .last()
            .filter(|_| chain.depth() > 0)
            .map_or_else(|| "no referrer".to_string(), |link| link.class_name.clone());
        let class_name = array.element_type.array_name();

        suspects.push(LeakSuspect {
            kind: LeakKind::LargeArray,
            description: format!(
                "{} of {} elements ({} bytes) held by {}",
                class_name, array.length, array.shallow_size, owner
            ),
            class_name,
            objects: vec![array.id],
            size: array.shallow_size,
            holder_chain: Some(chain),
        });
    }
    suspects
}
