//! Aggregate heap statistics
//!
//! Sizes in the histograms are payload bytes as written in the snapshot:
//! instance field bytes and array element bytes, without object headers.
//! Shallow and retained sizes (which do include headers) are reported
//! separately in [`HeapSummary`] and [`RetainedEntry`].

use crate::graph::{DominatorTree, RetainedSizes};
use crate::hprof::HeapSnapshot;
use crate::model::{HeapObject, Identifier, ObjectIndex, ObjectKind, RootKind};
use fnv::FnvHashMap;
use serde::Serialize;

/// Count and payload bytes for one name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeStats {
    pub count: u64,
    pub size: u64,
}

impl TypeStats {
    fn record(&mut self, size: u64) {
        self.count += 1;
        self.size = self.size.saturating_add(size);
    }
}

/// One row of a histogram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramEntry {
    pub name: String,
    pub count: u64,
    pub size: u64,
    pub average_size: f64,
}

/// Heap-wide totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeapSummary {
    pub total_objects: u64,
    pub total_classes: u64,
    pub total_instances: u64,
    /// Instance field bytes
    pub total_instance_size: u64,
    /// Object and primitive arrays
    pub total_arrays: u64,
    /// Array element bytes
    pub total_array_size: u64,
    pub total_shallow_size: u64,
    pub gc_roots: u64,
    pub reachable_objects: u64,
    pub reachable_size: u64,
    pub dangling_references: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StringStats {
    pub count: u64,
    pub size: u64,
    pub average_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RootKindCount {
    pub kind: RootKind,
    pub count: u64,
}

/// One row of the retained-size ranked object table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetainedEntry {
    pub object_id: Identifier,
    pub class_name: String,
    pub kind: ObjectKind,
    pub shallow_size: u64,
    pub retained_size: u64,
}

/// Per-name statistics gathered in one pass over the snapshot
#[derive(Debug, Default)]
pub struct HeapStatistics {
    summary: HeapSummary,
    classes: FnvHashMap<String, TypeStats>,
    packages: FnvHashMap<String, TypeStats>,
    primitives: FnvHashMap<String, TypeStats>,
    strings: TypeStats,
}

impl HeapStatistics {
    pub fn collect(snapshot: &HeapSnapshot) -> Self {
        let mut stats = Self::default();
        let id_width = snapshot.id_size().bytes() as u64;

        for (idx, object) in snapshot.objects().iter().enumerate() {
            stats.summary.total_objects += 1;
            stats.summary.total_shallow_size = stats
                .summary
                .total_shallow_size
                .saturating_add(object.shallow_size());

            match object {
                HeapObject::Class(_) => stats.summary.total_classes += 1,
                HeapObject::Instance(instance) => {
                    let size = instance.data.len() as u64;
                    let name = snapshot.class_name(instance.class_id);
                    stats.record_instance(name, size);
                }
                HeapObject::ObjectArray(array) => {
                    let size = array.elements.len() as u64 * id_width;
                    let name = snapshot.type_name(idx as ObjectIndex).into_owned();
                    stats.summary.total_arrays += 1;
                    stats.summary.total_array_size += size;
                    stats.classes.entry(name).or_default().record(size);
                }
                HeapObject::PrimitiveArray(array) => {
                    let size = u64::from(array.length)
                        * array.element_type.width(snapshot.id_size()) as u64;
                    stats.summary.total_arrays += 1;
                    stats.summary.total_array_size += size;
                    stats
                        .primitives
                        .entry(array.element_type.array_name())
                        .or_default()
                        .record(size);
                }
            }
        }
        stats.summary.gc_roots = snapshot.roots().len() as u64;
        stats
    }

    fn record_instance(&mut self, class_name: &str, size: u64) {
        self.summary.total_instances += 1;
        self.summary.total_instance_size += size;

        self.classes
            .entry(class_name.to_string())
            .or_default()
            .record(size);
        if class_name.contains("java.lang.String") {
            self.strings.record(size);
        }
        if let Some((package, _)) = class_name.rsplit_once('.') {
            self.packages
                .entry(package.to_string())
                .or_default()
                .record(size);
        }
    }

    /// Parse-level totals; reachability fields are filled by the pipeline
    pub fn summary(&self) -> HeapSummary {
        self.summary.clone()
    }

    /// Instances by class name and object arrays by array type name
    pub fn class_histogram(&self) -> Vec<HistogramEntry> {
        histogram(&self.classes)
    }

    /// Instances by package (class name without its last segment)
    pub fn package_histogram(&self) -> Vec<HistogramEntry> {
        histogram(&self.packages)
    }

    pub fn primitive_histogram(&self) -> Vec<HistogramEntry> {
        histogram(&self.primitives)
    }

    pub fn class_stats(&self, name: &str) -> Option<TypeStats> {
        self.classes.get(name).copied()
    }

    pub fn string_stats(&self) -> StringStats {
        StringStats {
            count: self.strings.count,
            size: self.strings.size,
            average_size: average(self.strings),
        }
    }
}

fn average(stats: TypeStats) -> f64 {
    if stats.count == 0 {
        0.0
    } else {
        stats.size as f64 / stats.count as f64
    }
}

/// Size descending, name ascending
fn histogram(table: &FnvHashMap<String, TypeStats>) -> Vec<HistogramEntry> {
    let mut entries: Vec<HistogramEntry> = table
        .iter()
        .map(|(name, stats)| HistogramEntry {
            name: name.clone(),
            count: stats.count,
            size: stats.size,
            average_size: average(*stats),
        })
        .collect();
    entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.name.cmp(&b.name)));
    entries
}

/// GC roots per kind, in tag-table order, omitting kinds with no roots
pub fn root_histogram(snapshot: &HeapSnapshot) -> Vec<RootKindCount> {
    let mut counts: FnvHashMap<RootKind, u64> = FnvHashMap::default();
    for root in snapshot.roots() {
        *counts.entry(root.kind).or_default() += 1;
    }
    RootKind::ALL
        .iter()
        .filter_map(|&kind| counts.get(&kind).map(|&count| RootKindCount { kind, count }))
        .collect()
}

/// The `limit` reachable objects with the largest retained size
pub fn top_retained(
    snapshot: &HeapSnapshot,
    tree: &DominatorTree,
    retained: &RetainedSizes,
    limit: usize,
) -> Vec<RetainedEntry> {
    let mut ranked: Vec<(u64, Identifier, ObjectIndex)> = tree
        .reachable()
        .iter()
        .map(|&node| (retained.get(node), snapshot.object(node).id(), node))
        .collect();
    ranked.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    ranked.truncate(limit);

    ranked
        .into_iter()
        .map(|(retained_size, object_id, node)| {
            let object = snapshot.object(node);
            RetainedEntry {
                object_id,
                class_name: snapshot.type_name(node).into_owned(),
                kind: object.kind(),
                shallow_size: object.shallow_size(),
                retained_size,
            }
        })
        .collect()
}
