//! Leak heuristics
//!
//! Each scan looks at the finished object graph from one angle and emits
//! [`LeakSuspect`]s ranked by the bytes involved:
//!
//! - **DuplicateInstance**: more than one live instance of a class that
//!   should be a singleton
//! - **AccumulationPoint**: an object retaining far more than its own size
//! - **StaticHolder**: a large object graph pinned by a static field
//! - **LifecycleLeak**: a UI component pinned by a static field
//! - **LargeArray**: a very large primitive array, with its owner explained
//!
//! The duplicate-content scan reports strings with identical text as
//! [`DuplicateString`] groups instead of suspects.
//!
//! Class-name pattern lists and thresholds come from [`LeakConfig`]; the
//! scans contain no hard-coded class names.

pub mod accumulation;
pub mod duplicates;
pub mod holders;
pub mod patterns;
pub mod strings;

pub use holders::{ChainEnd, HolderChain, HolderLink, HolderResolver};
pub use patterns::{ClassPatterns, PatternBook};
pub use strings::DuplicateString;

use crate::config::{FieldOrder, LeakConfig};
use crate::error::Result;
use crate::graph::{DominatorTree, ReferenceGraph, RetainedSizes};
use crate::hprof::HeapSnapshot;
use crate::model::{Identifier, ObjectIndex, RootKind};
use fnv::FnvHashMap;
use serde::Serialize;
use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakKind {
    DuplicateInstance,
    AccumulationPoint,
    StaticHolder,
    LifecycleLeak,
    LargeArray,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeakSuspect {
    pub kind: LeakKind,
    /// Class of the affected objects
    pub class_name: String,
    pub description: String,
    /// Affected objects, ascending
    pub objects: Vec<Identifier>,
    /// Ranking size in bytes
    pub size: u64,
    pub holder_chain: Option<HolderChain>,
}

/// Output of one heuristics run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeakFindings {
    pub suspects: Vec<LeakSuspect>,
    pub duplicate_strings: Vec<DuplicateString>,
}

/// Read-only view of every analysis stage the scans need
pub struct HeapView<'a> {
    pub snapshot: &'a HeapSnapshot,
    pub graph: &'a ReferenceGraph,
    pub dominators: &'a DominatorTree,
    pub retained: &'a RetainedSizes,
    pub field_order: FieldOrder,
    root_kinds: FnvHashMap<ObjectIndex, RootKind>,
}

impl<'a> HeapView<'a> {
    pub fn new(
        snapshot: &'a HeapSnapshot,
        graph: &'a ReferenceGraph,
        dominators: &'a DominatorTree,
        retained: &'a RetainedSizes,
        field_order: FieldOrder,
    ) -> Self {
        let mut root_kinds = FnvHashMap::default();
        for root in snapshot.roots() {
            if let Some(idx) = snapshot.index_of(root.object_id) {
                root_kinds.entry(idx).or_insert(root.kind);
            }
        }
        Self {
            snapshot,
            graph,
            dominators,
            retained,
            field_order,
            root_kinds,
        }
    }

    /// Kind of the first GC root record naming `node`
    pub fn root_kind(&self, node: ObjectIndex) -> Option<RootKind> {
        self.root_kinds.get(&node).copied()
    }

    pub fn id(&self, node: ObjectIndex) -> Identifier {
        self.snapshot.object(node).id()
    }

    pub fn type_name(&self, node: ObjectIndex) -> Cow<'a, str> {
        self.snapshot.type_name(node)
    }

    pub fn shallow(&self, node: ObjectIndex) -> u64 {
        self.snapshot.object(node).shallow_size()
    }

    pub fn retained(&self, node: ObjectIndex) -> u64 {
        self.retained.get(node)
    }
}

/// Configured leak scanner
pub struct LeakHeuristics {
    config: LeakConfig,
    patterns: PatternBook,
}

impl LeakHeuristics {
    pub fn new(config: &LeakConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            patterns: PatternBook::compile(config)?,
        })
    }

    pub fn config(&self) -> &LeakConfig {
        &self.config
    }

    pub fn patterns(&self) -> &PatternBook {
        &self.patterns
    }

    /// Referrer chain explaining what keeps `target` alive
    pub fn holder_chain(&self, view: &HeapView<'_>, target: ObjectIndex) -> HolderChain {
        self.resolver(view).resolve(target)
    }

    fn resolver<'v, 'a>(&'v self, view: &'v HeapView<'a>) -> HolderResolver<'v, 'a> {
        HolderResolver::new(view, &self.patterns, self.config.holder_chain_max_depth)
    }

    /// Run every scan and merge the results
    pub fn run(&self, view: &HeapView<'_>) -> LeakFindings {
        let mut holders = self.resolver(view);
        let limit = self.config.max_suspects_per_scan;

        let scans = [
            ("duplicate instances", duplicates::scan(view, &self.patterns)),
            (
                "accumulation points",
                accumulation::scan(view, &self.config, &mut holders),
            ),
            (
                "static holders",
                holders::scan_static_holders(view, &self.config, &self.patterns),
            ),
            (
                "large arrays",
                holders::scan_large_arrays(view, &self.config, &mut holders),
            ),
        ];

        let mut suspects = Vec::new();
        for (name, mut found) in scans {
            tracing::debug!("Leak scan {}: {} candidates", name, found.len());
            rank_suspects(&mut found);
            found.truncate(limit);
            suspects.extend(found);
        }
        rank_suspects(&mut suspects);

        let mut duplicate_strings = strings::scan(view, &self.config, &self.patterns);
        duplicate_strings.truncate(limit);

        tracing::info!(
            "Leak heuristics: {} suspects, {} duplicate string groups",
            suspects.len(),
            duplicate_strings.len()
        );

        LeakFindings {
            suspects,
            duplicate_strings,
        }
    }
}

/// Size descending; class name, first object and kind ascending
fn compare_suspects(a: &LeakSuspect, b: &LeakSuspect) -> Ordering {
    b.size
        .cmp(&a.size)
        .then_with(|| a.class_name.cmp(&b.class_name))
        .then_with(|| a.objects.first().cmp(&b.objects.first()))
        .then_with(|| a.kind.cmp(&b.kind))
}

pub fn rank_suspects(suspects: &mut [LeakSuspect]) {
    suspects.sort_by(compare_suspects);
}
