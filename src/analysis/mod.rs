//! End-to-end snapshot analysis
//!
//! [`AnalysisContext`] owns the output of every stage for one snapshot:
//!
//! ```text
//! bytes ─► HeapSnapshot ─► ReferenceGraph ─► DominatorTree ─► RetainedSizes
//!                                                                  │
//!                         AnalysisReport ◄─ LeakHeuristics ◄───────┘
//! ```
//!
//! Nothing is shared between contexts, so independent snapshots can be
//! analyzed on separate threads.
//!
//! # Example
//!
//! ```
//! use heaplens::analysis::analyze;
//! use heaplens::config::AnalysisConfig;
//! use heaplens::hprof::builder::{ClassDef, HprofBuilder};
//! use heaplens::model::{IdSize, RootKind};
//!
//! # fn main() -> heaplens::error::Result<()> {
//! let mut builder = HprofBuilder::new(IdSize::Eight);
//! builder.class(ClassDef::new(0x10, "com.example.Cache"));
//! builder.instance(0x20, 0x10, &[]);
//! builder.root(RootKind::JniGlobal, 0x20);
//!
//! let report = analyze(&builder.finish(), &AnalysisConfig::default())?;
//! assert_eq!(report.summary.total_instances, 1);
//! assert_eq!(report.summary.reachable_objects, 1);
//! # Ok(())
//! # }
//! ```

mod cancel;

pub use cancel::CancellationToken;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisWarning, HeapError, Result};
use crate::graph::{DominatorOptions, DominatorTree, ReferenceGraph, RetainedSizes};
use crate::hprof::{FieldLayouts, HeapSnapshot, ParseOptions, SnapshotHeader};
use crate::leaks::{DuplicateString, HeapView, LeakFindings, LeakHeuristics, LeakSuspect};
use crate::model::ObjectIndex;
use crate::stats::{
    root_histogram, top_retained, HeapStatistics, HeapSummary, HistogramEntry, RetainedEntry,
    RootKindCount, StringStats,
};
use anyhow::Context;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// Everything computed for one snapshot, ready for an external renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub header: SnapshotHeader,
    pub summary: HeapSummary,
    pub class_histogram: Vec<HistogramEntry>,
    pub package_histogram: Vec<HistogramEntry>,
    pub primitive_histogram: Vec<HistogramEntry>,
    pub string_stats: StringStats,
    pub root_histogram: Vec<RootKindCount>,
    pub top_retained: Vec<RetainedEntry>,
    pub leak_suspects: Vec<LeakSuspect>,
    pub duplicate_strings: Vec<DuplicateString>,
    pub warnings: Vec<AnalysisWarning>,
}

/// Owner of every analysis stage's output for one snapshot
pub struct AnalysisContext {
    config: AnalysisConfig,
    snapshot: HeapSnapshot,
    graph: ReferenceGraph,
    dominators: DominatorTree,
    retained: RetainedSizes,
    warnings: Vec<AnalysisWarning>,
}

impl AnalysisContext {
    /// Decode `data` and run every graph stage
    pub fn build(data: &[u8], config: &AnalysisConfig) -> Result<Self> {
        Self::build_inner(data, config, None)
    }

    /// Like [`build`](Self::build), stopping with `HeapError::Cancelled`
    /// soon after `token` is cancelled
    pub fn build_with_cancellation(
        data: &[u8],
        config: &AnalysisConfig,
        token: &CancellationToken,
    ) -> Result<Self> {
        Self::build_inner(data, config, Some(token.clone()))
    }

    fn build_inner(
        data: &[u8],
        config: &AnalysisConfig,
        cancel: Option<CancellationToken>,
    ) -> Result<Self> {
        config.validate().map_err(HeapError::InvalidConfig)?;
        let checkpoint = || match &cancel {
            Some(token) => token.check(),
            None => Ok(()),
        };

        let mut warnings = Vec::new();
        let mut options = ParseOptions::from_config(config);
        options.cancel = cancel.clone();
        let snapshot = HeapSnapshot::parse(data, &options, &mut warnings)?;
        checkpoint()?;

        let mut layouts = FieldLayouts::new(&snapshot, config.field_order);
        let graph =
            ReferenceGraph::build(&snapshot, &mut layouts, config.limits.max_edges, &mut warnings)?;
        checkpoint()?;

        let roots = resolve_roots(&snapshot);
        let dominator_options = DominatorOptions {
            iteration_cap: config.dominator_iteration_cap,
            max_objects: config.limits.max_objects,
            cancel: cancel.clone(),
        };
        let dominators = DominatorTree::build(&graph, &roots, &dominator_options, &mut warnings)?;
        checkpoint()?;

        let shallow: Vec<u64> = snapshot.objects().iter().map(|o| o.shallow_size()).collect();
        let retained = RetainedSizes::compute(&dominators, &shallow);

        tracing::info!(
            "Object graph: {} objects, {} edges, {} reachable in {} dominator passes",
            snapshot.len(),
            graph.edge_count(),
            dominators.reachable().len(),
            dominators.iterations()
        );

        Ok(Self {
            config: config.clone(),
            snapshot,
            graph,
            dominators,
            retained,
            warnings,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &HeapSnapshot {
        &self.snapshot
    }

    pub fn graph(&self) -> &ReferenceGraph {
        &self.graph
    }

    pub fn dominators(&self) -> &DominatorTree {
        &self.dominators
    }

    pub fn retained(&self) -> &RetainedSizes {
        &self.retained
    }

    pub fn warnings(&self) -> &[AnalysisWarning] {
        &self.warnings
    }

    pub fn view(&self) -> HeapView<'_> {
        HeapView::new(
            &self.snapshot,
            &self.graph,
            &self.dominators,
            &self.retained,
            self.config.field_order,
        )
    }

    pub fn leak_findings(&self) -> Result<LeakFindings> {
        let heuristics = LeakHeuristics::new(&self.config.leaks)?;
        Ok(heuristics.run(&self.view()))
    }

    /// Aggregate statistics and leak findings into a report
    pub fn report(&self) -> Result<AnalysisReport> {
        let stats = HeapStatistics::collect(&self.snapshot);
        let mut summary = stats.summary();
        summary.reachable_objects = self.dominators.reachable().len() as u64;
        summary.reachable_size = self.retained.total_reachable(&self.dominators);
        summary.dangling_references = self.graph.dangling_references();

        let findings = self.leak_findings()?;

        Ok(AnalysisReport {
            header: self.snapshot.header().clone(),
            summary,
            class_histogram: stats.class_histogram(),
            package_histogram: stats.package_histogram(),
            primitive_histogram: stats.primitive_histogram(),
            string_stats: stats.string_stats(),
            root_histogram: root_histogram(&self.snapshot),
            top_retained: top_retained(
                &self.snapshot,
                &self.dominators,
                &self.retained,
                self.config.top_retained_objects,
            ),
            leak_suspects: findings.suspects,
            duplicate_strings: findings.duplicate_strings,
            warnings: self.warnings.clone(),
        })
    }
}

/// Arena indices of GC-root objects; roots naming absent objects are dropped
fn resolve_roots(snapshot: &HeapSnapshot) -> Vec<ObjectIndex> {
    let mut missing = 0usize;
    let roots: Vec<ObjectIndex> = snapshot
        .roots()
        .iter()
        .filter_map(|root| {
            let idx = snapshot.index_of(root.object_id);
            if idx.is_none() {
                missing += 1;
            }
            idx
        })
        .collect();
    if missing > 0 {
        tracing::debug!("{} GC roots name objects absent from the snapshot", missing);
    }
    roots
}

/// Analyze an in-memory snapshot
pub fn analyze(data: &[u8], config: &AnalysisConfig) -> Result<AnalysisReport> {
    AnalysisContext::build(data, config)?.report()
}

/// Memory-map and analyze a snapshot file
pub fn analyze_file<P: AsRef<Path>>(
    path: P,
    config: &AnalysisConfig,
) -> anyhow::Result<AnalysisReport> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    // SAFETY: the mapping is read-only and lives only for this call; the
    // snapshot file is not expected to be modified while it is analyzed
    let mmap = unsafe { memmap2::Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap {}", path.display()))?;

    tracing::info!("Analyzing {} ({} bytes)", path.display(), mmap.len());
    let report = analyze(&mmap, config)
        .with_context(|| format!("Failed to analyze {}", path.display()))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hprof::builder::{ClassDef, HprofBuilder};
    use crate::model::{IdSize, RootKind};

    fn small_heap() -> Vec<u8> {
        let mut b = HprofBuilder::new(IdSize::Four);
        b.class(ClassDef::new(0x10, "com.example.Node"));
        b.instance(0x20, 0x10, &[]);
        b.instance(0x21, 0x10, &[]);
        b.root(RootKind::JavaFrame, 0x20);
        b.root(RootKind::JavaFrame, 0x999);
        b.finish()
    }

    #[test]
    fn test_report_summary() {
        let report = analyze(&small_heap(), &AnalysisConfig::default()).unwrap();
        assert_eq!(report.summary.total_objects, 3);
        assert_eq!(report.summary.gc_roots, 2);
        assert_eq!(report.summary.reachable_objects, 1);
        assert_eq!(report.summary.reachable_size, 8);
        assert_eq!(report.top_retained.len(), 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalysisConfig {
            dominator_iteration_cap: 0,
            ..AnalysisConfig::default()
        };
        let err = AnalysisContext::build(&small_heap(), &config).err().unwrap();
        assert!(matches!(err, HeapError::InvalidConfig(_)));
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();
        let result =
            AnalysisContext::build_with_cancellation(&small_heap(), &AnalysisConfig::default(), &token);
        assert!(matches!(result.err(), Some(HeapError::Cancelled)));
    }

    #[test]
    fn test_analyze_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("heap.hprof");
        std::fs::write(&path, small_heap()).unwrap();

        let report = analyze_file(&path, &AnalysisConfig::default()).unwrap();
        assert_eq!(report.summary.total_instances, 2);

        let err = analyze_file(dir.path().join("missing.hprof"), &AnalysisConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
