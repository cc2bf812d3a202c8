//! Heaplens - HPROF heap snapshot analyzer
//!
//! This library decodes JVM/ART heap snapshots into an object arena, builds
//! the reference graph and an approximate dominator tree, computes retained
//! sizes, and runs leak heuristics over the result.
//!
//! Most callers only need [`analysis::analyze`] or
//! [`analysis::AnalysisContext`]; the stage modules are public for callers
//! that want to drive the pipeline themselves.

pub mod analysis;
pub mod config;
pub mod cursor;
pub mod error;
pub mod graph;
pub mod hprof;
pub mod leaks;
pub mod model;
pub mod stats;
