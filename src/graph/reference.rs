//! Reference graph in CSR form
//!
//! Nodes are arena indices. Edges come from instance reference fields,
//! object-array elements and static reference fields of classes. Edges from
//! one source to the same target are coalesced; self-loops and cycles are
//! kept as they appear in the heap.

use crate::error::{AnalysisWarning, HeapError, Result};
use crate::hprof::{FieldLayouts, HeapSnapshot};
use crate::model::{HeapObject, Identifier, ObjectIndex};

/// Per-object warnings logged before switching to a summary count
const LOGGED_WARNINGS: usize = 8;

/// Outgoing and incoming adjacency over arena indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceGraph {
    out_offsets: Vec<usize>,
    out_targets: Vec<ObjectIndex>,
    in_offsets: Vec<usize>,
    in_sources: Vec<ObjectIndex>,
    dangling_references: u64,
}

impl ReferenceGraph {
    /// Index every reference held by the objects of `snapshot`
    ///
    /// Layout problems become warnings; references to identifiers with no
    /// object in the snapshot are counted in [`dangling_references`].
    ///
    /// [`dangling_references`]: ReferenceGraph::dangling_references
    pub fn build(
        snapshot: &HeapSnapshot,
        layouts: &mut FieldLayouts<'_>,
        max_edges: usize,
        warnings: &mut Vec<AnalysisWarning>,
    ) -> Result<Self> {
        let node_count = snapshot.len();
        let mut out_offsets = Vec::with_capacity(node_count + 1);
        let mut out_targets: Vec<ObjectIndex> = Vec::new();
        let mut scratch: Vec<Identifier> = Vec::new();
        let mut dangling = 0u64;
        let mut layout_warnings = 0usize;

        out_offsets.push(0);
        for object in snapshot.objects() {
            scratch.clear();
            match object {
                HeapObject::Instance(instance) => {
                    if let Some(warning) = layouts.extract_references(instance, &mut scratch) {
                        layout_warnings += 1;
                        if layout_warnings <= LOGGED_WARNINGS {
                            tracing::warn!("{}", warning);
                        }
                        warnings.push(warning);
                    }
                }
                HeapObject::ObjectArray(array) => {
                    scratch.extend(array.elements.iter().filter(|id| !id.is_null()));
                }
                HeapObject::Class(class) => {
                    scratch.extend(class.static_fields.iter().filter_map(|f| f.reference()));
                }
                HeapObject::PrimitiveArray(_) => {}
            }

            let start = out_targets.len();
            for &id in &scratch {
                match snapshot.index_of(id) {
                    Some(target) => out_targets.push(target),
                    None => dangling += 1,
                }
            }
            let row = &mut out_targets[start..];
            row.sort_unstable();
            let unique = dedup_sorted(row);
            out_targets.truncate(start + unique);

            if out_targets.len() > max_edges {
                return Err(HeapError::ResourceLimitExceeded {
                    stage: "reference graph",
                    limit: max_edges,
                    actual: out_targets.len(),
                });
            }
            out_offsets.push(out_targets.len());
        }

        if layout_warnings > LOGGED_WARNINGS {
            tracing::warn!(
                "{} more field layout warnings not logged",
                layout_warnings - LOGGED_WARNINGS
            );
        }

        let graph = Self::with_incoming(out_offsets, out_targets, dangling);
        tracing::debug!(
            "Reference graph: {} nodes, {} edges, {} dangling references",
            graph.node_count(),
            graph.edge_count(),
            graph.dangling_references
        );
        Ok(graph)
    }

    /// Build a graph directly from `(source, target)` pairs
    ///
    /// Endpoints must be below `node_count`.
    ///
    /// # Example
    ///
    /// ```
    /// use heaplens::graph::ReferenceGraph;
    ///
    /// let graph = ReferenceGraph::from_edges(3, &[(0, 1), (0, 1), (1, 2)]);
    /// assert_eq!(graph.edge_count(), 2);
    /// assert_eq!(graph.incoming(2), &[1]);
    /// ```
    pub fn from_edges(node_count: usize, edges: &[(ObjectIndex, ObjectIndex)]) -> Self {
        let mut sorted = edges.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut out_offsets = vec![0usize; node_count + 1];
        for &(source, _) in &sorted {
            out_offsets[source as usize + 1] += 1;
        }
        for i in 0..node_count {
            out_offsets[i + 1] += out_offsets[i];
        }
        let out_targets = sorted.iter().map(|&(_, target)| target).collect();

        Self::with_incoming(out_offsets, out_targets, 0)
    }

    /// Derive the incoming CSR by counting sort; sources stay ascending
    fn with_incoming(
        out_offsets: Vec<usize>,
        out_targets: Vec<ObjectIndex>,
        dangling_references: u64,
    ) -> Self {
        let node_count = out_offsets.len() - 1;
        let mut in_offsets = vec![0usize; node_count + 1];
        for &target in &out_targets {
            in_offsets[target as usize + 1] += 1;
        }
        for i in 0..node_count {
            in_offsets[i + 1] += in_offsets[i];
        }

        let mut fill = in_offsets.clone();
        let mut in_sources = vec![0 as ObjectIndex; out_targets.len()];
        for source in 0..node_count {
            for &target in &out_targets[out_offsets[source]..out_offsets[source + 1]] {
                let slot = &mut fill[target as usize];
                in_sources[*slot] = source as ObjectIndex;
                *slot += 1;
            }
        }

        Self {
            out_offsets,
            out_targets,
            in_offsets,
            in_sources,
            dangling_references,
        }
    }

    pub fn node_count(&self) -> usize {
        self.out_offsets.len() - 1
    }

    pub fn edge_count(&self) -> usize {
        self.out_targets.len()
    }

    /// Distinct targets referenced by `node`, ascending
    pub fn outgoing(&self, node: ObjectIndex) -> &[ObjectIndex] {
        let n = node as usize;
        &self.out_targets[self.out_offsets[n]..self.out_offsets[n + 1]]
    }

    /// Distinct referrers of `node`, ascending
    pub fn incoming(&self, node: ObjectIndex) -> &[ObjectIndex] {
        let n = node as usize;
        &self.in_sources[self.in_offsets[n]..self.in_offsets[n + 1]]
    }

    /// References whose target identifier has no object in the snapshot
    pub fn dangling_references(&self) -> u64 {
        self.dangling_references
    }
}

/// In-place dedup of a sorted slice, returning the unique prefix length
fn dedup_sorted(row: &mut [ObjectIndex]) -> usize {
    if row.is_empty() {
        return 0;
    }
    let mut write = 1;
    for read in 1..row.len() {
        if row[read] != row[write - 1] {
            row[write] = row[read];
            write += 1;
        }
    }
    write
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_sorted() {
        let mut row = [1, 1, 2, 5, 5, 5, 7];
        let n = dedup_sorted(&mut row);
        assert_eq!(&row[..n], &[1, 2, 5, 7]);

        let mut empty: [ObjectIndex; 0] = [];
        assert_eq!(dedup_sorted(&mut empty), 0);
    }

    #[test]
    fn test_from_edges_keeps_self_loops() {
        let graph = ReferenceGraph::from_edges(2, &[(1, 1), (0, 1)]);
        assert_eq!(graph.outgoing(1), &[1]);
        assert_eq!(graph.incoming(1), &[0, 1]);
        assert!(graph.outgoing(0).contains(&1));
    }
}
