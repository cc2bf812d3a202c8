//! Object graph analysis
//!
//! ```text
//! HeapSnapshot ──► ReferenceGraph ──► DominatorTree ──► RetainedSizes
//!  (arena)          (CSR out/in)       (idom per node)    (bytes per node)
//! ```
//!
//! Every stage works on dense [`ObjectIndex`](crate::model::ObjectIndex)
//! values and flat vectors. Traversals use explicit queues and stacks, never
//! recursion, so arbitrarily deep reference chains are safe.
//!
//! # Example
//!
//! ```
//! use heaplens::graph::{DominatorOptions, DominatorTree, ReferenceGraph, RetainedSizes, SUPER_ROOT};
//!
//! # fn main() -> heaplens::error::Result<()> {
//! // 0 -> 1 -> 2, rooted at 0
//! let graph = ReferenceGraph::from_edges(3, &[(0, 1), (1, 2)]);
//! let tree = DominatorTree::build(&graph, &[0], &DominatorOptions::default(), &mut Vec::new())?;
//! assert_eq!(tree.dominator(0), Some(SUPER_ROOT));
//! assert_eq!(tree.dominator(2), Some(1));
//!
//! let retained = RetainedSizes::compute(&tree, &[16, 24, 40]);
//! assert_eq!(retained.get(0), 80);
//! # Ok(())
//! # }
//! ```

pub mod dominator;
pub mod reference;
pub mod retained;

pub use dominator::{DominatorOptions, DominatorTree, SUPER_ROOT};
pub use reference::ReferenceGraph;
pub use retained::RetainedSizes;
