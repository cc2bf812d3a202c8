//! Approximate dominator tree
//!
//! Every GC root hangs directly off a virtual [`SUPER_ROOT`]. Objects
//! reachable from the roots are visited in breadth-first discovery order;
//! each takes as its immediate dominator the nearest common ancestor of the
//! dominator chains of its already-assigned referrers. Passes repeat until
//! the assignment is stable or the iteration cap is hit.
//!
//! The result is exact for trees and for most real heaps; on irreducible
//! reference patterns it may place an object higher than its true
//! dominator, which only ever moves retained bytes up the tree. Each object
//! has exactly one parent, so no byte is counted twice.

use super::ReferenceGraph;
use crate::analysis::CancellationToken;
use crate::error::{AnalysisWarning, HeapError, Result};
use crate::model::ObjectIndex;
use std::collections::VecDeque;

/// Virtual parent of every GC root
pub const SUPER_ROOT: ObjectIndex = ObjectIndex::MAX - 1;

/// Marks an object with no dominator (unreachable)
const UNASSIGNED: ObjectIndex = ObjectIndex::MAX;

/// Tunables for [`DominatorTree::build`]
#[derive(Debug, Clone)]
pub struct DominatorOptions {
    pub iteration_cap: usize,
    pub max_objects: usize,
    pub cancel: Option<CancellationToken>,
}

impl Default for DominatorOptions {
    fn default() -> Self {
        Self {
            iteration_cap: 16,
            max_objects: usize::MAX,
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DominatorTree {
    idom: Vec<ObjectIndex>,
    is_root: Vec<bool>,
    roots: Vec<ObjectIndex>,
    /// Reachable objects in discovery order
    reachable: Vec<ObjectIndex>,
    child_offsets: Vec<usize>,
    children: Vec<ObjectIndex>,
    top_level: Vec<ObjectIndex>,
    iterations: usize,
    converged: bool,
}

impl DominatorTree {
    /// Assign immediate dominators to every object reachable from `roots`
    pub fn build(
        graph: &ReferenceGraph,
        roots: &[ObjectIndex],
        options: &DominatorOptions,
        warnings: &mut Vec<AnalysisWarning>,
    ) -> Result<Self> {
        let n = graph.node_count();
        if n >= SUPER_ROOT as usize {
            return Err(HeapError::ResourceLimitExceeded {
                stage: "dominator tree",
                limit: SUPER_ROOT as usize - 1,
                actual: n,
            });
        }

        let mut roots: Vec<ObjectIndex> = roots
            .iter()
            .copied()
            .filter(|&r| (r as usize) < n)
            .collect();
        roots.sort_unstable();
        roots.dedup();

        let reachable = discover(graph, &roots);
        if reachable.len() > options.max_objects {
            return Err(HeapError::ResourceLimitExceeded {
                stage: "dominator tree",
                limit: options.max_objects,
                actual: reachable.len(),
            });
        }

        let mut is_root = vec![false; n];
        let mut idom = vec![UNASSIGNED; n];
        for &root in &roots {
            is_root[root as usize] = true;
            idom[root as usize] = SUPER_ROOT;
        }

        let mut in_reach = vec![false; n];
        for &node in &reachable {
            in_reach[node as usize] = true;
        }

        let mut meet = ChainMeet::new(n, reachable.len() + 1);
        let mut iterations = 0;
        let mut changed = 0;
        while iterations < options.iteration_cap {
            if let Some(token) = &options.cancel {
                token.check()?;
            }
            iterations += 1;
            changed = 0;

            for &node in &reachable {
                if is_root[node as usize] {
                    continue;
                }
                // The discovery parent always qualifies, so a candidate precedes
                // `node` in discovery order and chains cannot loop
                let preds = graph.incoming(node).iter().copied().filter(|&p| {
                    p != node && in_reach[p as usize] && idom[p as usize] != UNASSIGNED
                });
                let Some(candidate) = meet.nearest_common_ancestor(&idom, preds) else {
                    continue;
                };
                if candidate != node && candidate != idom[node as usize] {
                    idom[node as usize] = candidate;
                    changed += 1;
                }
            }

            tracing::debug!("Dominator pass {}: {} assignments changed", iterations, changed);
            if changed == 0 {
                break;
            }
        }

        let converged = changed == 0;
        if !converged {
            tracing::warn!(
                "Dominator assignment did not converge after {} passes ({} changes in last pass)",
                iterations,
                changed
            );
            warnings.push(AnalysisWarning::DominatorIterationCap {
                iterations,
                changed,
            });
        }

        let (child_offsets, children, top_level) = build_children(&idom, &reachable);
        Ok(Self {
            idom,
            is_root,
            roots,
            reachable,
            child_offsets,
            children,
            top_level,
            iterations,
            converged,
        })
    }

    pub fn len(&self) -> usize {
        self.idom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idom.is_empty()
    }

    /// Immediate dominator; `Some(SUPER_ROOT)` for roots, `None` if unreachable
    pub fn dominator(&self, node: ObjectIndex) -> Option<ObjectIndex> {
        match self.idom.get(node as usize) {
            Some(&UNASSIGNED) | None => None,
            Some(&d) => Some(d),
        }
    }

    pub fn is_reachable(&self, node: ObjectIndex) -> bool {
        self.dominator(node).is_some()
    }

    pub fn is_root(&self, node: ObjectIndex) -> bool {
        self.is_root.get(node as usize).copied().unwrap_or(false)
    }

    /// Distinct GC-root objects, ascending
    pub fn roots(&self) -> &[ObjectIndex] {
        &self.roots
    }

    /// Reachable objects in breadth-first discovery order
    pub fn reachable(&self) -> &[ObjectIndex] {
        &self.reachable
    }

    /// Objects immediately dominated by `node`
    pub fn children(&self, node: ObjectIndex) -> &[ObjectIndex] {
        if node == SUPER_ROOT {
            return &self.top_level;
        }
        let n = node as usize;
        &self.children[self.child_offsets[n]..self.child_offsets[n + 1]]
    }

    /// Objects immediately dominated by `SUPER_ROOT`
    pub fn top_level(&self) -> &[ObjectIndex] {
        &self.top_level
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        self.converged
    }
}

/// Breadth-first reachability from the sorted roots
fn discover(graph: &ReferenceGraph, roots: &[ObjectIndex]) -> Vec<ObjectIndex> {
    let mut seen = vec![false; graph.node_count()];
    let mut order = Vec::new();
    let mut queue = VecDeque::new();

    for &root in roots {
        if !seen[root as usize] {
            seen[root as usize] = true;
            queue.push_back(root);
        }
    }
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in graph.outgoing(node) {
            if !seen[next as usize] {
                seen[next as usize] = true;
                queue.push_back(next);
            }
        }
    }
    order
}

/// Nearest-common-ancestor search over dominator chains
///
/// Two walkers climb the chains alternately and stop at the first node the
/// other walker has already visited, so the cost is proportional to the
/// distance to the common ancestor rather than to the tree depth. Visits are
/// tracked with generation stamps so the mark array never needs clearing.
struct ChainMeet {
    mark: Vec<u32>,
    generation: u32,
    /// Maximum steps per walker before the chain collapses to `SUPER_ROOT`
    bound: usize,
}

impl ChainMeet {
    fn new(node_count: usize, bound: usize) -> Self {
        Self {
            mark: vec![0; node_count],
            generation: 0,
            bound,
        }
    }

    fn nearest_common_ancestor(
        &mut self,
        idom: &[ObjectIndex],
        mut preds: impl Iterator<Item = ObjectIndex>,
    ) -> Option<ObjectIndex> {
        let mut candidate = preds.next()?;
        for pred in preds {
            if candidate == SUPER_ROOT {
                break;
            }
            candidate = self.intersect(idom, candidate, pred);
        }
        Some(candidate)
    }

    fn next_generation(&mut self) -> (u32, u32) {
        if self.generation >= u32::MAX - 2 {
            self.mark.fill(0);
            self.generation = 0;
        }
        self.generation += 2;
        (self.generation - 1, self.generation)
    }

    fn intersect(&mut self, idom: &[ObjectIndex], a: ObjectIndex, b: ObjectIndex) -> ObjectIndex {
        if a == b {
            return a;
        }
        let (mark_a, mark_b) = self.next_generation();
        // (position, own stamp, other walker's stamp, still climbing)
        let mut walkers = [(a, mark_a, mark_b, true), (b, mark_b, mark_a, true)];

        for _ in 0..self.bound {
            for walker in walkers.iter_mut() {
                let (node, own, other, active) = *walker;
                if !active {
                    continue;
                }
                if node == SUPER_ROOT || node == UNASSIGNED {
                    walker.3 = false;
                    continue;
                }
                let stamp = self.mark[node as usize];
                if stamp == other {
                    return node;
                }
                if stamp == own {
                    // The chain loops back on itself
                    return SUPER_ROOT;
                }
                self.mark[node as usize] = own;
                walker.0 = idom[node as usize];
            }
            if !walkers[0].3 && !walkers[1].3 {
                return SUPER_ROOT;
            }
        }
        SUPER_ROOT
    }
}

/// CSR children map of the final assignment plus the `SUPER_ROOT` children
fn build_children(
    idom: &[ObjectIndex],
    reachable: &[ObjectIndex],
) -> (Vec<usize>, Vec<ObjectIndex>, Vec<ObjectIndex>) {
    let n = idom.len();
    let mut offsets = vec![0usize; n + 1];
    let mut top_level = Vec::new();

    for &node in reachable {
        match idom[node as usize] {
            SUPER_ROOT => top_level.push(node),
            UNASSIGNED => {}
            parent => offsets[parent as usize + 1] += 1,
        }
    }
    for i in 0..n {
        offsets[i + 1] += offsets[i];
    }

    let mut fill = offsets.clone();
    let mut children = vec![0 as ObjectIndex; offsets[n]];
    let mut ordered: Vec<ObjectIndex> = reachable.to_vec();
    ordered.sort_unstable();
    for node in ordered {
        let parent = idom[node as usize];
        if parent != SUPER_ROOT && parent != UNASSIGNED {
            children[fill[parent as usize]] = node;
            fill[parent as usize] += 1;
        }
    }
    top_level.sort_unstable();

    (offsets, children, top_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_meet_common_ancestor() {
        // 0 is top; 1 and 2 under 0; 3 under 1
        let idom = vec![SUPER_ROOT, 0, 0, 1];
        let mut meet = ChainMeet::new(4, 5);
        assert_eq!(meet.nearest_common_ancestor(&idom, [3, 2].into_iter()), Some(0));
        assert_eq!(meet.nearest_common_ancestor(&idom, [3, 1].into_iter()), Some(1));
        assert_eq!(meet.nearest_common_ancestor(&idom, [3].into_iter()), Some(3));
        assert_eq!(meet.nearest_common_ancestor(&idom, std::iter::empty()), None);
    }

    #[test]
    fn test_chain_meet_cycle_collapses_to_super_root() {
        // 1 and 2 point at each other and never reach the top
        let idom = vec![SUPER_ROOT, 2, 1];
        let mut meet = ChainMeet::new(3, 4);
        assert_eq!(
            meet.nearest_common_ancestor(&idom, [0, 1].into_iter()),
            Some(SUPER_ROOT)
        );
        assert_eq!(
            meet.nearest_common_ancestor(&idom, [1, 0].into_iter()),
            Some(SUPER_ROOT)
        );
    }

    #[test]
    fn test_chain_meet_bound_exhausted() {
        // 3 -> 2 -> 1 -> 0 needs more steps than the bound allows
        let idom = vec![SUPER_ROOT, 0, 1, 2, 0];
        let mut short = ChainMeet::new(5, 2);
        assert_eq!(
            short.nearest_common_ancestor(&idom, [3, 4].into_iter()),
            Some(SUPER_ROOT)
        );

        let mut long = ChainMeet::new(5, 6);
        assert_eq!(long.nearest_common_ancestor(&idom, [3, 4].into_iter()), Some(0));
    }
}
