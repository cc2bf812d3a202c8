//! Retained sizes over the dominator tree

use super::dominator::{DominatorTree, SUPER_ROOT};
use crate::model::ObjectIndex;

/// Bytes that would be freed if each object became unreachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedSizes {
    sizes: Vec<u64>,
}

impl RetainedSizes {
    /// `retained(o) = shallow(o) + Σ retained(c)` over dominator children
    ///
    /// Objects outside the tree keep their shallow size.
    pub fn compute(tree: &DominatorTree, shallow: &[u64]) -> Self {
        let mut sizes = shallow.to_vec();
        let mut visited = vec![false; sizes.len()];
        // (node, children already pushed)
        let mut stack: Vec<(ObjectIndex, bool)> = tree
            .children(SUPER_ROOT)
            .iter()
            .rev()
            .map(|&top| (top, false))
            .collect();

        while let Some((node, expanded)) = stack.pop() {
            let n = node as usize;
            if expanded {
                let total = tree
                    .children(node)
                    .iter()
                    .fold(sizes[n], |acc, &child| acc.saturating_add(sizes[child as usize]));
                sizes[n] = total;
                continue;
            }
            if visited[n] {
                continue;
            }
            visited[n] = true;
            stack.push((node, true));
            for &child in tree.children(node) {
                if !visited[child as usize] {
                    stack.push((child, false));
                }
            }
        }

        Self { sizes }
    }

    pub fn get(&self, node: ObjectIndex) -> u64 {
        self.sizes[node as usize]
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.sizes
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Sum over the top-level objects, i.e. everything reachable
    pub fn total_reachable(&self, tree: &DominatorTree) -> u64 {
        tree.top_level()
            .iter()
            .fold(0u64, |acc, &top| acc.saturating_add(self.get(top)))
    }
}
