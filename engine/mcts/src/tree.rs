//! Search tree structure with arena allocation.
//!
//! Nodes are stored in a contiguous Vec and referenced by NodeId indices.
//! A child is always allocated after its parent, so every child id is
//! greater than its parent's id.

use serde_json::Value;

use crate::node::{NodeId, TreeNode};

/// Search tree with arena-based node storage.
#[derive(Debug, Clone)]
pub struct SearchTree {
    /// Arena storing all nodes; index 0 is the root
    nodes: Vec<TreeNode>,

    /// Number of committed steps that mutated this tree
    generation: u64,
}

impl Default for SearchTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchTree {
    /// Create a tree holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode::new_root()],
            generation: 0,
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.index())
    }

    /// Get a node that is known to exist (ids handed out by this tree).
    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.index()]
    }

    /// Total number of nodes, root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: the root is created with the tree.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes excluding the root.
    #[inline]
    pub fn non_root_len(&self) -> usize {
        self.nodes.len() - 1
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// All nodes in insertion order.
    #[inline]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Ids from the root down to `id` (inclusive).
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.get(id).map(|n| n.id);
        while let Some(node_id) = current {
            path.push(node_id);
            current = self.node(node_id).parent;
        }
        path.reverse();
        path
    }

    /// Nodes level by level from the root; within a level, insertion order.
    pub fn breadth_first(&self) -> Vec<NodeId> {
        // The arena is in insertion order, so a stable sort by depth suffices
        let mut order: Vec<&TreeNode> = self.nodes.iter().collect();
        order.sort_by_key(|node| node.depth);
        order.into_iter().map(|node| node.id).collect()
    }

    /// For every node, whether it or any descendant satisfies `expandable`.
    ///
    /// Children always have larger ids than their parents, so one reverse
    /// sweep over the arena is enough.
    pub fn alive_mask(&self, expandable: impl Fn(NodeId) -> bool) -> Vec<bool> {
        let mut alive = vec![false; self.nodes.len()];
        for node in self.nodes.iter().rev() {
            let i = node.id.index();
            alive[i] = alive[i] || expandable(node.id);
            if alive[i] {
                if let Some(parent) = node.parent {
                    alive[parent.index()] = true;
                }
            }
        }
        alive
    }

    /// Attach a scored successor under `parent`. Only the search policies
    /// mutate the tree, and only while committing a step.
    pub(crate) fn add_child(
        &mut self,
        parent: NodeId,
        action: &str,
        state: Value,
        score: f64,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let child = TreeNode::new_child(
            id,
            self.node(parent),
            action,
            state,
            score,
            self.generation + 1,
        );
        self.nodes.push(child);
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Scored nodes sorted by score descending, ties by insertion order.
    pub fn ranked_by_score(&self) -> Vec<NodeId> {
        let mut scored: Vec<(NodeId, f64)> = self
            .nodes
            .iter()
            .filter_map(|n| n.score.map(|s| (n.id, s)))
            .collect();
        scored.sort_by(|(id_a, a), (id_b, b)| b.total_cmp(a).then(id_a.cmp(id_b)));
        scored.into_iter().map(|(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> SearchTree {
        // root -> a(0.2) -> c(0.9)
        //      -> b(0.5)
        let mut tree = SearchTree::new();
        let a = tree.add_child(NodeId::ROOT, "f", json!("a"), 0.2);
        tree.add_child(NodeId::ROOT, "f", json!("b"), 0.5);
        tree.add_child(a, "g", json!("c"), 0.9);
        tree
    }

    #[test]
    fn test_new_tree() {
        let tree = SearchTree::new();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.non_root_len(), 0);
        assert!(!tree.is_empty());
        assert!(tree.get(tree.root()).unwrap().is_root());
    }

    #[test]
    fn test_add_child_links_parent() {
        let tree = sample_tree();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.children(NodeId::ROOT), &[NodeId(1), NodeId(2)]);
        assert_eq!(tree.children(NodeId(1)), &[NodeId(3)]);
        assert_eq!(tree.get(NodeId(3)).unwrap().depth, 2);
        assert!(tree.get(NodeId(9)).is_none());
    }

    #[test]
    fn test_breadth_first_order() {
        let tree = sample_tree();
        assert_eq!(
            tree.breadth_first(),
            vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3)]
        );
    }

    #[test]
    fn test_breadth_first_levels_follow_insertion_order() {
        // root -> a(1) -> c(3), e(5)
        //      -> b(2) -> d(4)
        let mut tree = SearchTree::new();
        let a = tree.add_child(NodeId::ROOT, "f", json!("a"), 0.1);
        let b = tree.add_child(NodeId::ROOT, "f", json!("b"), 0.2);
        tree.add_child(a, "f", json!("c"), 0.3);
        tree.add_child(b, "f", json!("d"), 0.4);
        tree.add_child(a, "f", json!("e"), 0.5);
        assert_eq!(
            tree.breadth_first(),
            vec![NodeId(0), NodeId(1), NodeId(2), NodeId(3), NodeId(4), NodeId(5)]
        );
    }

    #[test]
    fn test_path_from_root() {
        let tree = sample_tree();
        assert_eq!(
            tree.path_from_root(NodeId(3)),
            vec![NodeId(0), NodeId(1), NodeId(3)]
        );
        assert_eq!(tree.path_from_root(NodeId::ROOT), vec![NodeId(0)]);
    }

    #[test]
    fn test_alive_mask_propagates_to_ancestors() {
        let tree = sample_tree();
        let alive = tree.alive_mask(|id| id == NodeId(3));
        assert_eq!(alive, vec![true, true, false, true]);

        let none = tree.alive_mask(|_| false);
        assert!(none.iter().all(|a| !a));
    }

    #[test]
    fn test_ranked_by_score() {
        let mut tree = sample_tree();
        tree.add_child(NodeId(2), "f", json!("d"), 0.5);
        assert_eq!(
            tree.ranked_by_score(),
            vec![NodeId(3), NodeId(2), NodeId(4), NodeId(1)]
        );
    }
}
