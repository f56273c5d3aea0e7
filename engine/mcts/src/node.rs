//! Search tree node representation.
//!
//! Each node holds a user-defined state produced by an expansion function,
//! the score that function assigned to it, and its position in the arena.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Index into the node arena. Using a newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in the search tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,

    /// Parent node index (None for root)
    pub parent: Option<NodeId>,

    /// State produced by the expansion function. None only for the root,
    /// which stands for "no state yet" and is never a JSON value.
    pub state: Option<Value>,

    /// Score assigned by the expansion function (None for root)
    pub score: Option<f64>,

    /// Name of the expansion function that produced this node
    pub action: Option<String>,

    /// Distance from the root
    pub depth: u32,

    /// Step generation in which this node was added (0 for root)
    pub created_step: u64,

    /// Child ids in insertion order
    pub children: Vec<NodeId>,
}

impl TreeNode {
    pub(crate) fn new_root() -> Self {
        Self {
            id: NodeId::ROOT,
            parent: None,
            state: None,
            score: None,
            action: None,
            depth: 0,
            created_step: 0,
            children: Vec::new(),
        }
    }

    pub(crate) fn new_child(
        id: NodeId,
        parent: &TreeNode,
        action: &str,
        state: Value,
        score: f64,
        created_step: u64,
    ) -> Self {
        Self {
            id,
            parent: Some(parent.id),
            state: Some(state),
            score: Some(score),
            action: Some(action.to_string()),
            depth: parent.depth + 1,
            created_step,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_node_id_root() {
        assert!(NodeId::ROOT.is_root());
        assert!(!NodeId(3).is_root());
        assert_eq!(NodeId(7).index(), 7);
        assert_eq!(NodeId(7).to_string(), "7");
    }

    #[test]
    fn test_new_root() {
        let root = TreeNode::new_root();
        assert!(root.is_root());
        assert!(root.is_leaf());
        assert!(root.state.is_none());
        assert!(root.score.is_none());
        assert_eq!(root.depth, 0);
    }

    #[test]
    fn test_new_child() {
        let root = TreeNode::new_root();
        let child = TreeNode::new_child(NodeId(1), &root, "expand", json!("a"), 0.25, 1);
        assert_eq!(child.parent, Some(NodeId::ROOT));
        assert_eq!(child.depth, 1);
        assert_eq!(child.action.as_deref(), Some("expand"));
        assert_eq!(child.state, Some(json!("a")));
        assert!((child.score.unwrap() - 0.25).abs() < 1e-12);
        assert!(!child.is_root());
    }
}
