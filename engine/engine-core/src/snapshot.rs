//! Tree adapter: read-only views over a session's search tree.

use mcts::{NodeId, NodeMetric, SearchAlgorithm, SearchTree, TreeNode};
use serde::Serialize;
use serde_json::Value;

/// One node as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: u32,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    pub depth: u32,
    /// Expansion function that produced the node (None for the root)
    pub action: Option<String>,
    /// None only for the root
    pub state: Option<Value>,
    pub score: Option<f64>,
    pub is_root: bool,
    pub created_step: u64,
    pub metrics: Vec<NodeMetric>,
}

impl NodeView {
    fn new(node: &TreeNode, metrics: Vec<NodeMetric>) -> Self {
        Self {
            id: node.id.0,
            parent: node.parent.map(|p| p.0),
            children: node.children.iter().map(|c| c.0).collect(),
            depth: node.depth,
            action: node.action.clone(),
            state: node.state.clone(),
            score: node.score,
            is_root: node.is_root(),
            created_step: node.created_step,
            metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateScore {
    pub state: Value,
    pub score: f64,
}

/// Every node of a tree, breadth-first from the root.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeSnapshot {
    pub nodes: Vec<NodeView>,
    /// `(state, score)` for every scored node, in the same order as `nodes`
    pub state_score_pairs: Vec<StateScore>,
}

impl TreeSnapshot {
    pub fn edge_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn max_depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Observed `(min, max)` over scored nodes.
    pub fn score_bounds(&self) -> Option<(f64, f64)> {
        self.state_score_pairs.iter().fold(None, |acc, p| match acc {
            None => Some((p.score, p.score)),
            Some((lo, hi)) => Some((lo.min(p.score), hi.max(p.score))),
        })
    }
}

/// One entry of a ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedNode {
    pub node_id: u32,
    pub state: Value,
    pub score: f64,
    pub depth: u32,
    pub action: Option<String>,
}

/// Walk `tree` breadth-first and collect nodes with their algorithm metrics.
///
/// The output depends only on the tree and the algorithm statistics, so two
/// calls with no step in between are identical.
pub fn extract(tree: &SearchTree, algorithm: &SearchAlgorithm) -> TreeSnapshot {
    let order = tree.breadth_first();
    let mut nodes = Vec::with_capacity(order.len());
    let mut state_score_pairs = Vec::with_capacity(order.len().saturating_sub(1));
    for id in order {
        let Some(node) = tree.get(id) else {
            continue;
        };
        if let (Some(state), Some(score)) = (&node.state, node.score) {
            state_score_pairs.push(StateScore {
                state: state.clone(),
                score,
            });
        }
        nodes.push(NodeView::new(node, algorithm.node_metrics(tree, id)));
    }
    TreeSnapshot {
        nodes,
        state_score_pairs,
    }
}

/// Scored nodes sorted by score descending, ties by insertion order.
fn sort_by_score(tree: &SearchTree) -> Vec<NodeId> {
    let mut scored: Vec<(NodeId, f64)> = tree
        .breadth_first()
        .into_iter()
        .filter_map(|id| tree.get(id).and_then(|n| n.score).map(|s| (id, s)))
        .collect();
    scored.sort_by(|(id_a, a), (id_b, b)| b.total_cmp(a).then(id_a.cmp(id_b)));
    scored.into_iter().map(|(id, _)| id).collect()
}

/// The best `k` scored nodes.
///
/// Uses the algorithm's own ranking when it has one, otherwise sorts by
/// score. The root is never ranked.
pub fn rank(tree: &SearchTree, algorithm: &SearchAlgorithm, k: usize) -> Vec<RankedNode> {
    let ids = algorithm
        .top_k(tree, k)
        .unwrap_or_else(|| sort_by_score(tree).into_iter().take(k).collect());
    ids.into_iter()
        .filter_map(|id| {
            let node = tree.get(id)?;
            Some(RankedNode {
                node_id: id.0,
                state: node.state.clone()?,
                score: node.score?,
                depth: node.depth,
                action: node.action.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcts::{AlgorithmParams, FnExpander, StandardParams, Successor};
    use serde_json::json;

    fn grown(kind_params: AlgorithmParams, steps: usize) -> (SearchTree, SearchAlgorithm) {
        let mut algo = SearchAlgorithm::init(kind_params, 7).unwrap();
        let mut tree = SearchTree::new();
        let mut expander = FnExpander(|_: &str, state: Option<&Value>| match state {
            None => vec![
                Successor::new(json!("a"), 0.2),
                Successor::new(json!("b"), 0.9),
                Successor::new(json!("c"), 0.2),
            ],
            Some(Value::String(s)) if s.len() < 3 => {
                vec![Successor::new(json!(format!("{s}x")), 0.5)]
            }
            _ => vec![],
        });
        let actions = vec!["expand".to_string()];
        for _ in 0..steps {
            algo.step(&mut tree, &actions, &mut expander).unwrap();
        }
        (tree, algo)
    }

    fn standard() -> AlgorithmParams {
        AlgorithmParams::Standard(StandardParams::default())
    }

    #[test]
    fn test_extract_is_breadth_first() {
        let (tree, algo) = grown(standard(), 4);
        let snapshot = extract(&tree, &algo);
        assert_eq!(snapshot.nodes.len(), tree.len());
        assert!(snapshot.nodes[0].is_root);
        assert_eq!(snapshot.nodes[0].state, None);
        let depths: Vec<u32> = snapshot.nodes.iter().map(|n| n.depth).collect();
        assert!(depths.windows(2).all(|w| w[0] <= w[1]));
        assert!(snapshot
            .nodes
            .windows(2)
            .all(|w| (w[0].depth, w[0].id) < (w[1].depth, w[1].id)));
        assert_eq!(snapshot.state_score_pairs.len(), tree.non_root_len());
        assert_eq!(snapshot.state_score_pairs[0].state, json!("a"));
        assert!(!snapshot.nodes[0].metrics.is_empty());
    }

    #[test]
    fn test_extract_is_deterministic() {
        let (tree, algo) = grown(standard(), 5);
        assert_eq!(extract(&tree, &algo), extract(&tree, &algo));
    }

    #[test]
    fn test_rank_sorts_descending_with_ties_by_id() {
        let (tree, algo) = grown(standard(), 1);
        let ranked = rank(&tree, &algo, 10);
        let states: Vec<&Value> = ranked.iter().map(|r| &r.state).collect();
        assert_eq!(states, vec![&json!("b"), &json!("a"), &json!("c")]);
        assert!(ranked[1].node_id < ranked[2].node_id);
    }

    #[test]
    fn test_rank_truncates_and_covers_every_scored_node() {
        let (tree, algo) = grown(standard(), 6);
        assert_eq!(rank(&tree, &algo, 1).len(), 1);
        let all = rank(&tree, &algo, 1000);
        assert_eq!(all.len(), tree.non_root_len());
        assert!(all.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_rank_uses_builtin_ranking_when_available() {
        let params = AlgorithmParams::AbMctsA(Default::default());
        let (tree, algo) = grown(params, 3);
        let ranked = rank(&tree, &algo, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].score, 0.9);
    }

    #[test]
    fn test_root_only_tree_ranks_nothing() {
        let (tree, algo) = grown(standard(), 0);
        assert!(rank(&tree, &algo, 5).is_empty());
        let snapshot = extract(&tree, &algo);
        assert_eq!(snapshot.score_bounds(), None);
        assert_eq!(snapshot.edge_count(), 0);
    }
}
