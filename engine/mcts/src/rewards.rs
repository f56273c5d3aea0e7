//! Score bookkeeping shared by the AB-MCTS policies.

use std::collections::{BTreeMap, BTreeSet};

use crate::node::NodeId;
use crate::search::Plan;
use crate::tree::SearchTree;

#[derive(Debug, Clone, Default)]
pub(crate) struct RewardStore {
    /// Per node: action -> scores of direct children generated by it
    generated: Vec<BTreeMap<String, Vec<f64>>>,
    /// Per node: every score in its subtree, itself included
    subtree: Vec<Vec<f64>>,
    /// Tree-wide scores per action
    by_action: BTreeMap<String, Vec<f64>>,
    /// (node, action) pairs whose expansion came back empty
    closed: BTreeSet<(NodeId, String)>,
}

impl RewardStore {
    pub fn generated(&self, node: NodeId, action: &str) -> &[f64] {
        self.generated
            .get(node.index())
            .and_then(|m| m.get(action))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn generated_all(&self, node: NodeId) -> Vec<f64> {
        self.generated
            .get(node.index())
            .map(|m| m.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn generated_actions(&self, node: NodeId) -> Vec<&str> {
        self.generated
            .get(node.index())
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn subtree(&self, node: NodeId) -> &[f64] {
        self.subtree
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn by_action(&self, action: &str) -> &[f64] {
        self.by_action
            .get(action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_scores(&self) -> Vec<f64> {
        self.by_action.values().flatten().copied().collect()
    }

    pub fn is_open(&self, node: NodeId, action: &str) -> bool {
        !self.closed.contains(&(node, action.to_string()))
    }

    pub fn open_actions<'a>(&self, node: NodeId, actions: &'a [String]) -> Vec<&'a str> {
        actions
            .iter()
            .map(String::as_str)
            .filter(|a| self.is_open(node, a))
            .collect()
    }

    pub fn has_open(&self, node: NodeId, actions: &[String]) -> bool {
        actions.iter().any(|a| self.is_open(node, a))
    }

    /// Record the outcome of one committed expansion.
    pub fn record(&mut self, tree: &SearchTree, plan: &Plan, added: &[NodeId]) {
        if self.generated.len() < tree.len() {
            self.generated.resize_with(tree.len(), BTreeMap::new);
            self.subtree.resize_with(tree.len(), Vec::new);
        }
        if added.is_empty() {
            self.closed.insert((plan.node, plan.action.clone()));
            return;
        }
        let ancestors = tree.path_from_root(plan.node);
        for &child in added {
            let Some(score) = tree.get(child).and_then(|n| n.score) else {
                continue;
            };
            self.generated[plan.node.index()]
                .entry(plan.action.clone())
                .or_default()
                .push(score);
            self.by_action
                .entry(plan.action.clone())
                .or_default()
                .push(score);
            self.subtree[child.index()].push(score);
            for &ancestor in &ancestors {
                self.subtree[ancestor.index()].push(score);
            }
        }
    }
}

pub(crate) fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(xs.iter().sum::<f64>() / xs.len() as f64)
    }
}

pub(crate) fn variance(xs: &[f64]) -> Option<f64> {
    let m = mean(xs)?;
    if xs.len() < 2 {
        return None;
    }
    Some(xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64)
}

/// UCB1 pick over actions using tree-wide scores. Unseen actions go first.
pub(crate) fn ucb_action<'a>(store: &RewardStore, candidates: &[&'a str]) -> Option<&'a str> {
    if let Some(unseen) = candidates.iter().find(|a| store.by_action(a).is_empty()) {
        return Some(*unseen);
    }
    let total: usize = candidates.iter().map(|a| store.by_action(a).len()).sum();
    let ln_total = (total.max(1) as f64).ln();
    candidates
        .iter()
        .map(|a| {
            let scores = store.by_action(a);
            let n = scores.len() as f64;
            let m = mean(scores).unwrap_or(0.0);
            (*a, m + (2.0 * ln_total / n).sqrt())
        })
        .fold(None, |best: Option<(&str, f64)>, (a, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((a, v)),
        })
        .map(|(a, _)| a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_tracks_subtrees_and_actions() {
        let mut tree = SearchTree::new();
        let mut store = RewardStore::default();

        let a = tree.add_child(NodeId::ROOT, "f", json!(1), 0.4);
        let plan = Plan::new(NodeId::ROOT, "f", vec![NodeId::ROOT]);
        store.record(&tree, &plan, &[a]);

        let b = tree.add_child(a, "g", json!(2), 0.8);
        let plan = Plan::new(a, "g", vec![NodeId::ROOT, a]);
        store.record(&tree, &plan, &[b]);

        assert_eq!(store.generated(NodeId::ROOT, "f"), &[0.4]);
        assert_eq!(store.generated(a, "g"), &[0.8]);
        assert_eq!(store.subtree(NodeId::ROOT), &[0.4, 0.8]);
        assert_eq!(store.subtree(a), &[0.4, 0.8]);
        assert_eq!(store.subtree(b), &[0.8]);
        assert_eq!(store.by_action("g"), &[0.8]);
        assert_eq!(store.all_scores().len(), 2);
    }

    #[test]
    fn test_empty_expansion_closes_pair() {
        let tree = SearchTree::new();
        let mut store = RewardStore::default();
        let actions = vec!["f".to_string(), "g".to_string()];

        store.record(&tree, &Plan::new(NodeId::ROOT, "f", vec![NodeId::ROOT]), &[]);
        assert!(!store.is_open(NodeId::ROOT, "f"));
        assert_eq!(store.open_actions(NodeId::ROOT, &actions), vec!["g"]);
        assert!(store.has_open(NodeId::ROOT, &actions));
    }

    #[test]
    fn test_ucb_prefers_unseen_then_best() {
        let mut tree = SearchTree::new();
        let mut store = RewardStore::default();
        let a = tree.add_child(NodeId::ROOT, "f", json!(1), 0.9);
        store.record(&tree, &Plan::new(NodeId::ROOT, "f", vec![NodeId::ROOT]), &[a]);

        assert_eq!(ucb_action(&store, &["f", "g"]), Some("g"));

        let b = tree.add_child(NodeId::ROOT, "g", json!(2), 0.1);
        store.record(&tree, &Plan::new(NodeId::ROOT, "g", vec![NodeId::ROOT]), &[b]);
        assert_eq!(ucb_action(&store, &["f", "g"]), Some("f"));
    }

    #[test]
    fn test_mean_and_variance() {
        assert_eq!(mean(&[]), None);
        assert!((mean(&[1.0, 3.0]).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(variance(&[1.0]), None);
        assert!((variance(&[1.0, 3.0]).unwrap() - 2.0).abs() < 1e-12);
    }
}
