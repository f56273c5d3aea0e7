//! Standard UCT Monte Carlo Tree Search.
//!
//! Each (node, action) pair may be expanded up to `samples_per_action`
//! times. Selection descends by UCT through nodes that have nothing left to
//! expand, and every new child's score is backpropagated to the root.

use rand_chacha::ChaCha20Rng;
use std::collections::BTreeMap;

use crate::bayes::SamplingError;
use crate::config::StandardParams;
use crate::node::NodeId;
use crate::search::{NodeMetric, Plan, Policy};
use crate::tree::SearchTree;

#[derive(Debug, Clone)]
pub struct StandardMcts {
    params: StandardParams,
    rng: ChaCha20Rng,
    visits: Vec<u32>,
    value_sums: Vec<f64>,
    /// Invocations per (node, action), empty results included
    expansions: BTreeMap<(NodeId, String), u32>,
}

impl StandardMcts {
    pub fn new(params: StandardParams, rng: ChaCha20Rng) -> Self {
        Self {
            params,
            rng,
            visits: vec![0],
            value_sums: vec![0.0],
            expansions: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &StandardParams {
        &self.params
    }

    pub fn visits(&self, id: NodeId) -> u32 {
        self.visits.get(id.index()).copied().unwrap_or(0)
    }

    /// Mean backpropagated score, None if never visited.
    pub fn mean_value(&self, id: NodeId) -> Option<f64> {
        let n = self.visits(id);
        (n > 0).then(|| self.value_sums[id.index()] / n as f64)
    }

    fn expansions(&self, id: NodeId, action: &str) -> u32 {
        self.expansions
            .get(&(id, action.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Least-expanded action still under budget; ties go to the earliest name.
    fn next_action<'a>(&self, id: NodeId, actions: &'a [String]) -> Option<&'a str> {
        actions
            .iter()
            .map(|a| (a.as_str(), self.expansions(id, a)))
            .filter(|(_, n)| *n < self.params.samples_per_action)
            .min_by_key(|(_, n)| *n)
            .map(|(a, _)| a)
    }

    /// UCT value of `child` under a parent with `parent_visits`.
    pub fn uct(&self, child: NodeId, parent_visits: u32) -> f64 {
        let n = self.visits(child);
        if n == 0 {
            return f64::INFINITY;
        }
        let mean = self.value_sums[child.index()] / n as f64;
        let exploration = ((parent_visits.max(1) as f64).ln() / n as f64).sqrt();
        mean + self.params.exploration_weight * exploration
    }
}

impl Policy for StandardMcts {
    fn rng(&self) -> &ChaCha20Rng {
        &self.rng
    }

    fn set_rng(&mut self, rng: ChaCha20Rng) {
        self.rng = rng;
    }

    fn plan(
        &self,
        tree: &SearchTree,
        actions: &[String],
        _rng: &mut ChaCha20Rng,
    ) -> Result<Option<Plan>, SamplingError> {
        let alive = tree.alive_mask(|id| self.next_action(id, actions).is_some());
        if !alive[NodeId::ROOT.index()] {
            return Ok(None);
        }

        let mut current = tree.root();
        let mut path = vec![current];
        loop {
            if let Some(action) = self.next_action(current, actions) {
                return Ok(Some(Plan::new(current, action, path)));
            }
            let parent_visits = self.visits(current);
            let best = tree
                .children(current)
                .iter()
                .filter(|c| alive[c.index()])
                .map(|&c| (c, self.uct(c, parent_visits)))
                .fold(None, |best: Option<(NodeId, f64)>, (c, v)| match best {
                    Some((_, b)) if b >= v => best,
                    _ => Some((c, v)),
                });
            match best {
                Some((child, _)) => {
                    path.push(child);
                    current = child;
                }
                None => return Ok(None),
            }
        }
    }

    fn commit(&mut self, tree: &SearchTree, plan: &Plan, added: &[NodeId]) {
        *self
            .expansions
            .entry((plan.node, plan.action.clone()))
            .or_insert(0) += 1;

        self.visits.resize(tree.len(), 0);
        self.value_sums.resize(tree.len(), 0.0);
        for &child in added {
            let score = tree.node(child).score.unwrap_or(0.0);
            self.visits[child.index()] += 1;
            self.value_sums[child.index()] += score;
            for &ancestor in &plan.path {
                self.visits[ancestor.index()] += 1;
                self.value_sums[ancestor.index()] += score;
            }
        }
    }

    fn metrics(&self, tree: &SearchTree, id: NodeId) -> Vec<NodeMetric> {
        let visits = self.visits(id);
        let mean = self
            .mean_value(id)
            .map(|m| format!("{m:.3}"))
            .unwrap_or_else(|| "N/A".into());
        let uct = tree
            .get(id)
            .and_then(|n| n.parent)
            .filter(|_| visits > 0)
            .map(|p| format!("{:.3}", self.uct(id, self.visits(p))))
            .unwrap_or_else(|| "N/A".into());
        vec![
            NodeMetric::new("visits", "Visits", visits.to_string()),
            NodeMetric::new("mean", "Mean (Exploitation)", mean),
            NodeMetric::new("uct_score", "UCT Score", uct),
        ]
    }
}
