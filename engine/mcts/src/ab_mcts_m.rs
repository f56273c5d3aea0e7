//! Adaptive-branching MCTS with a pooled ("mixed") reward model (AB-MCTS-M).
//!
//! Every GEN and CONT option gets a Gaussian posterior whose prior is
//! estimated from all scores the same action produced anywhere in the tree,
//! so sparse local evidence is shrunk toward the action's tree-wide
//! behaviour. Children whose subtrees keep returning the same score can be
//! pruned from CONT.

use rand_chacha::ChaCha20Rng;

use crate::bayes::{argmax, GaussianPrior, Posterior, SamplingError};
use crate::config::{AbMctsMParams, SelectionStrategy};
use crate::node::NodeId;
use crate::rewards::{mean, ucb_action, variance, RewardStore};
use crate::search::{NodeMetric, Plan, Policy};
use crate::tree::SearchTree;

const MIN_POOLED_VARIANCE: f64 = 1e-3;
const DEFAULT_POOLED_VARIANCE: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct AbMctsM {
    params: AbMctsMParams,
    rng: ChaCha20Rng,
    store: RewardStore,
}

#[derive(Debug, Clone, Copy)]
/// One selectable option at a node.
enum Arm<'a> {
    Gen(&'a str),
    SharedGen,
    Cont(NodeId),
}

impl AbMctsM {
    pub fn new(params: AbMctsMParams, rng: ChaCha20Rng) -> Self {
        Self {
            params,
            rng,
            store: RewardStore::default(),
        }
    }

    pub fn params(&self) -> &AbMctsMParams {
        &self.params
    }

    fn pooled_prior(&self, pool: &[f64], fallback_mean: f64) -> GaussianPrior {
        GaussianPrior {
            m: mean(pool).unwrap_or(fallback_mean),
            kappa: 1.0,
            nu: 1.0,
            tau_square: variance(pool)
                .unwrap_or(DEFAULT_POOLED_VARIANCE)
                .max(MIN_POOLED_VARIANCE),
        }
    }

    /// Local evidence for `action`, shrunk toward its tree-wide scores.
    pub fn posterior(&self, action: &str, obs: &[f64]) -> Posterior {
        let fallback = self.params.reward_average_priors.for_action(action);
        Posterior::gaussian(self.pooled_prior(self.store.by_action(action), fallback), obs)
    }

    /// Whether `id`'s subtree is large and uniform enough to stop exploring.
    pub fn is_prunable(&self, id: NodeId) -> bool {
        if !self.params.enable_pruning || id.is_root() {
            return false;
        }
        let scores = self.store.subtree(id);
        if scores.len() < self.params.min_subtree_size_for_pruning as usize {
            return false;
        }
        let most_common = scores
            .iter()
            .map(|s| scores.iter().filter(|t| t.to_bits() == s.to_bits()).count())
            .max()
            .unwrap_or(0);
        most_common as f64 / scores.len() as f64 >= self.params.same_score_proportion_threshold
    }

    fn alive(&self, tree: &SearchTree, actions: &[String]) -> Vec<bool> {
        let mut alive = vec![false; tree.len()];
        for node in tree.nodes().iter().rev() {
            let i = node.id.index();
            alive[i] = self.store.has_open(node.id, actions)
                || node
                    .children
                    .iter()
                    .any(|c| alive[c.index()] && !self.is_prunable(*c));
        }
        alive
    }

    fn child_action<'t>(tree: &'t SearchTree, child: NodeId) -> &'t str {
        tree.node(child).action.as_deref().unwrap_or("")
    }
}

impl Policy for AbMctsM {
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
        rng: &mut ChaCha20Rng,
    ) -> Result<Option<Plan>, SamplingError> {
        let alive = self.alive(tree, actions);
        if !alive[NodeId::ROOT.index()] {
            return Ok(None);
        }
        let shared = self.params.model_selection_strategy != SelectionStrategy::Stack;

        let mut current = tree.root();
        let mut path = vec![current];
        loop {
            let open = self.store.open_actions(current, actions);
            let mut options: Vec<Arm> = Vec::new();
            let mut samples = Vec::new();

            if shared {
                if !open.is_empty() {
                    let all = self.store.all_scores();
                    let fallback = self.params.reward_average_priors.for_action(open[0]);
                    let post = Posterior::gaussian(
                        self.pooled_prior(&all, fallback),
                        &self.store.generated_all(current),
                    );
                    options.push(Arm::SharedGen);
                    samples.push(post.sample(rng)?);
                }
            } else {
                for &action in &open {
                    options.push(Arm::Gen(action));
                    let post = self.posterior(action, self.store.generated(current, action));
                    samples.push(post.sample(rng)?);
                }
            }
            for &child in tree.children(current) {
                if alive[child.index()] && !self.is_prunable(child) {
                    options.push(Arm::Cont(child));
                    let post =
                        self.posterior(Self::child_action(tree, child), self.store.subtree(child));
                    samples.push(post.sample(rng)?);
                }
            }

            let Some(best) = argmax(&samples).map(|i| options[i]) else {
                return Ok(None);
            };
            let action = match best {
                Arm::Gen(action) => action,
                Arm::SharedGen => {
                    let picked = if self.params.model_selection_strategy
                        == SelectionStrategy::MultiarmBanditUcb
                    {
                        ucb_action(&self.store, &open)
                    } else {
                        let draws = open
                            .iter()
                            .map(|a| self.posterior(a, self.store.by_action(a)).sample(rng))
                            .collect::<Result<Vec<_>, _>>()?;
                        argmax(&draws).map(|i| open[i])
                    };
                    match picked {
                        Some(a) => a,
                        None => return Ok(None),
                    }
                }
                Arm::Cont(child) => {
                    path.push(child);
                    current = child;
                    continue;
                }
            };
            return Ok(Some(Plan::new(current, action, path)));
        }
    }

    fn commit(&mut self, tree: &SearchTree, plan: &Plan, added: &[NodeId]) {
        self.store.record(tree, plan, added);
    }

    fn metrics(&self, tree: &SearchTree, id: NodeId) -> Vec<NodeMetric> {
        let ln_total = (self.store.generated_all(id).len().max(1) as f64).ln();
        let by_action = self
            .store
            .generated_actions(id)
            .into_iter()
            .map(|a| {
                let scores = self.store.generated(id, a);
                let n = scores.len() as f64;
                let m = mean(scores).unwrap_or(0.0);
                let ucb = m + (2.0 * ln_total / n).sqrt();
                format!("{a}: len={}, mean={m:.3}, ucb={ucb:.3}", scores.len())
            })
            .collect::<Vec<_>>();
        let by_child = tree
            .children(id)
            .iter()
            .map(|&c| {
                let scores = self.store.subtree(c);
                let m = mean(scores).map(|m| format!("{m:.3}")).unwrap_or_else(|| "N/A".into());
                format!("{c}: len={}, mean={m}", scores.len())
            })
            .collect::<Vec<_>>();
        let or_na = |v: Vec<String>| {
            if v.is_empty() {
                "N/A".to_string()
            } else {
                v.join("; ")
            }
        };
        vec![
            NodeMetric::new("prunable", "Prunable", self.is_prunable(id).to_string()),
            NodeMetric::new("rewards_by_action", "Rewards by Action", or_na(by_action)),
            NodeMetric::new("rewards_by_child", "Rewards by Child", or_na(by_child)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlgorithmParams;
    use crate::expander::{FnExpander, Successor};
    use crate::search::SearchAlgorithm;
    use serde_json::{json, Value};

    fn names(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn grow(
        params: AbMctsMParams,
        actions: &[String],
        steps: usize,
        score: impl Fn(&str, u64) -> f64,
    ) -> (AbMctsM, SearchTree) {
        let mut algo = SearchAlgorithm::init(AlgorithmParams::AbMctsM(params), 29).unwrap();
        let mut tree = SearchTree::new();
        let mut expander = FnExpander(|action: &str, state: Option<&Value>| {
            let depth = state.and_then(Value::as_u64).unwrap_or(0) + 1;
            vec![Successor::new(json!(depth), score(action, depth))]
        });
        for _ in 0..steps {
            algo.step(&mut tree, actions, &mut expander).unwrap();
        }
        match algo {
            SearchAlgorithm::AbMctsM(a) => (a, tree),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_uniform_subtree_becomes_prunable() {
        let params = AbMctsMParams {
            min_subtree_size_for_pruning: 2,
            ..Default::default()
        };
        let (algo, tree) = grow(params, &names(&["f"]), 25, |_, _| 0.5);
        let prunable = tree
            .nodes()
            .iter()
            .filter(|n| algo.is_prunable(n.id))
            .count();
        assert!(prunable > 0);
        assert!(!algo.is_prunable(NodeId::ROOT));
    }

    #[test]
    fn test_pruning_disabled() {
        let params = AbMctsMParams::default().with_pruning(false);
        let (algo, tree) = grow(params, &names(&["f"]), 20, |_, _| 0.5);
        assert!(tree.nodes().iter().all(|n| !algo.is_prunable(n.id)));
    }

    #[test]
    fn test_varied_scores_are_not_pruned() {
        let counter = std::cell::Cell::new(0u32);
        let unique = |_: &str, _: u64| {
            counter.set(counter.get() + 1);
            counter.get() as f64 * 0.01
        };
        let (algo, tree) = grow(AbMctsMParams::default(), &names(&["f"]), 20, unique);
        assert!(tree.nodes().iter().all(|n| !algo.is_prunable(n.id)));
    }

    #[test]
    fn test_shared_strategies_grow_tree() {
        for strategy in [
            SelectionStrategy::MultiarmBanditThompson,
            SelectionStrategy::MultiarmBanditUcb,
        ] {
            let params = AbMctsMParams {
                model_selection_strategy: strategy,
                ..Default::default()
            };
            let (_, tree) = grow(params, &names(&["f", "g"]), 15, |a, _| {
                if a == "f" {
                    0.2
                } else {
                    0.8
                }
            });
            assert_eq!(tree.len(), 16);
        }
    }

    #[test]
    fn test_metrics_list_rewards() {
        let (algo, tree) = grow(AbMctsMParams::default(), &names(&["f"]), 4, |_, _| 0.5);
        let metrics = algo.metrics(&tree, NodeId::ROOT);
        assert_eq!(metrics[0].value, "false");
        assert!(metrics[1].value.starts_with("f: len="));
        assert!(metrics[2].value.contains("len="));
    }
}
