//! Adaptive-branching MCTS with per-node Thompson sampling (AB-MCTS-A).
//!
//! At every node the policy chooses between generating a new child (GEN)
//! and continuing into an existing child (CONT) by sampling each option's
//! posterior mean reward. Generation never runs out on its own: a (node,
//! action) pair is only closed when its expansion returns nothing.

use rand_chacha::ChaCha20Rng;

use crate::bayes::{argmax, GaussianPrior, Posterior, SamplingError};
use crate::config::{AbMctsAParams, DistType, SelectionStrategy};
use crate::expander::Successor;
use crate::node::NodeId;
use crate::rewards::{ucb_action, RewardStore};
use crate::search::{NodeMetric, Plan, Policy, ScoreRejection};
use crate::tree::SearchTree;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Choice<'a> {
    Gen(&'a str),
    Cont(NodeId),
}

#[derive(Debug, Clone)]
pub struct AbMctsA {
    params: AbMctsAParams,
    rng: ChaCha20Rng,
    store: RewardStore,
}

impl AbMctsA {
    pub fn new(params: AbMctsAParams, rng: ChaCha20Rng) -> Self {
        Self {
            params,
            rng,
            store: RewardStore::default(),
        }
    }

    pub fn params(&self) -> &AbMctsAParams {
        &self.params
    }

    /// Posterior over the mean reward of `action`, given `obs`.
    pub fn posterior(&self, action: &str, obs: &[f64]) -> Posterior {
        let p = self.params.reward_average_priors.for_action(action);
        let cfg = |key: &str| self.params.prior_config.as_ref().and_then(|c| c.get(key).copied());
        match self.params.dist_type {
            DistType::Gaussian => {
                let base = GaussianPrior::with_mean(p);
                let prior = GaussianPrior {
                    m: cfg("m").unwrap_or(base.m),
                    kappa: cfg("kappa").unwrap_or(base.kappa),
                    nu: cfg("nu").unwrap_or(base.nu),
                    tau_square: cfg("tau_square").unwrap_or(base.tau_square),
                };
                Posterior::gaussian(prior, obs)
            }
            // One pseudo-observation of the prior mean on top of Beta(1, 1)
            DistType::Beta => Posterior::beta(
                cfg("a").unwrap_or(1.0 + p),
                cfg("b").unwrap_or(2.0 - p),
                obs,
            ),
        }
    }

    fn child_action<'t>(tree: &'t SearchTree, child: NodeId) -> &'t str {
        tree.node(child).action.as_deref().unwrap_or("")
    }

    fn choose<'a>(
        &self,
        tree: &SearchTree,
        node: NodeId,
        actions: &'a [String],
        alive: &[bool],
        rng: &mut ChaCha20Rng,
    ) -> Result<Option<Choice<'a>>, SamplingError> {
        let open = self.store.open_actions(node, actions);
        let conts: Vec<NodeId> = tree
            .children(node)
            .iter()
            .copied()
            .filter(|c| alive[c.index()])
            .collect();

        match self.params.model_selection_strategy {
            SelectionStrategy::Stack => {
                // Pick an action first, then GEN vs CONT within it
                let candidates: Vec<&'a str> = actions
                    .iter()
                    .map(String::as_str)
                    .filter(|a| {
                        open.contains(a)
                            || conts.iter().any(|&c| Self::child_action(tree, c) == *a)
                    })
                    .collect();
                let samples = candidates
                    .iter()
                    .map(|a| self.posterior(a, self.store.generated(node, a)).sample(rng))
                    .collect::<Result<Vec<_>, _>>()?;
                let Some(action) = argmax(&samples).map(|i| candidates[i]) else {
                    return Ok(None);
                };
                let within: Vec<NodeId> = conts
                    .iter()
                    .copied()
                    .filter(|&c| Self::child_action(tree, c) == action)
                    .collect();
                let gen = open
                    .contains(&action)
                    .then(|| self.posterior(action, self.store.generated(node, action)));
                self.gen_or_cont(gen.map(|g| (g, action)), &within, tree, rng)
            }
            SelectionStrategy::MultiarmBanditThompson | SelectionStrategy::MultiarmBanditUcb => {
                let gen_action = if open.is_empty() {
                    None
                } else if self.params.model_selection_strategy
                    == SelectionStrategy::MultiarmBanditUcb
                {
                    ucb_action(&self.store, &open)
                } else {
                    let samples = open
                        .iter()
                        .map(|a| self.posterior(a, self.store.by_action(a)).sample(rng))
                        .collect::<Result<Vec<_>, _>>()?;
                    argmax(&samples).map(|i| open[i])
                };
                let gen = gen_action.map(|a| {
                    (self.posterior(a, &self.store.generated_all(node)), a)
                });
                self.gen_or_cont(gen, &conts, tree, rng)
            }
        }
    }

    fn gen_or_cont<'a>(
        &self,
        gen: Option<(Posterior, &'a str)>,
        conts: &[NodeId],
        tree: &SearchTree,
        rng: &mut ChaCha20Rng,
    ) -> Result<Option<Choice<'a>>, SamplingError> {
        let cont_samples = conts
            .iter()
            .map(|&c| {
                self.posterior(Self::child_action(tree, c), self.store.subtree(c))
                    .sample(rng)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let best_cont = argmax(&cont_samples).map(|i| (conts[i], cont_samples[i]));

        match (gen, best_cont) {
            (Some((posterior, action)), Some((child, cont_value))) => {
                if posterior.sample(rng)? >= cont_value {
                    Ok(Some(Choice::Gen(action)))
                } else {
                    Ok(Some(Choice::Cont(child)))
                }
            }
            (Some((_, action)), None) => Ok(Some(Choice::Gen(action))),
            (None, Some((child, _))) => Ok(Some(Choice::Cont(child))),
            (None, None) => Ok(None),
        }
    }
}

impl Policy for AbMctsA {
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
        let alive = tree.alive_mask(|id| self.store.has_open(id, actions));
        if !alive[NodeId::ROOT.index()] {
            return Ok(None);
        }
        let mut current = tree.root();
        let mut path = vec![current];
        loop {
            match self.choose(tree, current, actions, &alive, rng)? {
                Some(Choice::Gen(action)) => return Ok(Some(Plan::new(current, action, path))),
                Some(Choice::Cont(child)) => {
                    path.push(child);
                    current = child;
                }
                None => return Ok(None),
            }
        }
    }

    fn check(&self, successors: &[Successor]) -> Result<(), ScoreRejection> {
        if self.params.dist_type != DistType::Beta {
            return Ok(());
        }
        match successors
            .iter()
            .enumerate()
            .find(|(_, s)| !(0.0..=1.0).contains(&s.score))
        {
            Some((index, s)) => Err(ScoreRejection {
                index,
                score: s.score,
                reason: "beta posterior requires scores in [0, 1]".into(),
            }),
            None => Ok(()),
        }
    }

    fn commit(&mut self, tree: &SearchTree, plan: &Plan, added: &[NodeId]) {
        self.store.record(tree, plan, added);
    }

    fn metrics(&self, tree: &SearchTree, id: NodeId) -> Vec<NodeMetric> {
        let actions = self
            .store
            .generated_actions(id)
            .into_iter()
            .map(|a| format!("{a} ~ {}", self.posterior(a, self.store.generated(id, a))))
            .collect::<Vec<_>>();
        let children = tree
            .children(id)
            .iter()
            .map(|&c| {
                let post = self.posterior(Self::child_action(tree, c), self.store.subtree(c));
                format!("{c} ~ {post}")
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
            NodeMetric::new("action_probas", "Action Probabilities", or_na(actions)),
            NodeMetric::new("child_probas", "Child Probabilities", or_na(children)),
        ]
    }
}
