//! Single-step search driver shared by every algorithm.
//!
//! A step runs in three phases:
//! 1. Plan: walk the tree and pick a (node, action) pair without mutating
//!    anything. Sampling uses a clone of the policy's random generator.
//! 2. Expand: call the expander once for the chosen pair and validate its
//!    output.
//! 3. Commit: attach the successors, update statistics, then keep the
//!    advanced random generator.
//!
//! Any failure in 1 or 2 returns before 3, so the tree, the statistics and
//! the random stream stay exactly as they were.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::ab_mcts_a::AbMctsA;
use crate::ab_mcts_m::AbMctsM;
use crate::bayes::SamplingError;
use crate::config::{AlgorithmKind, AlgorithmParams, ParamError};
use crate::expander::{Expander, Successor};
use crate::node::NodeId;
use crate::standard::StandardMcts;
use crate::tree::SearchTree;

/// Errors that can occur during one search step.
#[derive(Debug, Error)]
pub enum StepError<E> {
    #[error("no expansion functions supplied")]
    NoActions,

    #[error("expansion function '{action}' failed")]
    Expansion {
        action: String,
        #[source]
        source: E,
    },

    #[error("expansion function '{action}' returned score {score} at index {index}: {reason}")]
    InvalidScore {
        action: String,
        index: usize,
        score: f64,
        reason: String,
    },

    #[error(transparent)]
    Sampling(#[from] SamplingError),
}

/// A chosen expansion, computed before any mutation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Plan {
    pub node: NodeId,
    pub action: String,
    pub path: Vec<NodeId>,
}

impl Plan {
    pub fn new(node: NodeId, action: &str, path: Vec<NodeId>) -> Self {
        Self {
            node,
            action: action.to_string(),
            path,
        }
    }
}

/// Outcome of one committed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepStats {
    /// Node whose state was passed to the expander
    pub expanded: Option<NodeId>,
    /// Expansion function that was invoked
    pub action: Option<String>,
    /// Selection path from the root to `expanded`
    pub path: Vec<NodeId>,
    /// Ids of the newly attached children
    pub added: Vec<NodeId>,
    /// True when no (node, action) pair was left to expand
    pub exhausted: bool,
}

impl StepStats {
    pub fn nodes_added(&self) -> usize {
        self.added.len()
    }

    fn exhausted() -> Self {
        Self {
            expanded: None,
            action: None,
            path: Vec::new(),
            added: Vec::new(),
            exhausted: true,
        }
    }
}

/// Algorithm-specific statistic for one node, formatted for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMetric {
    pub key: &'static str,
    pub label: &'static str,
    pub value: String,
}

impl NodeMetric {
    pub fn new(key: &'static str, label: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            label,
            value: value.into(),
        }
    }
}

/// A scored successor that a policy refuses to accept.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoreRejection {
    pub index: usize,
    pub score: f64,
    pub reason: String,
}

/// Per-algorithm selection and statistics.
pub(crate) trait Policy {
    fn rng(&self) -> &ChaCha20Rng;

    fn set_rng(&mut self, rng: ChaCha20Rng);

    /// Choose the next expansion. None when nothing is left to expand.
    fn plan(
        &self,
        tree: &SearchTree,
        actions: &[String],
        rng: &mut ChaCha20Rng,
    ) -> Result<Option<Plan>, SamplingError>;

    /// Reject successors this policy cannot model.
    fn check(&self, _successors: &[Successor]) -> Result<(), ScoreRejection> {
        Ok(())
    }

    /// Update statistics after `added` were attached under `plan.node`.
    fn commit(&mut self, tree: &SearchTree, plan: &Plan, added: &[NodeId]);

    fn metrics(&self, tree: &SearchTree, id: NodeId) -> Vec<NodeMetric>;
}

fn run_step<P: Policy, E: Expander>(
    policy: &mut P,
    tree: &mut SearchTree,
    actions: &[String],
    expander: &mut E,
) -> Result<StepStats, StepError<E::Error>> {
    if actions.is_empty() {
        return Err(StepError::NoActions);
    }

    let mut rng = policy.rng().clone();
    let Some(plan) = policy.plan(tree, actions, &mut rng)? else {
        policy.set_rng(rng);
        tree.bump_generation();
        return Ok(StepStats::exhausted());
    };

    let state = tree.get(plan.node).and_then(|n| n.state.as_ref());
    let successors = expander
        .expand(&plan.action, state)
        .map_err(|source| StepError::Expansion {
            action: plan.action.clone(),
            source,
        })?;

    if let Some((index, s)) = successors
        .iter()
        .enumerate()
        .find(|(_, s)| !s.score.is_finite())
    {
        return Err(StepError::InvalidScore {
            action: plan.action.clone(),
            index,
            score: s.score,
            reason: "score must be a finite number".into(),
        });
    }
    policy
        .check(&successors)
        .map_err(|r| StepError::InvalidScore {
            action: plan.action.clone(),
            index: r.index,
            score: r.score,
            reason: r.reason,
        })?;

    // Commit: nothing below can fail
    let added: Vec<NodeId> = successors
        .into_iter()
        .map(|s| tree.add_child(plan.node, &plan.action, s.state, s.score))
        .collect();
    tree.bump_generation();
    policy.commit(tree, &plan, &added);
    policy.set_rng(rng);

    trace!(
        node = plan.node.0,
        action = %plan.action,
        added = added.len(),
        depth = plan.path.len(),
        "search step committed"
    );

    Ok(StepStats {
        expanded: Some(plan.node),
        action: Some(plan.action),
        path: plan.path,
        added,
        exhausted: false,
    })
}

/// A search algorithm bound to one session, with its own statistics.
#[derive(Debug, Clone)]
pub enum SearchAlgorithm {
    Standard(StandardMcts),
    AbMctsA(AbMctsA),
    AbMctsM(AbMctsM),
}

impl SearchAlgorithm {
    /// Validate `params` and create a fresh algorithm state seeded from `seed`.
    pub fn init(params: AlgorithmParams, seed: u64) -> Result<Self, ParamError> {
        params.validate()?;
        let rng = ChaCha20Rng::seed_from_u64(seed);
        Ok(match params {
            AlgorithmParams::Standard(p) => Self::Standard(StandardMcts::new(p, rng)),
            AlgorithmParams::AbMctsA(p) => Self::AbMctsA(AbMctsA::new(p, rng)),
            AlgorithmParams::AbMctsM(p) => Self::AbMctsM(AbMctsM::new(p, rng)),
        })
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Standard(_) => AlgorithmKind::Standard,
            Self::AbMctsA(_) => AlgorithmKind::AbMctsA,
            Self::AbMctsM(_) => AlgorithmKind::AbMctsM,
        }
    }

    pub fn params(&self) -> AlgorithmParams {
        match self {
            Self::Standard(a) => AlgorithmParams::Standard(a.params().clone()),
            Self::AbMctsA(a) => AlgorithmParams::AbMctsA(a.params().clone()),
            Self::AbMctsM(a) => AlgorithmParams::AbMctsM(a.params().clone()),
        }
    }

    /// Run one select/expand/update cycle. `actions` are the available
    /// expansion-function names.
    pub fn step<E: Expander>(
        &mut self,
        tree: &mut SearchTree,
        actions: &[String],
        expander: &mut E,
    ) -> Result<StepStats, StepError<E::Error>> {
        match self {
            Self::Standard(a) => run_step(a, tree, actions, expander),
            Self::AbMctsA(a) => run_step(a, tree, actions, expander),
            Self::AbMctsM(a) => run_step(a, tree, actions, expander),
        }
    }

    /// Built-in ranking of the best `k` nodes, if this algorithm has one.
    pub fn top_k(&self, tree: &SearchTree, k: usize) -> Option<Vec<NodeId>> {
        match self {
            Self::Standard(_) => None,
            Self::AbMctsA(_) | Self::AbMctsM(_) => {
                Some(tree.ranked_by_score().into_iter().take(k).collect())
            }
        }
    }

    pub fn node_metrics(&self, tree: &SearchTree, id: NodeId) -> Vec<NodeMetric> {
        match self {
            Self::Standard(a) => a.metrics(tree, id),
            Self::AbMctsA(a) => a.metrics(tree, id),
            Self::AbMctsM(a) => a.metrics(tree, id),
        }
    }
}
