//! Tree search over user-defined state spaces.
//!
//! This crate provides the search algorithms behind every session: an arena
//! tree of scored states and three policies that decide which node to expand
//! next and with which expansion function.
//!
//! # Overview
//!
//! Each call to [`SearchAlgorithm::step`] performs one cycle:
//!
//! 1. **Selection**: walk down from the root until the policy decides to
//!    generate at a node
//! 2. **Expansion**: ask the [`Expander`] for that node's scored successors
//! 3. **Update**: attach the successors and update the policy's statistics
//!
//! If the expander fails, or returns a score the policy cannot model, the
//! step aborts before anything is changed.
//!
//! # Algorithms
//!
//! - [`StandardMcts`]: UCT with a fixed number of expansions per
//!   (node, action) pair
//! - [`AbMctsA`]: adaptive branching with Thompson sampling over Gaussian
//!   or Beta posteriors
//! - [`AbMctsM`]: adaptive branching with posteriors pooled per action and
//!   optional pruning of uniform subtrees
//!
//! # Usage
//!
//! ```rust
//! use mcts::{AlgorithmParams, FnExpander, SearchAlgorithm, SearchTree, StandardParams, Successor};
//! use serde_json::{json, Value};
//!
//! let params = AlgorithmParams::Standard(StandardParams::default().with_exploration_weight(1.4));
//! let mut algo = SearchAlgorithm::init(params, 42).unwrap();
//! let mut tree = SearchTree::new();
//! let mut expander = FnExpander(|_: &str, state: Option<&Value>| match state {
//!     None => vec![Successor::new(json!("start"), 0.5)],
//!     Some(_) => vec![],
//! });
//!
//! let stats = algo.step(&mut tree, &["expand".to_string()], &mut expander).unwrap();
//! assert_eq!(stats.nodes_added(), 1);
//! assert_eq!(tree.len(), 2);
//! ```

pub mod ab_mcts_a;
pub mod ab_mcts_m;
pub mod bayes;
pub mod config;
pub mod expander;
pub mod node;
mod rewards;
pub mod search;
pub mod standard;
pub mod tree;

// Re-export main types
pub use ab_mcts_a::AbMctsA;
pub use ab_mcts_m::AbMctsM;
pub use bayes::{Posterior, SamplingError};
pub use config::{
    AbMctsAParams, AbMctsMParams, AlgorithmKind, AlgorithmParams, DistType, ParamError,
    PriorConfig, RewardPriors, SelectionStrategy, StandardParams,
};
pub use expander::{Expander, FnExpander, Successor};
pub use node::{NodeId, TreeNode};
pub use search::{NodeMetric, SearchAlgorithm, StepError, StepStats};
pub use standard::StandardMcts;
pub use tree::SearchTree;
