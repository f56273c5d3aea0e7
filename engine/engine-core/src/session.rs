//! One tree-search session: an algorithm, its tree and the step counter.
//!
//! A step either commits completely or leaves the session exactly as it
//! was. Compilation happens before the algorithm runs, expansion happens
//! before the tree is touched, and the step counter only moves after the
//! algorithm has committed.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use mcts::{
    AlgorithmKind, AlgorithmParams, Expander, SearchAlgorithm, SearchTree, StepError, Successor,
};
use sandbox::{CompiledFunction, ExecutionFailure, Executor, FailureKind};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::EngineError;
use crate::params::validate_sources;
use crate::snapshot::{self, RankedNode, TreeSnapshot};
use crate::visualize::{self, DotRenderer, RenderOptions, Visualization};

/// Registry-facing summary; also what `list_sessions` reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub algorithm: AlgorithmKind,
    pub step_count: u64,
    pub tree_size: usize,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a committed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub session_id: String,
    pub step_count: u64,
    pub nodes_added: usize,
    pub tree_size: usize,
    pub total_nodes: usize,
    pub non_root_nodes: usize,
    pub expanded_node: Option<u32>,
    pub action: Option<String>,
    pub path: Vec<u32>,
    pub exhausted: bool,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
    pub status: &'static str,
    /// Expansion-function calls made during the step
    #[serde(skip)]
    pub invocations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeState {
    pub session_id: String,
    pub algorithm: AlgorithmKind,
    pub step_count: u64,
    pub tree_size: usize,
    pub total_nodes: usize,
    #[serde(flatten)]
    pub snapshot: TreeSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankResult {
    pub session_id: String,
    pub k: usize,
    pub actual_results: usize,
    pub ranked_nodes: Vec<RankedNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministic child seed: the `n`-th value of the stream rooted at `base`.
pub fn derive_seed(base: u64, n: u64) -> u64 {
    splitmix64(base ^ splitmix64(n))
}

/// Feeds the search algorithm with successors from compiled scripts.
struct ScriptExpander<'a> {
    executor: &'a Executor,
    functions: &'a BTreeMap<String, CompiledFunction>,
    seed: u64,
    invocations: u32,
    warnings: Vec<String>,
}

impl Expander for ScriptExpander<'_> {
    type Error = ExecutionFailure;

    fn expand(
        &mut self,
        action: &str,
        state: Option<&Value>,
    ) -> Result<Vec<Successor>, ExecutionFailure> {
        let function = self.functions.get(action).ok_or_else(|| {
            ExecutionFailure::new(
                FailureKind::RuntimeError,
                action,
                "expansion function was not compiled",
            )
        })?;
        let seed = derive_seed(self.seed, u64::from(self.invocations));
        self.invocations += 1;
        let invocation = self.executor.invoke(function, state, seed)?;
        self.warnings.extend(invocation.warning);
        Ok(invocation
            .successors
            .into_iter()
            .map(|s| Successor::new(s.state, s.score))
            .collect())
    }
}

fn step_error(err: StepError<ExecutionFailure>) -> EngineError {
    match err {
        StepError::NoActions => EngineError::validation(
            "generate_functions",
            "at least one expansion function is required",
        ),
        StepError::Expansion { source, .. } => source.into(),
        StepError::InvalidScore {
            action,
            index,
            reason,
            ..
        } => ExecutionFailure::new(FailureKind::InvalidOutput, action, reason)
            .at_index(index)
            .into(),
        StepError::Sampling(e) => EngineError::internal(format!("posterior sampling failed: {e}")),
    }
}

#[derive(Debug)]
pub struct Session {
    id: String,
    algorithm: SearchAlgorithm,
    tree: SearchTree,
    created_at: DateTime<Utc>,
    step_count: u64,
    seed: u64,
}

impl Session {
    /// Build a fresh session with an empty tree.
    pub fn new(
        id: impl Into<String>,
        params: AlgorithmParams,
        seed: u64,
        created_at: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        // The algorithm and the invocation seeds draw from separate streams
        let algorithm = SearchAlgorithm::init(params, derive_seed(seed, 0))?;
        Ok(Self {
            id: id.into(),
            algorithm,
            tree: SearchTree::new(),
            created_at,
            step_count: 0,
            seed: derive_seed(seed, 1),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> AlgorithmKind {
        self.algorithm.kind()
    }

    pub fn parameters(&self) -> AlgorithmParams {
        self.algorithm.params()
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            algorithm: self.kind(),
            step_count: self.step_count,
            tree_size: self.tree.len(),
            created_at: self.created_at,
        }
    }

    /// Compile `sources` and run one search step with them.
    ///
    /// # Arguments
    ///
    /// * `sources` - Expansion-function name to script source
    /// * `executor` - Sandbox that compiles and runs the scripts
    ///
    /// # Returns
    ///
    /// What the step changed, or the first failure with the session untouched.
    pub fn step(
        &mut self,
        sources: &BTreeMap<String, String>,
        executor: &Executor,
    ) -> Result<StepReport, EngineError> {
        let started = Instant::now();
        validate_sources(sources, executor.limits())?;
        let functions = sources
            .iter()
            .map(|(name, source)| Ok((name.clone(), executor.compile(name, source)?)))
            .collect::<Result<BTreeMap<_, _>, ExecutionFailure>>()?;
        let actions: Vec<String> = functions.keys().cloned().collect();

        let mut expander = ScriptExpander {
            executor,
            functions: &functions,
            seed: derive_seed(self.seed, self.step_count),
            invocations: 0,
            warnings: Vec::new(),
        };
        let stats = self
            .algorithm
            .step(&mut self.tree, &actions, &mut expander)
            .map_err(step_error)?;
        self.step_count += 1;

        let mut warnings = expander.warnings;
        if stats.exhausted {
            warnings.push("no node could be expanded; the tree is fully explored".to_string());
        }
        let report = StepReport {
            session_id: self.id.clone(),
            step_count: self.step_count,
            nodes_added: stats.nodes_added(),
            tree_size: self.tree.len(),
            total_nodes: self.tree.len(),
            non_root_nodes: self.tree.non_root_len(),
            expanded_node: stats.expanded.map(|n| n.0),
            action: stats.action,
            path: stats.path.iter().map(|n| n.0).collect(),
            exhausted: stats.exhausted,
            warnings,
            elapsed_ms: started.elapsed().as_millis() as u64,
            status: "step_completed",
            invocations: expander.invocations,
        };
        debug!(
            session_id = %self.id,
            step = report.step_count,
            added = report.nodes_added,
            tree_size = report.tree_size,
            exhausted = report.exhausted,
            elapsed_ms = report.elapsed_ms,
            "step committed"
        );
        Ok(report)
    }

    pub fn extract_state(&self) -> TreeState {
        TreeState {
            session_id: self.id.clone(),
            algorithm: self.kind(),
            step_count: self.step_count,
            tree_size: self.tree.len(),
            total_nodes: self.tree.len(),
            snapshot: snapshot::extract(&self.tree, &self.algorithm),
        }
    }

    /// Top `k` scored nodes; `k` must already be range-checked.
    pub fn rank(&self, k: usize) -> RankResult {
        let ranked_nodes = snapshot::rank(&self.tree, &self.algorithm, k);
        let warning = (self.tree.non_root_len() == 0)
            .then(|| "the tree has no scored nodes yet; run step_tree first".to_string());
        RankResult {
            session_id: self.id.clone(),
            k,
            actual_results: ranked_nodes.len(),
            ranked_nodes,
            warning,
        }
    }

    pub fn visualize(
        &self,
        options: &RenderOptions,
        renderer: &DotRenderer,
    ) -> Result<Visualization, EngineError> {
        let snapshot = snapshot::extract(&self.tree, &self.algorithm);
        visualize::export(
            &self.id,
            self.kind().as_str(),
            self.step_count,
            &snapshot,
            options,
            renderer,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use mcts::StandardParams;
    use sandbox::Limits;
    use serde_json::json;
    use std::time::Duration;

    const START: &str = r#"state -> state is root ? [("start", 0.5)] : []"#;

    fn session(params: AlgorithmParams) -> Session {
        Session::new("s1", params, 11, Utc::now()).unwrap()
    }

    fn standard() -> Session {
        session(AlgorithmParams::Standard(
            StandardParams::default().with_exploration_weight(1.4),
        ))
    }

    fn sources(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_first_step_and_rank() {
        let executor = Executor::default();
        let mut s = standard();
        let report = s.step(&sources(&[("expand", START)]), &executor).unwrap();
        assert_eq!(report.tree_size, 2);
        assert_eq!(report.step_count, 1);
        assert_eq!(report.nodes_added, 1);
        assert_eq!(report.expanded_node, Some(0));
        assert_eq!(report.action.as_deref(), Some("expand"));
        assert_eq!(report.invocations, 1);
        assert_eq!(report.status, "step_completed");

        let ranked = s.rank(1);
        assert_eq!(ranked.actual_results, 1);
        assert_eq!(ranked.ranked_nodes[0].state, json!("start"));
        assert_eq!(ranked.ranked_nodes[0].score, 0.5);
        assert!(ranked.warning.is_none());
    }

    #[test]
    fn test_failed_step_leaves_session_unchanged() {
        let executor = Executor::default();
        let mut s = standard();
        s.step(&sources(&[("expand", "s -> [(s is root ? 0 : s + 1, 0.5)]")]), &executor)
            .unwrap();
        let before = s.extract_state();

        let err = s
            .step(&sources(&[("expand", "s -> [('a', 'high')]")]), &executor)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutput);
        assert_eq!(s.extract_state(), before);
        assert_eq!(s.step_count(), 1);
    }

    #[test]
    fn test_compile_failure_names_function() {
        let executor = Executor::default();
        let mut s = standard();
        let err = s
            .step(&sources(&[("a", START), ("b", "s -> [1,")]), &executor)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CompileError);
        assert_eq!(err.payload()["error"]["function"], "b");
        assert_eq!(s.tree().len(), 1);
        assert_eq!(s.step_count(), 0);
    }

    #[test]
    fn test_infinite_loop_times_out() {
        let limits = Limits::default()
            .with_timeout(Duration::from_millis(100))
            .with_max_instructions(u64::MAX);
        let executor = Executor::new(limits);
        let mut s = standard();
        let err = s
            .step(&sources(&[("spin", "s -> iterate(0, x -> true, x -> x + 1)")]), &executor)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(s.step_count(), 0);
    }

    #[test]
    fn test_exhausted_step_still_counts() {
        let executor = Executor::default();
        let mut s = standard();
        let src = sources(&[("expand", START)]);
        s.step(&src, &executor).unwrap();
        // "start" yields nothing, after which nothing is expandable
        let mut last = s.step(&src, &executor).unwrap();
        for _ in 0..3 {
            if last.exhausted {
                break;
            }
            last = s.step(&src, &executor).unwrap();
        }
        assert!(last.exhausted);
        assert_eq!(last.nodes_added, 0);
        assert_eq!(last.expanded_node, None);
        assert!(!last.warnings.is_empty());
        assert_eq!(s.step_count(), last.step_count);
        assert_eq!(s.tree().len(), 2);
    }

    #[test]
    fn test_beta_posterior_rejects_out_of_range_scores() {
        let params = AlgorithmParams::AbMctsA(
            mcts::AbMctsAParams::default().with_dist_type(mcts::DistType::Beta),
        );
        let mut s = session(params);
        let err = s
            .step(&sources(&[("expand", "s -> [('a', 1.5)]")]), &Executor::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOutput);
        assert_eq!(err.payload()["error"]["index"], 0);
        assert_eq!(s.tree().len(), 1);
    }

    #[test]
    fn test_seeded_sessions_are_reproducible() {
        let executor = Executor::default();
        let src = sources(&[(
            "expand",
            "s -> map(range(3), i -> [(s is root ? 0 : s) * 10 + i, random()])",
        )]);
        let run = || {
            let params = AlgorithmParams::AbMctsM(Default::default());
            let mut s = Session::new("x", params, 5, Utc::now()).unwrap();
            for _ in 0..4 {
                s.step(&src, &executor).unwrap();
            }
            s.extract_state().snapshot
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_rank_on_root_only_tree_warns() {
        let ranked = standard().rank(10);
        assert!(ranked.ranked_nodes.is_empty());
        assert!(ranked.warning.is_some());
    }

    #[test]
    fn test_dot_visualization() {
        let executor = Executor::default();
        let mut s = standard();
        s.step(&sources(&[("expand", START)]), &executor).unwrap();
        let opts = RenderOptions::new(
            Some("dot"),
            None,
            None,
            None,
            &engine_config::VisualizationConfig::default(),
        )
        .unwrap();
        let vis = s
            .visualize(&opts, &DotRenderer::new("dot", Duration::from_secs(5)))
            .unwrap();
        assert_eq!(vis.metadata.node_count, 2);
        assert_eq!(vis.metadata.edge_count, 1);
        assert!(vis.source.contains("0 -> 1 [label=\"expand\"]"));
    }
}
