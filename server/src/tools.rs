//! Tool catalogue and dispatcher shared by both transports.
//!
//! Every engine call can block (script execution, Graphviz), so tool bodies
//! run on tokio's blocking pool.

use std::sync::Arc;
use std::time::Instant;

use engine_core::{parse_sources, EngineError, RenderOptions, SessionRegistry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::metrics;
use crate::types::{
    InitTreeArgs, NoArgs, RankNodesArgs, SessionArgs, SessionListResponse, StepTreeArgs,
    ToolDescriptor, VisualizationArgs,
};
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    InitTree,
    StepTree,
    GetTreeState,
    RankNodes,
    ListSessions,
    DeleteSession,
    GetTreeVisualization,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Self::InitTree,
        Self::StepTree,
        Self::GetTreeState,
        Self::RankNodes,
        Self::ListSessions,
        Self::DeleteSession,
        Self::GetTreeVisualization,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::InitTree => "init_tree",
            Self::StepTree => "step_tree",
            Self::GetTreeState => "get_tree_state",
            Self::RankNodes => "rank_nodes",
            Self::ListSessions => "list_sessions",
            Self::DeleteSession => "delete_session",
            Self::GetTreeVisualization => "get_tree_visualization",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|t| t.name()).collect()
    }

    fn description(self) -> &'static str {
        match self {
            Self::InitTree => {
                "Create a tree-search session bound to StandardMCTS, ABMCTSA or ABMCTSM."
            }
            Self::StepTree => {
                "Run one search step. generate_functions maps names to expansion scripts; \
                 each script is a function from a state (or root) to a list of \
                 (state, score) pairs."
            }
            Self::GetTreeState => "Return every node of the session's tree, breadth-first.",
            Self::RankNodes => "Return the k best-scored nodes of the session's tree.",
            Self::ListSessions => "List all active sessions, oldest first.",
            Self::DeleteSession => "Delete a session and release its tree.",
            Self::GetTreeVisualization => {
                "Render the session's tree as Graphviz DOT, optionally converted to \
                 png, pdf or svg."
            }
        }
    }

    fn input_schema(self) -> Value {
        let session_id = json!({
            "type": "string",
            "description": "Session id returned by init_tree"
        });
        match self {
            Self::InitTree => json!({
                "type": "object",
                "properties": {
                    "algorithm": {
                        "type": "string",
                        "enum": ["StandardMCTS", "ABMCTSA", "ABMCTSM"]
                    },
                    "params": {
                        "type": "object",
                        "description": "Algorithm parameters. Common: exploration_weight (0-10), \
                            samples_per_action (1-100). ABMCTSA: dist_type (gaussian|beta), \
                            reward_average_priors, prior_config, model_selection_strategy. \
                            ABMCTSM: enable_pruning, reward_average_priors, \
                            model_selection_strategy, \
                            min_subtree_size_for_pruning, same_score_proportion_threshold."
                    }
                },
                "required": ["algorithm"],
                "additionalProperties": false
            }),
            Self::StepTree => json!({
                "type": "object",
                "properties": {
                    "session_id": session_id,
                    "generate_functions": {
                        "type": "object",
                        "additionalProperties": {"type": "string"},
                        "description": "Expansion-function name -> script, e.g. \
                            {\"expand\": \"state -> state is root ? [(\\\"start\\\", 0.5)] : []\"}"
                    }
                },
                "required": ["session_id", "generate_functions"],
                "additionalProperties": false
            }),
            Self::GetTreeState | Self::DeleteSession => json!({
                "type": "object",
                "properties": {"session_id": session_id},
                "required": ["session_id"],
                "additionalProperties": false
            }),
            Self::RankNodes => json!({
                "type": "object",
                "properties": {
                    "session_id": session_id,
                    "k": {"type": "integer", "minimum": 1, "default": 10}
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
            Self::ListSessions => json!({
                "type": "object",
                "properties": {},
                "additionalProperties": false
            }),
            Self::GetTreeVisualization => json!({
                "type": "object",
                "properties": {
                    "session_id": session_id,
                    "format": {
                        "type": "string",
                        "enum": ["png", "pdf", "svg", "dot"],
                        "default": "png"
                    },
                    "show_scores": {"type": "boolean", "default": true},
                    "max_label_length": {"type": "integer", "minimum": 1, "default": 20},
                    "title": {"type": "string"}
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        }
    }

    pub fn descriptor(self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

pub fn catalogue() -> Vec<ToolDescriptor> {
    Tool::ALL.into_iter().map(Tool::descriptor).collect()
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, EngineError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| EngineError::validation("arguments", e.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, EngineError> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::internal(format!("failed to encode response: {}", e)))
}

fn refresh_active(registry: &SessionRegistry) {
    metrics::SESSIONS_ACTIVE.set(registry.len() as i64);
}

/// Run `tool` synchronously against `state`.
fn run(state: &AppState, tool: Tool, args: Value) -> Result<Value, EngineError> {
    let registry = &state.registry;
    match tool {
        Tool::InitTree => {
            let args: InitTreeArgs = parse_args(args)?;
            let created = registry.create(&args.algorithm, args.params.as_ref())?;
            metrics::SESSIONS_CREATED.inc();
            refresh_active(registry);
            to_value(&created)
        }
        Tool::StepTree => {
            let args: StepTreeArgs = parse_args(args)?;
            registry.get(&args.session_id)?;
            let sources = parse_sources(args.generate_functions.as_ref())?;
            let started = Instant::now();
            match registry.step(&args.session_id, &sources) {
                Ok(report) => {
                    metrics::STEPS_TOTAL.inc();
                    metrics::STEP_SECONDS.observe(started.elapsed().as_secs_f64());
                    metrics::EXPANSION_INVOCATIONS.inc_by(u64::from(report.invocations));
                    to_value(&report)
                }
                Err(e) => {
                    metrics::STEP_FAILURES
                        .with_label_values(&[e.kind().as_str()])
                        .inc();
                    Err(e)
                }
            }
        }
        Tool::GetTreeState => {
            let args: SessionArgs = parse_args(args)?;
            to_value(&registry.state(&args.session_id)?)
        }
        Tool::RankNodes => {
            let args: RankNodesArgs = parse_args(args)?;
            to_value(&registry.rank(&args.session_id, args.k)?)
        }
        Tool::ListSessions => {
            let _: NoArgs = parse_args(args)?;
            let sessions = registry.list()?;
            to_value(&SessionListResponse {
                active_sessions: sessions.len(),
                sessions,
            })
        }
        Tool::DeleteSession => {
            let args: SessionArgs = parse_args(args)?;
            let deleted = registry.delete(&args.session_id)?;
            refresh_active(registry);
            to_value(&deleted)
        }
        Tool::GetTreeVisualization => {
            let args: VisualizationArgs = parse_args(args)?;
            registry.get(&args.session_id)?;
            let options = RenderOptions::new(
                args.format.as_deref(),
                args.show_scores,
                args.max_label_length,
                args.title,
                registry.visualization_config(),
            )?;
            to_value(&registry.visualize(&args.session_id, &options)?)
        }
    }
}

/// Call the tool named `name` with JSON `args`.
///
/// # Arguments
///
/// * `state` - Shared server state holding the session registry
/// * `name` - Tool name, e.g. `"step_tree"`
/// * `args` - Tool arguments object (`null` is treated as `{}`)
///
/// # Returns
///
/// The tool's JSON response, or a structured error.
pub async fn call_tool(state: Arc<AppState>, name: &str, args: Value) -> Result<Value, ToolError> {
    let tool = Tool::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
    let started = Instant::now();

    let result = tokio::task::spawn_blocking(move || run(&state, tool, args))
        .await
        .map_err(|e| EngineError::internal(format!("tool task failed: {}", e)))
        .and_then(|r| r);

    let outcome = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::TOOL_LATENCY
        .with_label_values(&[tool.name(), outcome])
        .observe(started.elapsed().as_secs_f64());
    debug!(
        tool = tool.name(),
        outcome,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "tool call finished"
    );

    result.map_err(ToolError::from)
}
