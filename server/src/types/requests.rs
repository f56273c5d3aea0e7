//! Tool arguments.
//!
//! Unknown argument names are rejected so that a misspelt option never
//! silently falls back to its default.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitTreeArgs {
    /// "StandardMCTS", "ABMCTSA" or "ABMCTSM"
    pub algorithm: String,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepTreeArgs {
    pub session_id: String,
    /// Expansion-function name -> script source
    #[serde(default)]
    pub generate_functions: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionArgs {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankNodesArgs {
    pub session_id: String,
    #[serde(default)]
    pub k: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualizationArgs {
    pub session_id: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub show_scores: Option<bool>,
    #[serde(default)]
    pub max_label_length: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}
