//! Configuration struct definitions.
//!
//! All config structs with serde deserialization support and default values.

use crate::defaults;
use serde::Deserialize;
use std::time::Duration;

// ============================================================================
// Serde default functions (required for #[serde(default = "...")])
// These call the accessor functions from defaults module
// ============================================================================

fn d_log_level() -> String {
    defaults::log_level().into()
}
fn d_transport() -> String {
    defaults::transport().into()
}
fn d_host() -> String {
    defaults::host().into()
}
fn d_port() -> u16 {
    defaults::port()
}
fn d_allowed_origins() -> Vec<String> {
    defaults::allowed_origins().to_vec()
}
fn d_timeout_ms() -> u64 {
    defaults::timeout_ms()
}
fn d_grace_ms() -> u64 {
    defaults::grace_ms()
}
fn d_max_instructions() -> u64 {
    defaults::max_instructions()
}
fn d_max_memory_cells() -> u64 {
    defaults::max_memory_cells()
}
fn d_max_eval_depth() -> usize {
    defaults::max_eval_depth()
}
fn d_max_source_len() -> usize {
    defaults::max_source_len()
}
fn d_max_nesting() -> usize {
    defaults::max_nesting()
}
fn d_soft_branching_limit() -> usize {
    defaults::soft_branching_limit()
}
fn d_worker_stack_mb() -> usize {
    defaults::worker_stack_mb()
}
fn d_exploration_weight() -> f64 {
    defaults::default_exploration_weight()
}
fn d_samples_per_action() -> u32 {
    defaults::default_samples_per_action()
}
fn d_rank_k() -> i64 {
    defaults::default_rank_k()
}
fn d_max_rank_k() -> i64 {
    defaults::max_rank_k()
}
fn d_dot_binary() -> String {
    defaults::dot_binary().into()
}
fn d_render_timeout_ms() -> u64 {
    defaults::render_timeout_ms()
}
fn d_format() -> String {
    defaults::default_format().into()
}
fn d_max_label_length() -> usize {
    defaults::default_max_label_length()
}
fn d_score_precision() -> usize {
    defaults::score_precision()
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub visualization: VisualizationConfig,
}

/// Common configuration shared by all components
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CommonConfig {
    #[serde(default = "d_log_level")]
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            log_level: defaults::log_level().into(),
        }
    }
}

/// Tool server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// "stdio" or "http"
    #[serde(default = "d_transport")]
    pub transport: String,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    /// CORS allowed origins for the HTTP transport. Empty = allow all origins.
    #[serde(default = "d_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: defaults::transport().into(),
            host: defaults::host().into(),
            port: defaults::port(),
            allowed_origins: defaults::allowed_origins().to_vec(),
        }
    }
}

/// Budgets applied to every expansion-function invocation
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutorConfig {
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "d_grace_ms")]
    pub grace_ms: u64,
    #[serde(default = "d_max_instructions")]
    pub max_instructions: u64,
    #[serde(default = "d_max_memory_cells")]
    pub max_memory_cells: u64,
    #[serde(default = "d_max_eval_depth")]
    pub max_eval_depth: usize,
    #[serde(default = "d_max_source_len")]
    pub max_source_len: usize,
    #[serde(default = "d_max_nesting")]
    pub max_nesting: usize,
    #[serde(default = "d_soft_branching_limit")]
    pub soft_branching_limit: usize,
    #[serde(default = "d_worker_stack_mb")]
    pub worker_stack_mb: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            grace_ms: defaults::grace_ms(),
            max_instructions: defaults::max_instructions(),
            max_memory_cells: defaults::max_memory_cells(),
            max_eval_depth: defaults::max_eval_depth(),
            max_source_len: defaults::max_source_len(),
            max_nesting: defaults::max_nesting(),
            soft_branching_limit: defaults::soft_branching_limit(),
            worker_stack_mb: defaults::worker_stack_mb(),
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Search defaults and ranking limits
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    #[serde(default = "d_exploration_weight")]
    pub default_exploration_weight: f64,
    #[serde(default = "d_samples_per_action")]
    pub default_samples_per_action: u32,
    #[serde(default = "d_rank_k")]
    pub default_rank_k: i64,
    #[serde(default = "d_max_rank_k")]
    pub max_rank_k: i64,
    /// Fixed base seed for every session. None = seed from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_exploration_weight: defaults::default_exploration_weight(),
            default_samples_per_action: defaults::default_samples_per_action(),
            default_rank_k: defaults::default_rank_k(),
            max_rank_k: defaults::max_rank_k(),
            seed: None,
        }
    }
}

/// Graph export and external renderer settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisualizationConfig {
    #[serde(default = "d_dot_binary")]
    pub dot_binary: String,
    #[serde(default = "d_render_timeout_ms")]
    pub render_timeout_ms: u64,
    #[serde(default = "d_format")]
    pub default_format: String,
    #[serde(default = "d_max_label_length")]
    pub default_max_label_length: usize,
    #[serde(default = "d_score_precision")]
    pub score_precision: usize,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            dot_binary: defaults::dot_binary().into(),
            render_timeout_ms: defaults::render_timeout_ms(),
            default_format: defaults::default_format().into(),
            default_max_label_length: defaults::default_max_label_length(),
            score_precision: defaults::score_precision(),
        }
    }
}

impl VisualizationConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }
}
