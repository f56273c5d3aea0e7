//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable overrides.

use crate::CentralConfig;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",      // Current directory
    "../config.toml",   // Parent directory (when running from subdirectory)
    "/app/config.toml", // Docker container
];

/// Load the central configuration from config.toml.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by ARBOR_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
/// 4. Docker container path (/app/config.toml)
///
/// After loading, environment variable overrides are applied.
pub fn load_config() -> CentralConfig {
    if let Ok(path) = std::env::var("ARBOR_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from ARBOR_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "ARBOR_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(&path);
        }
    }

    debug!("No config.toml found, using built-in defaults");
    apply_env_overrides(CentralConfig::default())
}

/// Load configuration from a specific path.
pub fn load_from_path(path: &Path) -> CentralConfig {
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => apply_env_overrides(config),
            Err(e) => {
                warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                apply_env_overrides(CentralConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}, using defaults", path.display(), e);
            apply_env_overrides(CentralConfig::default())
        }
    }
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (u16, u64, f64, ...)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = v;
        }
    };
    // Optional parseable field (Option<u64>, ...)
    ($config:expr, $section:ident . $field:ident, $key:expr, optional_parse) => {
        if let Ok(v) =
            std::env::var($key).and_then(|s| s.parse().map_err(|_| std::env::VarError::NotPresent))
        {
            $config.$section.$field = Some(v);
        }
    };
    // Comma-separated list field
    ($config:expr, $section:ident . $field:ident, $key:expr, list) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: ARBOR_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Common
    env_override!(config, common.log_level, "ARBOR_COMMON_LOG_LEVEL");

    // Server
    env_override!(config, server.transport, "ARBOR_SERVER_TRANSPORT");
    env_override!(config, server.host, "ARBOR_SERVER_HOST");
    env_override!(config, server.port, "ARBOR_SERVER_PORT", parse);
    env_override!(
        config,
        server.allowed_origins,
        "ARBOR_SERVER_ALLOWED_ORIGINS",
        list
    );

    // Executor
    env_override!(
        config,
        executor.timeout_ms,
        "ARBOR_EXECUTOR_TIMEOUT_MS",
        parse
    );
    env_override!(config, executor.grace_ms, "ARBOR_EXECUTOR_GRACE_MS", parse);
    env_override!(
        config,
        executor.max_instructions,
        "ARBOR_EXECUTOR_MAX_INSTRUCTIONS",
        parse
    );
    env_override!(
        config,
        executor.max_memory_cells,
        "ARBOR_EXECUTOR_MAX_MEMORY_CELLS",
        parse
    );
    env_override!(
        config,
        executor.max_eval_depth,
        "ARBOR_EXECUTOR_MAX_EVAL_DEPTH",
        parse
    );
    env_override!(
        config,
        executor.max_source_len,
        "ARBOR_EXECUTOR_MAX_SOURCE_LEN",
        parse
    );
    env_override!(
        config,
        executor.max_nesting,
        "ARBOR_EXECUTOR_MAX_NESTING",
        parse
    );
    env_override!(
        config,
        executor.soft_branching_limit,
        "ARBOR_EXECUTOR_SOFT_BRANCHING_LIMIT",
        parse
    );
    env_override!(
        config,
        executor.worker_stack_mb,
        "ARBOR_EXECUTOR_WORKER_STACK_MB",
        parse
    );

    // Search
    env_override!(
        config,
        search.default_exploration_weight,
        "ARBOR_SEARCH_DEFAULT_EXPLORATION_WEIGHT",
        parse
    );
    env_override!(
        config,
        search.default_samples_per_action,
        "ARBOR_SEARCH_DEFAULT_SAMPLES_PER_ACTION",
        parse
    );
    env_override!(
        config,
        search.default_rank_k,
        "ARBOR_SEARCH_DEFAULT_RANK_K",
        parse
    );
    env_override!(config, search.max_rank_k, "ARBOR_SEARCH_MAX_RANK_K", parse);
    env_override!(config, search.seed, "ARBOR_SEARCH_SEED", optional_parse);

    // Visualization
    env_override!(
        config,
        visualization.dot_binary,
        "ARBOR_VISUALIZATION_DOT_BINARY"
    );
    env_override!(
        config,
        visualization.render_timeout_ms,
        "ARBOR_VISUALIZATION_RENDER_TIMEOUT_MS",
        parse
    );
    env_override!(
        config,
        visualization.default_format,
        "ARBOR_VISUALIZATION_DEFAULT_FORMAT"
    );
    env_override!(
        config,
        visualization.default_max_label_length,
        "ARBOR_VISUALIZATION_DEFAULT_MAX_LABEL_LENGTH",
        parse
    );
    env_override!(
        config,
        visualization.score_precision,
        "ARBOR_VISUALIZATION_SCORE_PRECISION",
        parse
    );

    config
}
