//! Arbor tool server
//!
//! Exposes tree-search sessions as tools over two transports:
//! - MCP JSON-RPC on stdio (`mcp::serve_stdio`)
//! - HTTP:
//!   - GET  /health        - Health check
//!   - GET  /metrics       - Prometheus metrics
//!   - GET  /tools         - Tool catalogue with input schemas
//!   - POST /tools/:name   - Call a tool (JSON body = arguments)
//!   - GET  /sessions      - Shortcut for `list_sessions`

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use engine_config::CentralConfig;
use engine_core::SessionRegistry;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

pub mod error;
pub mod handlers;
pub mod mcp;
pub mod metrics;
pub mod tools;
pub mod types;

use handlers::{health, invoke_tool, list_sessions, list_tools, metrics_handler};

/// Shared application state
pub struct AppState {
    /// Every live session
    pub registry: Arc<SessionRegistry>,
    /// Effective configuration after env and CLI overrides
    pub config: CentralConfig,
}

impl AppState {
    pub fn new(config: CentralConfig) -> Self {
        metrics::init_metrics();
        Self {
            registry: Arc::new(SessionRegistry::new(&config)),
            config,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(parsed))
}

/// Create the application router with the given state.
pub fn create_app(state: Arc<AppState>) -> Router {
    metrics::init_metrics();
    let cors = cors_layer(&state.config.server.allowed_origins);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/tools", get(list_tools))
        .route("/tools/:name", post(invoke_tool))
        .route("/sessions", get(list_sessions))
        .layer(cors)
        .with_state(state)
}

/// Create application state for tests: built-in defaults, no config file or env.
#[doc(hidden)]
pub fn create_test_state() -> Arc<AppState> {
    Arc::new(AppState::new(CentralConfig::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_accepts_lists() {
        // Invalid entries are dropped rather than failing startup
        let _ = cors_layer(&["http://localhost:3000".into(), "bad\norigin".into()]);
        let _ = cors_layer(&[]);
    }
}
