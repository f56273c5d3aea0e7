//! Tool endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{call_tool, catalogue};
use crate::types::ToolListResponse;
use crate::AppState;

/// List the tool catalogue with input schemas.
pub async fn list_tools() -> Json<ToolListResponse> {
    Json(ToolListResponse { tools: catalogue() })
}

/// Call a tool; the JSON body holds its arguments. A missing body means `{}`.
pub async fn invoke_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, ToolError> {
    let args = body.map(|Json(v)| v).unwrap_or_else(|| json!({}));
    call_tool(state, &name, args).await.map(Json)
}

/// Shortcut for `list_sessions`.
pub async fn list_sessions(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ToolError> {
    call_tool(state, "list_sessions", json!({})).await.map(Json)
}
