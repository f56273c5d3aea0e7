//! Response types for the HTTP surface.

use engine_core::SessionSummary;
use serde::Serialize;
use serde_json::Value;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

/// Catalogue entry for one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDescriptor>,
}

/// Response of `list_sessions`.
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub active_sessions: usize,
    pub sessions: Vec<SessionSummary>,
}
