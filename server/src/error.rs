//! Tool-call errors and their HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use engine_core::{EngineError, ErrorKind};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownTool(_) => ErrorKind::NotFoundError,
            Self::Engine(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::NotFoundError => StatusCode::NOT_FOUND,
            ErrorKind::DependencyUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            kind if kind.is_execution() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::UnknownTool(name) => json!({
                "error": {
                    "kind": ErrorKind::NotFoundError,
                    "message": self.to_string(),
                    "field": "name",
                    "hint": format!("available tools: {}", crate::tools::Tool::names().join(", ")),
                    "tool": name,
                }
            }),
            Self::Engine(e) => e.payload(),
        }
    }
}

impl IntoResponse for ToolError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.payload())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::EngineError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (EngineError::validation("k", "bad"), StatusCode::BAD_REQUEST),
            (
                EngineError::NotFound {
                    session_id: "x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                EngineError::DependencyUnavailable {
                    message: "no dot".into(),
                    hint: "install".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (EngineError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ToolError::from(err).status(), status);
        }
        assert_eq!(
            ToolError::UnknownTool("grow".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_unknown_tool_payload_lists_tools() {
        let payload = ToolError::UnknownTool("grow".into()).payload();
        assert_eq!(payload["error"]["kind"], "NotFoundError");
        assert!(payload["error"]["hint"].as_str().unwrap().contains("init_tree"));
    }
}
