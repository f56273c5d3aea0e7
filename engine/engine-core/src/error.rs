//! Engine errors and their structured wire payload.
//!
//! Every failure a tool can report maps onto one [`ErrorKind`]. Expansion
//! failures keep the sandbox's own kind so callers can tell a timeout from
//! a compile error without parsing messages.

use std::fmt;

use mcts::ParamError;
use sandbox::{ExecutionFailure, FailureKind, Span};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    ValidationError,
    NotFoundError,
    CompileError,
    RuntimeError,
    Timeout,
    ResourceExceeded,
    InvalidOutput,
    Forbidden,
    DependencyUnavailable,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::NotFoundError => "NotFoundError",
            Self::CompileError => "CompileError",
            Self::RuntimeError => "RuntimeError",
            Self::Timeout => "Timeout",
            Self::ResourceExceeded => "ResourceExceeded",
            Self::InvalidOutput => "InvalidOutput",
            Self::Forbidden => "Forbidden",
            Self::DependencyUnavailable => "DependencyUnavailable",
            Self::InternalError => "InternalError",
        }
    }

    /// True for failures raised by a user's expansion function.
    pub fn is_execution(self) -> bool {
        matches!(
            self,
            Self::CompileError
                | Self::RuntimeError
                | Self::Timeout
                | Self::ResourceExceeded
                | Self::InvalidOutput
                | Self::Forbidden
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<FailureKind> for ErrorKind {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::CompileError => Self::CompileError,
            FailureKind::RuntimeError => Self::RuntimeError,
            FailureKind::Timeout => Self::Timeout,
            FailureKind::ResourceExceeded => Self::ResourceExceeded,
            FailureKind::InvalidOutput => Self::InvalidOutput,
            FailureKind::Forbidden => Self::Forbidden,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("session '{session_id}' not found")]
    NotFound { session_id: String },

    #[error(transparent)]
    Execution(#[from] ExecutionFailure),

    #[error("{message}")]
    DependencyUnavailable { message: String, hint: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::NotFound { .. } => ErrorKind::NotFoundError,
            Self::Execution(failure) => failure.kind.into(),
            Self::DependencyUnavailable { .. } => ErrorKind::DependencyUnavailable,
            Self::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// The `{"error": {...}}` object returned to tool callers.
    pub fn payload(&self) -> Value {
        let mut body = ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            field: None,
            function: None,
            location: None,
            index: None,
            hint: None,
        };
        match self {
            Self::Validation { field, .. } => body.field = Some(field.clone()),
            Self::Execution(failure) => {
                body.message = failure.detail.clone();
                body.function = Some(failure.function.clone());
                body.location = failure.location;
                body.index = failure.index;
            }
            Self::DependencyUnavailable { hint, .. } => body.hint = Some(hint.clone()),
            Self::NotFound { .. } | Self::Internal(_) => {}
        }
        serde_json::json!({ "error": body })
    }
}

impl From<ParamError> for EngineError {
    fn from(err: ParamError) -> Self {
        Self::Validation {
            field: err.field,
            message: err.message,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    kind: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Span>,
    #[serde(skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}
