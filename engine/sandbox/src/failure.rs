use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ast::Span;

/// Failure categories an expansion function can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    CompileError,
    RuntimeError,
    Timeout,
    ResourceExceeded,
    InvalidOutput,
    Forbidden,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::CompileError => "CompileError",
            FailureKind::RuntimeError => "RuntimeError",
            FailureKind::Timeout => "Timeout",
            FailureKind::ResourceExceeded => "ResourceExceeded",
            FailureKind::InvalidOutput => "InvalidOutput",
            FailureKind::Forbidden => "Forbidden",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed compile or invocation of a named expansion function.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub struct ExecutionFailure {
    pub kind: FailureKind,
    pub function: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Span>,
    /// Offending element of the returned list, for `InvalidOutput`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

impl ExecutionFailure {
    pub fn new(kind: FailureKind, function: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            function: function.into(),
            detail: detail.into(),
            location: None,
            index: None,
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.location = Some(span);
        self
    }

    pub fn at_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} in '{}': {}", self.kind, self.function, self.detail)?;
        if let Some(span) = self.location {
            write!(f, " (line {}, column {})", span.line, span.column)?;
        }
        if let Some(index) = self.index {
            write!(f, " (element {})", index)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_location_and_index() {
        let failure = ExecutionFailure::new(FailureKind::InvalidOutput, "gen", "bad score")
            .at(Span::new(2, 5))
            .at_index(3);
        assert_eq!(
            failure.to_string(),
            "InvalidOutput in 'gen': bad score (line 2, column 5) (element 3)"
        );
    }

    #[test]
    fn test_serialize_skips_missing_fields() {
        let failure = ExecutionFailure::new(FailureKind::Timeout, "gen", "exceeded 5000ms");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "Timeout");
        assert!(json.get("location").is_none());
        assert!(json.get("index").is_none());
    }
}
