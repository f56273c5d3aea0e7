//! Lexical checks run before a script is parsed.
//!
//! The screen walks the raw source once, skipping string literals and
//! comments, and rejects identifiers that name process, file-system,
//! network or dynamic-loading primitives. The interpreter exposes none of
//! these, so a hit is always a script trying to reach outside the sandbox.

use thiserror::Error;

use crate::ast::Span;

pub const DENIED_IDENTIFIERS: &[&str] = &[
    "os",
    "sys",
    "subprocess",
    "shutil",
    "socket",
    "ctypes",
    "multiprocessing",
    "eval",
    "exec",
    "compile",
    "open",
    "__import__",
    "import",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "require",
    "include",
    "load",
    "system",
    "spawn",
    "fetch",
    "env",
    "process",
    "file",
    "http",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("use of '{identifier}' is not permitted")]
pub struct ScreenHit {
    pub identifier: String,
    pub span: Span,
}

/// Why a source text was refused before compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceRejection {
    #[error("source must not be empty")]
    Empty,
    #[error("source is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },
    #[error("brackets nest {depth} levels deep, limit is {max}")]
    TooDeep { depth: usize, max: usize },
}

enum Token<'a> {
    Ident(&'a str, Span),
    Open,
    Close,
}

/// Single pass over code outside strings and comments.
fn scan<'a>(source: &'a str, mut visit: impl FnMut(Token<'a>) -> bool) {
    let bytes = source.as_bytes();
    let mut i = 0;
    let mut line = 1;
    let mut line_start = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\n' => {
                line += 1;
                line_start = i + 1;
                i += 1;
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'"' | b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    if bytes[i] == b'\\' {
                        i += 1;
                    } else if bytes[i] == b'\n' {
                        line += 1;
                        line_start = i + 1;
                    }
                    i += 1;
                }
                i += 1;
            }
            b'(' | b'[' | b'{' => {
                if !visit(Token::Open) {
                    return;
                }
                i += 1;
            }
            b')' | b']' | b'}' => {
                if !visit(Token::Close) {
                    return;
                }
                i += 1;
            }
            _ if b.is_ascii_alphanumeric() || b == b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                // Digit runs such as `1e5` are numbers, not identifiers
                if !b.is_ascii_digit() {
                    let column = source[line_start..start].chars().count() + 1;
                    if !visit(Token::Ident(&source[start..i], Span::new(line, column))) {
                        return;
                    }
                }
            }
            _ => i += 1,
        }
    }
}

/// First denied identifier in `source`, if any.
pub fn screen(source: &str) -> Result<(), ScreenHit> {
    let mut hit = None;
    scan(source, |token| {
        if let Token::Ident(name, span) = token {
            if DENIED_IDENTIFIERS.contains(&name) {
                hit = Some(ScreenHit {
                    identifier: name.to_string(),
                    span,
                });
                return false;
            }
        }
        true
    });
    match hit {
        Some(hit) => Err(hit),
        None => Ok(()),
    }
}

pub fn bracket_depth(source: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    scan(source, |token| {
        match token {
            Token::Open => {
                depth += 1;
                max = max.max(depth);
            }
            Token::Close => depth = depth.saturating_sub(1),
            Token::Ident(..) => {}
        }
        true
    });
    max
}

/// Size and shape checks shared by request validation and compilation.
pub fn check_source(
    source: &str,
    max_len: usize,
    max_nesting: usize,
) -> Result<(), SourceRejection> {
    if source.trim().is_empty() {
        return Err(SourceRejection::Empty);
    }
    let len = source.chars().count();
    if len > max_len {
        return Err(SourceRejection::TooLong { len, max: max_len });
    }
    let depth = bracket_depth(source);
    if depth > max_nesting {
        return Err(SourceRejection::TooDeep {
            depth,
            max: max_nesting,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_rejects_denied_identifier() {
        let hit = screen("state ->\n  [(os.system('ls'), 1)]").unwrap_err();
        assert_eq!(hit.identifier, "os");
        assert_eq!(hit.span, Span::new(2, 5));
    }

    #[test]
    fn test_screen_ignores_strings_and_comments() {
        assert!(screen("# open the file\nstate -> [(\"import os\", 1)]").is_ok());
        assert!(screen("s -> [('eval', 0.1)]").is_ok());
    }

    #[test]
    fn test_screen_matches_whole_identifiers() {
        assert!(screen("opener -> profile").is_ok());
        assert!(screen("x -> __import__('os')").is_err());
    }

    #[test]
    fn test_bracket_depth_skips_strings() {
        assert_eq!(bracket_depth("[[1], (2)]"), 2);
        assert_eq!(bracket_depth("'((((' "), 0);
    }

    #[test]
    fn test_check_source_limits() {
        assert_eq!(check_source("   ", 10, 4), Err(SourceRejection::Empty));
        assert_eq!(
            check_source("x -> [x, x]", 5, 4),
            Err(SourceRejection::TooLong { len: 11, max: 5 })
        );
        assert_eq!(
            check_source("[[[1]]]", 100, 2),
            Err(SourceRejection::TooDeep { depth: 3, max: 2 })
        );
        assert!(check_source("x -> []", 100, 2).is_ok());
    }
}
