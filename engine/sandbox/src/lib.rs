//! Restricted interpreter for untrusted expansion functions.
//!
//! Expansion functions are small scripts supplied with every search step.
//! They map a node state (or the root sentinel) to a list of scored
//! successors. Scripts are written in a purely functional expression
//! language with no I/O surface; every invocation runs on its own worker
//! thread under an instruction, memory, depth and wall-clock budget.
//!
//! ```
//! use sandbox::{Executor, Limits};
//!
//! let executor = Executor::new(Limits::default());
//! let f = executor
//!     .compile("gen", r#"state -> state is root ? [("start", 0.5)] : []"#)
//!     .unwrap();
//! let out = executor.invoke(&f, None, 0).unwrap();
//! assert_eq!(out.successors[0].score, 0.5);
//! ```

pub mod ast;
mod builtins;
mod executor;
pub mod failure;
mod interp;
mod limits;
mod output;
pub mod parser;
mod resolve;
pub mod screen;
mod value;

pub use ast::Span;
pub use builtins::Builtin;
pub use executor::{CompiledFunction, Executor, Invocation};
pub use failure::{ExecutionFailure, FailureKind};
pub use interp::ENTRY_NAMES;
pub use limits::{Limits, MAX_VALUE_DEPTH};
pub use output::ScoredSuccessor;
pub use resolve::{check_program, StaticError};
pub use screen::{check_source, SourceRejection, DENIED_IDENTIFIERS};
