//! Session engine for Arbor
//!
//! This crate ties the sandboxed executor to the search algorithms:
//! - `SessionRegistry`: owns every live session and serializes access to each
//! - `Session`: one algorithm, its tree and the step counter
//! - `snapshot`: read-only views of a tree (breadth-first state, ranking)
//! - `visualize`: DOT export and Graphviz rendering
//! - `EngineError`: structured errors returned by every operation
//!
//! ```
//! use std::collections::BTreeMap;
//! use engine_core::SessionRegistry;
//! use serde_json::json;
//!
//! let registry = SessionRegistry::default();
//! let id = registry
//!     .create("StandardMCTS", Some(&json!({"exploration_weight": 1.4})))
//!     .unwrap()
//!     .session_id;
//! let sources = BTreeMap::from([(
//!     "expand".to_string(),
//!     r#"state -> state is root ? [("start", 0.5)] : []"#.to_string(),
//! )]);
//! assert_eq!(registry.step(&id, &sources).unwrap().tree_size, 2);
//! assert_eq!(registry.rank(&id, Some(1)).unwrap().ranked_nodes[0].score, 0.5);
//! ```

pub mod error;
pub mod params;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod visualize;

// Re-export main types for convenience
pub use error::{EngineError, ErrorKind};
pub use params::{parse_sources, COMMON_PARAMS};
pub use registry::{Created, Deleted, SessionHandle, SessionRegistry};
pub use session::{RankResult, Session, SessionSummary, StepReport, TreeState};
pub use snapshot::{NodeView, RankedNode, StateScore, TreeSnapshot};
pub use visualize::{DotRenderer, Format, RenderOptions, Visualization};
