//! Session registry.
//!
//! The registry owns every live session for the lifetime of the process.
//! Map mutations take the write lock; each session sits behind its own
//! mutex so different sessions step in parallel. A small summary cell per
//! session lets listing proceed while a step is running.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use engine_config::{CentralConfig, SearchConfig, VisualizationConfig};
use mcts::{AlgorithmKind, AlgorithmParams};
use sandbox::{Executor, Limits};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use crate::params::{parse_algorithm, parse_init_params, validate_rank_k};
use crate::session::{derive_seed, RankResult, Session, SessionSummary, StepReport, TreeState};
use crate::visualize::{DotRenderer, RenderOptions, Visualization};

/// Response of `create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Created {
    pub session_id: String,
    pub algorithm: AlgorithmKind,
    pub parameters: AlgorithmParams,
    pub ignored_parameters: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub status: &'static str,
}

/// Response of `delete`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deleted {
    pub session_id: String,
    pub deleted: bool,
    pub status: &'static str,
}

/// A registered session plus its lock-free-to-read summary.
#[derive(Debug)]
pub struct SessionHandle {
    seq: u64,
    summary: Mutex<SessionSummary>,
    session: Mutex<Session>,
}

impl SessionHandle {
    /// Exclusive access to the session for the duration of the guard.
    pub fn lock(&self) -> Result<MutexGuard<'_, Session>, EngineError> {
        self.session
            .lock()
            .map_err(|_| EngineError::internal("session lock poisoned by an earlier failure"))
    }

    pub fn summary(&self) -> Result<SessionSummary, EngineError> {
        self.summary
            .lock()
            .map(|s| s.clone())
            .map_err(|_| EngineError::internal("session summary lock poisoned"))
    }

    fn publish(&self, session: &Session) {
        match self.summary.lock() {
            Ok(mut cell) => *cell = session.summary(),
            Err(poisoned) => *poisoned.into_inner() = session.summary(),
        }
    }
}

fn registry_poisoned<T>(_: T) -> EngineError {
    EngineError::internal("session registry lock poisoned")
}

#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    next_seq: AtomicU64,
    executor: Executor,
    renderer: DotRenderer,
    search: SearchConfig,
    visualization: VisualizationConfig,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(&CentralConfig::default())
    }
}

impl SessionRegistry {
    pub fn new(config: &CentralConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            executor: Executor::new(Limits::from(&config.executor)),
            renderer: DotRenderer::from_config(&config.visualization),
            search: config.search.clone(),
            visualization: config.visualization.clone(),
        }
    }

    /// Builder pattern: replace the expansion executor.
    pub fn with_executor(mut self, executor: Executor) -> Self {
        self.executor = executor;
        self
    }

    /// Builder pattern: replace the Graphviz runner.
    pub fn with_renderer(mut self, renderer: DotRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn visualization_config(&self) -> &VisualizationConfig {
        &self.visualization
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create and register a session.
    ///
    /// # Arguments
    ///
    /// * `algorithm` - One of `StandardMCTS`, `ABMCTSA`, `ABMCTSM`
    /// * `params` - Optional algorithm parameters object
    ///
    /// # Returns
    ///
    /// The new session id with the effective parameters, or a
    /// `ValidationError` naming the first bad field.
    pub fn create(
        &self,
        algorithm: &str,
        params: Option<&serde_json::Value>,
    ) -> Result<Created, EngineError> {
        let kind = parse_algorithm(algorithm)?;
        let init = parse_init_params(kind, params, &self.search)?;

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let seed = match self.search.seed {
            Some(base) => derive_seed(base, seq),
            None => rand::random(),
        };
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let session = Session::new(id.clone(), init.params, seed, created_at)?;
        let parameters = session.parameters();

        let handle = Arc::new(SessionHandle {
            seq,
            summary: Mutex::new(session.summary()),
            session: Mutex::new(session),
        });
        self.sessions
            .write()
            .map_err(registry_poisoned)?
            .insert(id.clone(), handle);

        if !init.ignored.is_empty() {
            info!(session_id = %id, ignored = ?init.ignored, "parameters ignored for {}", kind);
        }
        info!(session_id = %id, algorithm = %kind, "session created");
        Ok(Created {
            session_id: id,
            algorithm: kind,
            parameters,
            ignored_parameters: init.ignored,
            created_at,
            status: "initialized",
        })
    }

    /// Look up a session by id.
    pub fn get(&self, session_id: &str) -> Result<Arc<SessionHandle>, EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::validation("session_id", "must not be empty"));
        }
        self.sessions
            .read()
            .map_err(registry_poisoned)?
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Summaries of all sessions, oldest first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, EngineError> {
        let mut handles: Vec<Arc<SessionHandle>> = self
            .sessions
            .read()
            .map_err(registry_poisoned)?
            .values()
            .cloned()
            .collect();
        handles.sort_by_key(|h| h.seq);

        let mut summaries = handles
            .iter()
            .map(|h| h.summary())
            .collect::<Result<Vec<_>, _>>()?;
        // seq is already monotonic; the stable sort keeps it as the tie-break
        summaries.sort_by_key(|s| s.created_at);
        Ok(summaries)
    }

    /// Remove a session. A step running on it finishes on its own handle.
    pub fn delete(&self, session_id: &str) -> Result<Deleted, EngineError> {
        if session_id.trim().is_empty() {
            return Err(EngineError::validation("session_id", "must not be empty"));
        }
        let removed = self
            .sessions
            .write()
            .map_err(registry_poisoned)?
            .remove(session_id);
        match removed {
            Some(_) => {
                info!(session_id, "session deleted");
                Ok(Deleted {
                    session_id: session_id.to_string(),
                    deleted: true,
                    status: "deleted",
                })
            }
            None => Err(EngineError::NotFound {
                session_id: session_id.to_string(),
            }),
        }
    }

    pub fn step(
        &self,
        session_id: &str,
        sources: &BTreeMap<String, String>,
    ) -> Result<StepReport, EngineError> {
        let handle = self.get(session_id)?;
        let mut session = handle.lock()?;
        let report = session.step(sources, &self.executor);
        if report.is_ok() {
            handle.publish(&session);
        }
        report
    }

    pub fn state(&self, session_id: &str) -> Result<TreeState, EngineError> {
        let handle = self.get(session_id)?;
        let session = handle.lock()?;
        Ok(session.extract_state())
    }

    /// Rank with `k` defaulting to `search.default_rank_k`.
    pub fn rank(&self, session_id: &str, k: Option<i64>) -> Result<RankResult, EngineError> {
        let handle = self.get(session_id)?;
        let k = validate_rank_k(k.unwrap_or(self.search.default_rank_k), self.search.max_rank_k)?;
        let session = handle.lock()?;
        Ok(session.rank(k))
    }

    pub fn visualize(
        &self,
        session_id: &str,
        options: &RenderOptions,
    ) -> Result<Visualization, EngineError> {
        let handle = self.get(session_id)?;
        let session = handle.lock()?;
        session.visualize(options, &self.renderer)
    }
}
