use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::ast::{Program, Span};
use crate::failure::{ExecutionFailure, FailureKind};
use crate::interp::Interp;
use crate::limits::{Fault, Limits};
use crate::output::{collect_successors, ScoredSuccessor};
use crate::parser::parse_program;
use crate::resolve::check_program;
use crate::screen::{check_source, screen};
use crate::value::Value;

/// A parsed and statically checked expansion function.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    name: String,
    program: Arc<Program>,
}

impl CompiledFunction {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Result of one successful invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub successors: Vec<ScoredSuccessor>,
    /// Advisory message when the successor count is above the soft limit.
    pub warning: Option<String>,
    pub instructions: u64,
    pub memory_cells: u64,
    pub elapsed: Duration,
}

enum WorkerLost {
    TimedOut,
    Crashed(String),
}

/// Run `job` on a fresh thread with its own stack and wait at most `wait`.
fn on_worker<T, F>(stack_bytes: usize, wait: Duration, job: F) -> Result<T, WorkerLost>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::sync_channel(1);
    let spawned = thread::Builder::new()
        .name("arbor-expand".into())
        .stack_size(stack_bytes)
        .spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job));
            let _ = tx.send(outcome);
        });
    if let Err(e) = spawned {
        return Err(WorkerLost::Crashed(format!("could not start worker: {}", e)));
    }

    match rx.recv_timeout(wait) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(payload)) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(WorkerLost::Crashed(message))
        }
        Err(RecvTimeoutError::Timeout) => Err(WorkerLost::TimedOut),
        Err(RecvTimeoutError::Disconnected) => {
            Err(WorkerLost::Crashed("worker exited without a result".into()))
        }
    }
}

fn fault_to_failure(fault: Fault, function: &str) -> ExecutionFailure {
    match fault {
        Fault::Runtime { message, span } => {
            ExecutionFailure::new(FailureKind::RuntimeError, function, message).at(span)
        }
        Fault::Timeout { after } => ExecutionFailure::new(
            FailureKind::Timeout,
            function,
            format!("exceeded the {}ms time limit", after.as_millis()),
        ),
        Fault::Exhausted { resource, limit } => ExecutionFailure::new(
            FailureKind::ResourceExceeded,
            function,
            format!("{} limit of {} exceeded", resource, limit),
        ),
    }
}

/// Compiles and runs expansion functions under a fixed set of limits.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    limits: Limits,
}

impl Executor {
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn lost(&self, lost: WorkerLost, function: &str, during: &str) -> ExecutionFailure {
        match lost {
            WorkerLost::TimedOut => {
                warn!(function, during, "expansion worker did not answer in time");
                ExecutionFailure::new(
                    FailureKind::Timeout,
                    function,
                    format!(
                        "exceeded the {}ms time limit during {}",
                        self.limits.timeout.as_millis(),
                        during
                    ),
                )
            }
            WorkerLost::Crashed(message) => {
                warn!(function, during, %message, "expansion worker crashed");
                ExecutionFailure::new(
                    FailureKind::RuntimeError,
                    function,
                    format!("interpreter failure during {}: {}", during, message),
                )
            }
        }
    }

    /// Screen, parse and check `source`.
    pub fn compile(&self, name: &str, source: &str) -> Result<CompiledFunction, ExecutionFailure> {
        check_source(source, self.limits.max_source_len, self.limits.max_nesting).map_err(|e| {
            ExecutionFailure::new(FailureKind::CompileError, name, e.to_string())
        })?;
        screen(source).map_err(|hit| {
            ExecutionFailure::new(FailureKind::Forbidden, name, hit.to_string()).at(hit.span)
        })?;

        let owned = source.to_string();
        let parsed = on_worker(
            self.limits.worker_stack_bytes,
            self.limits.timeout + self.limits.grace,
            move || -> Result<Program, (String, Span)> {
                let program = parse_program(&owned).map_err(|e| (e.message, e.span))?;
                check_program(&program).map_err(|e| (e.message, e.span))?;
                Ok(program)
            },
        )
        .map_err(|lost| self.lost(lost, name, "compilation"))?;

        let program = parsed.map_err(|(message, span)| {
            ExecutionFailure::new(FailureKind::CompileError, name, message).at(span)
        })?;
        debug!(function = name, items = program.items.len(), "compiled expansion function");
        Ok(CompiledFunction {
            name: name.to_string(),
            program: Arc::new(program),
        })
    }

    /// Apply a compiled function to `state` (`None` for the root).
    pub fn invoke(
        &self,
        function: &CompiledFunction,
        state: Option<&serde_json::Value>,
        seed: u64,
    ) -> Result<Invocation, ExecutionFailure> {
        let program = Arc::clone(&function.program);
        let limits = self.limits.clone();
        let input = state.cloned();
        let name = function.name.clone();
        let started = Instant::now();

        let outcome = on_worker(
            self.limits.worker_stack_bytes,
            self.limits.timeout + self.limits.grace,
            move || -> Result<Invocation, ExecutionFailure> {
                let mut interp = Interp::new(&program, &limits, seed);
                let state = input.as_ref().map_or(Value::Root, Value::from_json);
                let output = interp
                    .run(state)
                    .map_err(|fault| fault_to_failure(fault, &name))?;
                let successors = collect_successors(&output, &name)?;
                let warning = (successors.len() > limits.soft_branching_limit).then(|| {
                    format!(
                        "expansion function '{}' returned {} successors, \
                         above the advisory limit of {}",
                        name,
                        successors.len(),
                        limits.soft_branching_limit
                    )
                });
                Ok(Invocation {
                    successors,
                    warning,
                    instructions: interp.budget.instructions_used(),
                    memory_cells: interp.budget.cells_used(),
                    elapsed: interp.budget.elapsed(),
                })
            },
        )
        .map_err(|lost| self.lost(lost, &function.name, "execution"))?;

        match &outcome {
            Ok(inv) => debug!(
                function = %function.name,
                successors = inv.successors.len(),
                instructions = inv.instructions,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "expansion function returned"
            ),
            Err(failure) => debug!(
                function = %function.name,
                kind = %failure.kind,
                detail = %failure.detail,
                "expansion function failed"
            ),
        }
        outcome
    }

    pub fn compile_and_run(
        &self,
        name: &str,
        source: &str,
        state: Option<&serde_json::Value>,
        seed: u64,
    ) -> Result<Invocation, ExecutionFailure> {
        let compiled = self.compile(name, source)?;
        self.invoke(&compiled, state, seed)
    }
}
