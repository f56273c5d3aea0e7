use std::time::{Duration, Instant};

use engine_config::ExecutorConfig;

use crate::ast::Span;

/// Values may not nest deeper than this. Bounds every recursive walk over
/// a value (equality, conversion, drop) independently of the stack size.
pub const MAX_VALUE_DEPTH: usize = 256;

/// Deadline is polled once per this many instructions.
const DEADLINE_CHECK_INTERVAL: u32 = 1024;

/// Per-invocation resource ceilings.
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    pub timeout: Duration,
    pub grace: Duration,
    pub max_instructions: u64,
    pub max_memory_cells: u64,
    pub max_eval_depth: usize,
    pub max_source_len: usize,
    pub max_nesting: usize,
    pub soft_branching_limit: usize,
    pub worker_stack_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&ExecutorConfig::default())
    }
}

impl From<&ExecutorConfig> for Limits {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            timeout: config.timeout(),
            grace: config.grace(),
            max_instructions: config.max_instructions,
            max_memory_cells: config.max_memory_cells,
            max_eval_depth: config.max_eval_depth,
            max_source_len: config.max_source_len,
            max_nesting: config.max_nesting,
            soft_branching_limit: config.soft_branching_limit,
            worker_stack_bytes: config.worker_stack_mb.max(1) * 1024 * 1024,
        }
    }
}

impl Limits {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    pub fn with_max_memory_cells(mut self, max: u64) -> Self {
        self.max_memory_cells = max;
        self
    }

    pub fn with_max_eval_depth(mut self, max: usize) -> Self {
        self.max_eval_depth = max;
        self
    }

    pub fn with_soft_branching_limit(mut self, limit: usize) -> Self {
        self.soft_branching_limit = limit;
        self
    }
}

/// Why evaluation stopped early.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Fault {
    Runtime { message: String, span: Span },
    Timeout { after: Duration },
    Exhausted { resource: &'static str, limit: u64 },
}

impl Fault {
    pub(crate) fn runtime(message: impl Into<String>, span: Span) -> Self {
        Fault::Runtime {
            message: message.into(),
            span,
        }
    }
}

pub(crate) type Eval<T> = Result<T, Fault>;

/// Running meters for one invocation.
#[derive(Debug)]
pub(crate) struct Budget {
    fuel: u64,
    cells: u64,
    depth: usize,
    ticks: u32,
    started: Instant,
    deadline: Instant,
    limits: Limits,
}

impl Budget {
    pub(crate) fn new(limits: &Limits) -> Self {
        let started = Instant::now();
        Self {
            fuel: limits.max_instructions,
            cells: limits.max_memory_cells,
            depth: 0,
            ticks: 0,
            started,
            deadline: started + limits.timeout,
            limits: limits.clone(),
        }
    }

    pub(crate) fn tick(&mut self) -> Eval<()> {
        if self.fuel == 0 {
            return Err(Fault::Exhausted {
                resource: "instructions",
                limit: self.limits.max_instructions,
            });
        }
        self.fuel -= 1;
        self.ticks += 1;
        if self.ticks >= DEADLINE_CHECK_INTERVAL {
            self.ticks = 0;
            self.check_deadline()?;
        }
        Ok(())
    }

    pub(crate) fn check_deadline(&self) -> Eval<()> {
        if Instant::now() >= self.deadline {
            return Err(Fault::Timeout {
                after: self.limits.timeout,
            });
        }
        Ok(())
    }

    /// Charge `n` memory cells.
    pub(crate) fn alloc(&mut self, n: usize) -> Eval<()> {
        let n = n as u64;
        if n > self.cells {
            self.cells = 0;
            return Err(Fault::Exhausted {
                resource: "memory",
                limit: self.limits.max_memory_cells,
            });
        }
        self.cells -= n;
        Ok(())
    }

    pub(crate) fn enter(&mut self) -> Eval<()> {
        if self.depth >= self.limits.max_eval_depth {
            return Err(Fault::Exhausted {
                resource: "evaluation depth",
                limit: self.limits.max_eval_depth as u64,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub(crate) fn check_value_depth(&self, depth: usize) -> Eval<()> {
        if depth > MAX_VALUE_DEPTH {
            return Err(Fault::Exhausted {
                resource: "value nesting",
                limit: MAX_VALUE_DEPTH as u64,
            });
        }
        Ok(())
    }

    pub(crate) fn instructions_used(&self) -> u64 {
        self.limits.max_instructions - self.fuel
    }

    pub(crate) fn cells_used(&self) -> u64 {
        self.limits.max_memory_cells - self.cells
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_from_config() {
        let limits = Limits::default();
        assert_eq!(limits.timeout, Duration::from_millis(5000));
        assert_eq!(limits.worker_stack_bytes, 64 * 1024 * 1024);
        assert_eq!(limits.max_source_len, 10_000);
    }

    #[test]
    fn test_fuel_runs_out() {
        let limits = Limits::default().with_max_instructions(3);
        let mut budget = Budget::new(&limits);
        for _ in 0..3 {
            budget.tick().unwrap();
        }
        assert_eq!(
            budget.tick(),
            Err(Fault::Exhausted {
                resource: "instructions",
                limit: 3
            })
        );
        assert_eq!(budget.instructions_used(), 3);
    }

    #[test]
    fn test_alloc_and_depth() {
        let limits = Limits::default()
            .with_max_memory_cells(10)
            .with_max_eval_depth(1);
        let mut budget = Budget::new(&limits);
        budget.alloc(8).unwrap();
        assert!(budget.alloc(3).is_err());
        budget.enter().unwrap();
        assert!(budget.enter().is_err());
        budget.leave();
        budget.enter().unwrap();
    }

    #[test]
    fn test_zero_timeout_trips_deadline() {
        let limits = Limits::default().with_timeout(Duration::ZERO);
        let budget = Budget::new(&limits);
        assert!(matches!(budget.check_deadline(), Err(Fault::Timeout { .. })));
    }
}
