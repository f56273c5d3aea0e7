//! Rendering DOT text to an image with the external Graphviz `dot` binary.

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use engine_config::VisualizationConfig;
use tracing::{debug, warn};

use super::Format;
use crate::error::EngineError;

pub const INSTALL_HINT: &str = "Please install Graphviz: https://graphviz.org/download/ \
    (or set visualization.dot_binary). Request format \"dot\" to get the graph text \
    without rendering.";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs `dot -T<format>` with a wall-clock limit.
#[derive(Debug, Clone)]
pub struct DotRenderer {
    binary: String,
    timeout: Duration,
}

impl DotRenderer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &VisualizationConfig) -> Self {
        Self::new(config.dot_binary.clone(), config.render_timeout())
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Render `source` to `format`. Returns the raw bytes `dot` produced.
    ///
    /// A missing binary maps to `DependencyUnavailable`; a non-zero exit or
    /// an overrun of the timeout maps to `InternalError`.
    pub fn render(&self, source: &str, format: Format) -> Result<Vec<u8>, EngineError> {
        let started = Instant::now();
        let mut child = Command::new(&self.binary)
            .arg(format!("-T{}", format.as_str()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let (Some(mut stdin), Some(mut stdout), Some(mut stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            return Err(EngineError::internal("graphviz pipes were not opened"));
        };

        // Feed and drain on helper threads so a full pipe never stalls the wait
        let input = source.as_bytes().to_vec();
        let writer = thread::spawn(move || stdin.write_all(&input));
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });
        let err_reader = thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    warn!(
                        binary = %self.binary,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "graphviz render timed out"
                    );
                    return Err(EngineError::internal(format!(
                        "graphviz did not finish within {}ms",
                        self.timeout.as_millis()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(EngineError::internal(format!("waiting for graphviz: {}", e))),
            }
        };

        let stderr_text = err_reader.join().unwrap_or_default();
        let output = reader
            .join()
            .map_err(|_| EngineError::internal("graphviz output reader panicked"))?
            .map_err(|e| EngineError::internal(format!("reading graphviz output: {}", e)))?;
        if let Ok(Err(e)) = writer.join() {
            // dot closes stdin early when it rejects the input; the exit status says why
            debug!(error = %e, "graphviz stopped reading input");
        }

        if !status.success() {
            return Err(EngineError::internal(format!(
                "graphviz exited with {}: {}",
                status,
                stderr_text.trim()
            )));
        }
        debug!(
            format = format.as_str(),
            bytes = output.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "graphviz render finished"
        );
        Ok(output)
    }

    fn spawn_error(&self, e: io::Error) -> EngineError {
        if e.kind() == io::ErrorKind::NotFound {
            warn!(binary = %self.binary, "graphviz binary not found");
            EngineError::DependencyUnavailable {
                message: format!("graphviz '{}' executable was not found", self.binary),
                hint: INSTALL_HINT.to_string(),
            }
        } else {
            EngineError::internal(format!("failed to start graphviz '{}': {}", self.binary, e))
        }
    }
}
