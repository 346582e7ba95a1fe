//! Runner trait and subprocess implementation for executing test files.

use std::path::{Path, PathBuf};

pub mod registry;
pub mod script;

pub use registry::RunnerRegistry;
pub use script::ScriptRunner;

/// Runner trait for executing one test file.
///
/// A runner owns the whole lifecycle of whatever it launches: nothing it
/// starts may outlive a call to [`run`](Runner::run).
pub trait Runner: Send + Sync {
    /// Execute the test file and capture its output.
    fn run(&self, path: &Path) -> Result<RunOutput, RunnerError>;

    /// Check if the runner can be used on this system.
    fn is_available(&self) -> bool;

    /// Get a human-readable name for this runner.
    fn name(&self) -> &str;
}

/// Captured stdout and stderr from a runner execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    /// Create a run output from already decoded streams.
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Why a runner could not produce comparable output.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The test file could not be opened to read its header.
    #[error("could not open file {}", .path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The interpreter process could not be started.
    #[error("failed to execute {}: {source}", .interpreter.display())]
    Spawn {
        interpreter: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded its time budget and was killed.
    #[error("Script timed out.")]
    Timeout { output: RunOutput },

    /// The process started but could not be waited on or drained.
    #[error("{message}")]
    Process { message: String, output: RunOutput },
}

impl RunnerError {
    /// Output produced before the failure, if the process ever ran.
    pub fn output(&self) -> Option<&RunOutput> {
        match self {
            RunnerError::Timeout { output } | RunnerError::Process { output, .. } => Some(output),
            RunnerError::Launch { .. } | RunnerError::Spawn { .. } => None,
        }
    }

    /// Whether the error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunnerError::Timeout { .. })
    }
}
