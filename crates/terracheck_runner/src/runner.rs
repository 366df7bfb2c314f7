//! Command runner trait and types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{CommandConfig, RunConfig};
use crate::error::RunnerResult;

/// Result of a command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Unique id of this execution
    pub execution_id: String,
    /// Exit code from the process
    pub exit_code: i64,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Execution start time
    pub started_at: DateTime<Utc>,
    /// Execution end time
    pub finished_at: DateTime<Utc>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Execution id of results produced without running anything.
    pub const DRY_RUN_ID: &'static str = "dry-run";

    /// Whether the command was only rendered, not executed.
    pub fn is_dry_run(&self) -> bool {
        self.execution_id == Self::DRY_RUN_ID
    }

    /// Check if execution was successful (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Get combined output (stdout + stderr).
    pub fn combined_output(&self) -> String {
        if self.stdout.is_empty() {
            self.stderr.clone()
        } else if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Runs external programs.
///
/// Implementations decide how a [`CommandConfig`] is executed: directly on
/// the host, wrapped in a container, or not at all (mocks). A non-zero exit
/// code is reported in the [`ExecutionResult`], not as an error; errors are
/// reserved for failures to run the program at all.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Check if the given program can be executed.
    async fn is_available(&self, program: &str) -> RunnerResult<bool>;

    /// Get the first line of `<program> version`.
    async fn version(&self, program: &str) -> RunnerResult<String>;

    /// Run a command to completion.
    async fn run(&self, command: &CommandConfig, run_config: &RunConfig)
        -> RunnerResult<ExecutionResult>;
}
