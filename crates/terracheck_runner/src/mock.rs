//! Mock command runner for testing.
//!
//! Provides a configurable mock implementation of the CommandRunner trait
//! for use in unit tests without spawning processes.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::config::{CommandConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Predefined mock response for a command execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CapturedCall {
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

/// Mock command runner for testing.
///
/// Responses are scripted per subcommand (the first argument) and consumed
/// in order; once a subcommand's queue is empty the default response is
/// returned. Every call is captured for later assertions.
#[derive(Clone)]
pub struct MockRunner {
    available: Arc<RwLock<bool>>,
    version: Arc<RwLock<String>>,
    default_response: Arc<RwLock<MockResponse>>,
    scripted: Arc<RwLock<HashMap<String, VecDeque<MockResponse>>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    /// Simulated failure to run any program at all.
    simulate_failure: Arc<RwLock<Option<String>>>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a new mock runner whose commands all succeed.
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            version: Arc::new(RwLock::new("Terraform v1.6.6".to_string())),
            default_response: Arc::new(RwLock::new(MockResponse::success(""))),
            scripted: Arc::new(RwLock::new(HashMap::new())),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
        }
    }

    /// Set whether the program is reported as available.
    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    /// Set the version string.
    pub fn set_version(self, version: impl Into<String>) -> Self {
        *self.version.write() = version.into();
        self
    }

    /// Response returned when nothing is scripted for a subcommand.
    pub fn default_response(self, response: MockResponse) -> Self {
        *self.default_response.write() = response;
        self
    }

    /// Queue a response for the next call with the given subcommand.
    pub fn on(self, subcommand: impl Into<String>, response: MockResponse) -> Self {
        self.scripted
            .write()
            .entry(subcommand.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Set a failure to simulate for every call.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Subcommands in call order, e.g. `["init", "apply", "destroy"]`.
    pub fn subcommands(&self) -> Vec<String> {
        self.captured_calls
            .read()
            .iter()
            .filter_map(|c| c.subcommand().map(str::to_string))
            .collect()
    }

    /// Check if a specific subcommand was run.
    pub fn was_called(&self, subcommand: &str) -> bool {
        self.captured_calls
            .read()
            .iter()
            .any(|c| c.subcommand() == Some(subcommand))
    }

    /// Get calls for a specific subcommand.
    pub fn get_subcommand_calls(&self, subcommand: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.subcommand() == Some(subcommand))
            .cloned()
            .collect()
    }

    fn record_call(&self, command: &CommandConfig) {
        self.captured_calls.write().push(CapturedCall {
            program: command.program.clone(),
            args: command.args.clone(),
            working_dir: command.working_dir.clone(),
            env: command.env.clone(),
        });
    }

    fn next_response(&self, subcommand: Option<&str>) -> MockResponse {
        subcommand
            .and_then(|sub| self.scripted.write().get_mut(sub).and_then(VecDeque::pop_front))
            .unwrap_or_else(|| self.default_response.read().clone())
    }

    fn check_failure(&self) -> RunnerResult<()> {
        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn is_available(&self, _program: &str) -> RunnerResult<bool> {
        Ok(*self.available.read())
    }

    async fn version(&self, program: &str) -> RunnerResult<String> {
        self.record_call(&CommandConfig::new(program).arg("version"));
        self.check_failure()?;
        Ok(self.version.read().clone())
    }

    async fn run(
        &self,
        command: &CommandConfig,
        _run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        self.record_call(command);
        self.check_failure()?;

        let response = self.next_response(command.subcommand());
        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            execution_id: format!("mock-{}", uuid::Uuid::new_v4()),
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_runner_basic() {
        let runner = MockRunner::new().on("plan", MockResponse::success("No changes."));

        let command = CommandConfig::new("terraform").arg("plan");
        let result = runner.run(&command, &RunConfig::default()).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "No changes.");
    }

    #[tokio::test]
    async fn test_mock_runner_captures_calls() {
        let runner = MockRunner::new();

        let command = CommandConfig::new("terraform")
            .args(["apply", "-auto-approve"])
            .working_dir("/srv/infra")
            .env("TF_IN_AUTOMATION", "1");

        let _ = runner.run(&command, &RunConfig::default()).await;

        let calls = runner.get_subcommand_calls("apply");
        assert_eq!(calls.len(), 1);

        let call = &calls[0];
        assert_eq!(call.program, "terraform");
        assert_eq!(call.args, vec!["apply".to_string(), "-auto-approve".to_string()]);
        assert_eq!(call.working_dir, Some(PathBuf::from("/srv/infra")));
        assert_eq!(call.env.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
    }

    #[tokio::test]
    async fn test_mock_runner_failure_simulation() {
        let runner = MockRunner::new().simulate_failure("simulated error");

        let result = runner
            .run(&CommandConfig::new("terraform").arg("init"), &RunConfig::default())
            .await;
        assert!(result.is_err());
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_responses_are_consumed_in_order() {
        let runner = MockRunner::new()
            .on("apply", MockResponse::success("first"))
            .on("apply", MockResponse::failure(1, "second failed"));

        let apply = CommandConfig::new("terraform").arg("apply");

        let r1 = runner.run(&apply, &RunConfig::default()).await.unwrap();
        assert_eq!(r1.stdout, "first");

        let r2 = runner.run(&apply, &RunConfig::default()).await.unwrap();
        assert_eq!(r2.exit_code, 1);
        assert_eq!(r2.stderr, "second failed");

        // Queue exhausted: falls back to the default response.
        let r3 = runner.run(&apply, &RunConfig::default()).await.unwrap();
        assert!(r3.success());

        assert_eq!(runner.subcommands(), vec!["apply", "apply", "apply"]);
    }

    #[tokio::test]
    async fn test_mock_runner_availability() {
        let available_runner = MockRunner::new().set_available(true);
        assert!(available_runner.is_available("terraform").await.unwrap());

        let unavailable_runner = MockRunner::new().set_available(false);
        assert!(!unavailable_runner.is_available("terraform").await.unwrap());
    }
}
