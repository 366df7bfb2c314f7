//! Error types for Terraform operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for Terraform operations.
pub type TerraformResult<T> = Result<T, TerraformError>;

/// Errors that can occur while driving Terraform.
#[derive(Error, Debug)]
pub enum TerraformError {
    #[error("Invalid Terraform working directory {path}: {reason}")]
    InvalidWorkingDir { path: PathBuf, reason: String },

    #[error("Terraform not available: {0}")]
    TerraformNotAvailable(String),

    #[error("terraform {verb} failed with exit code {exit_code}: {summary}")]
    CommandFailed {
        verb: String,
        exit_code: i64,
        summary: String,
        output: String,
    },

    #[error("Expected no pending changes, but plan reported changes")]
    UnexpectedChanges,

    #[error("{0} resources remain in state after destroy")]
    ResourcesRemaining(usize),

    #[error("Invalid terraform output: {0}")]
    InvalidOutput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Scenario {scenario} failed: {reason}")]
    ScenarioFailed { scenario: String, reason: String },

    #[error("Runner error: {0}")]
    Runner(#[from] terracheck_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid retryable error pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl TerraformError {
    /// Build a `CommandFailed` from a verb and the command output. The
    /// summary is the first line mentioning `Error`, or the last line.
    pub fn command_failed(verb: impl Into<String>, exit_code: i64, output: String) -> Self {
        let summary = output
            .lines()
            .map(str::trim)
            .find(|l| l.contains("Error"))
            .or_else(|| output.lines().map(str::trim).rev().find(|l| !l.is_empty()))
            .unwrap_or("no output")
            .to_string();
        Self::CommandFailed {
            verb: verb.into(),
            exit_code,
            summary,
            output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_summary_prefers_error_line() {
        let output = "Initializing...\n\u{2577}\n\u{2502} Error: No valid credential sources found\n\u{2575}\n".to_string();
        let err = TerraformError::command_failed("apply", 1, output);
        assert_eq!(
            err.to_string(),
            "terraform apply failed with exit code 1: \u{2502} Error: No valid credential sources found"
        );
    }

    #[test]
    fn test_command_failed_summary_falls_back_to_last_line() {
        let err = TerraformError::command_failed("init", 1, "first\nlast\n\n".to_string());
        assert!(err.to_string().ends_with(": last"));

        let err = TerraformError::command_failed("init", 1, String::new());
        assert!(err.to_string().ends_with(": no output"));
    }
}
