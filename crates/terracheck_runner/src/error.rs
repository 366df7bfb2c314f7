//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur during runner operations.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Binary not available: {0}")]
    BinaryNotAvailable(String),

    #[error("Container runtime not available: {0}")]
    RuntimeNotAvailable(String),

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Command timeout after {0} seconds")]
    Timeout(u64),

    #[error("Invalid mount configuration: {0}")]
    InvalidMount(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
