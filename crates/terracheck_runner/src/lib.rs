//! # terracheck_runner
//!
//! Process execution wrapper for terracheck.
//!
//! This crate runs external binaries (Terraform in practice) and captures
//! their exit code and output, either directly on the host or wrapped in a
//! Docker/Podman container.
//!
//! # Features
//!
//! - **Host or Container**: run the binary locally or via `docker run`/`podman run`
//! - **Runtime Detection**: Auto-detect Docker vs Podman
//! - **Dry-Run Mode**: Log commands without execution
//! - **CI Integration**: Timestamped streamed output
//! - **Timeouts**: Kill commands that run too long
//! - **Mock Runner**: For testing without spawning processes
//!
//! # Example
//!
//! ```rust,no_run
//! use terracheck_runner::{CliRunner, CommandConfig, CommandRunner, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = CliRunner::local();
//!
//!     let command = CommandConfig::new("terraform")
//!         .args(["init", "-upgrade=false"])
//!         .working_dir("./infra");
//!
//!     let result = runner.run(&command, &RunConfig::default().stream()).await?;
//!     println!("Exit code: {}", result.exit_code);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod mock;
pub mod runner;

pub use cli::{CliRunner, CliRunnerOptions, ContainerRuntime, LogHandler, LogLine, LogStream};
pub use config::{CommandConfig, ContainerImage, MountConfig, RunConfig};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRunner};
pub use runner::{CommandRunner, ExecutionResult};
