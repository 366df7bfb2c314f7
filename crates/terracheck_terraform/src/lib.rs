//! # terracheck_terraform
//!
//! Terraform lifecycle checks for example configurations.
//!
//! This crate drives the `terraform` binary through `init`, `apply` and
//! `destroy` against a configuration directory and decides which errors are
//! fatal. Terraform itself is a black box; only exit codes and output are
//! inspected.
//!
//! ## Features
//!
//! - Lifecycle verbs (init, apply, destroy, plan, validate, output, state list)
//! - Deferred cleanup: destroy always runs after a scenario body
//! - Tolerate-and-log handling for repeated apply/destroy
//! - Retries for known transient errors
//! - Declarative scenarios loaded from TOML or YAML suite files
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use terracheck_runner::CliRunner;
//! use terracheck_terraform::{CleanupPolicy, Terraform, TerraformOptions};
//!
//! # async fn run() -> terracheck_terraform::TerraformResult<()> {
//! let options = TerraformOptions::new("examples/google-workspace");
//! let tf = Terraform::new(Arc::new(CliRunner::local()), options)?;
//!
//! tf.with_cleanup(CleanupPolicy::Strict, async { tf.init_and_apply().await })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod options;
pub mod scenario;
pub mod terraform;

pub use config::{SuiteConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE};
pub use error::{TerraformError, TerraformResult};
pub use lifecycle::{tolerate, CleanupPolicy, StepOutcome};
pub use options::{TerraformOptions, DEFAULT_RETRYABLE_ERRORS};
pub use scenario::{
    Action, ErrorMode, Scenario, ScenarioReport, ScenarioRunner, Step, StepReport,
    AWS_POLICIES_DIR, GOOGLE_WORKSPACE_DIR,
};
pub use terraform::{PlanStatus, Terraform};
