//! Terraform client: the lifecycle verbs run against one configuration directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use terracheck_runner::{CommandConfig, CommandRunner, ExecutionResult, RunConfig};

use crate::args;
use crate::error::{TerraformError, TerraformResult};
use crate::options::TerraformOptions;

/// Outcome of `terraform plan -detailed-exitcode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    NoChanges,
    Changes,
}

impl PlanStatus {
    /// Map a detailed exit code. 1 and anything else unknown are errors.
    pub fn from_exit_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::NoChanges),
            2 => Some(Self::Changes),
            _ => None,
        }
    }
}

/// Drives the terraform binary for a single configuration directory.
pub struct Terraform {
    runner: Arc<dyn CommandRunner>,
    options: TerraformOptions,
    retryable: Vec<(Regex, String)>,
}

impl Terraform {
    /// Create a client. Fails if a retryable error pattern is not a valid regex.
    pub fn new(runner: Arc<dyn CommandRunner>, options: TerraformOptions) -> TerraformResult<Self> {
        let retryable = options
            .retryable_errors
            .iter()
            .map(|(pattern, description)| -> TerraformResult<(Regex, String)> {
                Ok((Regex::new(pattern)?, description.clone()))
            })
            .collect::<TerraformResult<Vec<_>>>()?;

        Ok(Self {
            runner,
            options,
            retryable,
        })
    }

    pub fn options(&self) -> &TerraformOptions {
        &self.options
    }

    /// First line of `terraform version`.
    pub async fn version(&self) -> TerraformResult<String> {
        if !self.runner.is_available(&self.options.terraform_binary).await? {
            return Err(TerraformError::TerraformNotAvailable(
                self.options.terraform_binary.clone(),
            ));
        }
        Ok(self.runner.version(&self.options.terraform_binary).await?)
    }

    /// Run `terraform init`.
    pub async fn init(&self) -> TerraformResult<String> {
        info!("Running terraform init in {:?}", self.options.terraform_dir);
        self.run_checked("init", args::init_args(&self.options)).await
    }

    /// Run `terraform apply` with auto-approve.
    pub async fn apply(&self) -> TerraformResult<String> {
        info!("Running terraform apply in {:?}", self.options.terraform_dir);
        self.run_checked("apply", args::apply_args(&self.options)).await
    }

    /// Run `terraform init` then `terraform apply`, stopping at the first error.
    pub async fn init_and_apply(&self) -> TerraformResult<String> {
        let mut output = self.init().await?;
        output.push_str(&self.apply().await?);
        Ok(output)
    }

    /// Run `terraform destroy` with auto-approve.
    pub async fn destroy(&self) -> TerraformResult<String> {
        info!("Running terraform destroy in {:?}", self.options.terraform_dir);
        self.run_checked("destroy", args::destroy_args(&self.options)).await
    }

    /// Run `terraform plan`.
    pub async fn plan(&self) -> TerraformResult<String> {
        info!("Running terraform plan in {:?}", self.options.terraform_dir);
        self.run_checked("plan", args::plan_args(&self.options, false)).await
    }

    /// Run `terraform plan -detailed-exitcode` and report whether changes are pending.
    pub async fn plan_status(&self) -> TerraformResult<PlanStatus> {
        info!(
            "Running terraform plan -detailed-exitcode in {:?}",
            self.options.terraform_dir
        );
        let result = self
            .run("plan", args::plan_args(&self.options, true), &[0, 2])
            .await?;
        PlanStatus::from_exit_code(result.exit_code).ok_or_else(|| {
            TerraformError::command_failed("plan", result.exit_code, result.combined_output())
        })
    }

    /// Run `terraform init` then `terraform plan -detailed-exitcode`.
    pub async fn init_and_plan_status(&self) -> TerraformResult<PlanStatus> {
        self.init().await?;
        self.plan_status().await
    }

    /// Run `terraform validate`.
    pub async fn validate(&self) -> TerraformResult<String> {
        info!("Running terraform validate in {:?}", self.options.terraform_dir);
        self.run_checked("validate", args::validate_args(&self.options)).await
    }

    /// Value of a single output.
    ///
    /// A dry run yields `null`.
    pub async fn output(&self, name: &str) -> TerraformResult<serde_json::Value> {
        let result = self.run_successful("output", args::output_args(Some(name))).await?;
        if result.is_dry_run() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(result.stdout.trim())?)
    }

    /// Values of all outputs, keyed by name.
    pub async fn output_all(&self) -> TerraformResult<BTreeMap<String, serde_json::Value>> {
        let result = self.run_successful("output", args::output_args(None)).await?;
        if result.is_dry_run() {
            return Ok(BTreeMap::new());
        }
        parse_output_all(&result.stdout)
    }

    /// Resource addresses currently tracked in state. Empty on a dry run.
    pub async fn state_list(&self) -> TerraformResult<Vec<String>> {
        let result = self.run("state", args::state_list_args(), &[0]).await?;
        if result.is_dry_run() {
            return Ok(Vec::new());
        }
        let output = result.combined_output();
        if output.contains("No state file was found") {
            return Ok(Vec::new());
        }
        if !result.success() {
            return Err(TerraformError::command_failed(
                "state list",
                result.exit_code,
                output,
            ));
        }
        Ok(result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Run a verb and turn a non-zero exit code into `CommandFailed`.
    /// Returns stdout on success.
    async fn run_checked(&self, verb: &str, args: Vec<String>) -> TerraformResult<String> {
        self.run_successful(verb, args).await.map(|result| result.stdout)
    }

    async fn run_successful(
        &self,
        verb: &str,
        args: Vec<String>,
    ) -> TerraformResult<ExecutionResult> {
        let result = self.run(verb, args, &[0]).await?;
        if result.success() {
            Ok(result)
        } else {
            Err(TerraformError::command_failed(
                verb,
                result.exit_code,
                result.combined_output(),
            ))
        }
    }

    /// Run a terraform command, retrying failures whose output matches a
    /// retryable error. Exit codes in `ok_codes` are never retried.
    async fn run(
        &self,
        verb: &str,
        args: Vec<String>,
        ok_codes: &[i64],
    ) -> TerraformResult<ExecutionResult> {
        self.options.check_working_dir()?;

        let command = CommandConfig::new(&self.options.terraform_binary)
            .args(args)
            .working_dir(&self.options.terraform_dir)
            .env("TF_IN_AUTOMATION", "1")
            .envs(&self.options.env_vars);
        let run_config = RunConfig::default()
            .timeout(self.options.timeout_secs)
            .stream_logs(self.options.stream_output);

        let mut attempt = 0;
        loop {
            debug!("Executing {} (attempt {})", command.display(), attempt + 1);
            let result = self.runner.run(&command, &run_config).await?;

            if ok_codes.contains(&result.exit_code) {
                return Ok(result);
            }

            let output = result.combined_output();
            match self.retryable_match(&output) {
                Some(description) if attempt < self.options.max_retries => {
                    attempt += 1;
                    warn!(
                        "terraform {} failed with a retryable error ({}); retry {}/{} in {}s",
                        verb,
                        description,
                        attempt,
                        self.options.max_retries,
                        self.options.time_between_retries_secs
                    );
                    tokio::time::sleep(self.options.retry_pause()).await;
                }
                _ => return Ok(result),
            }
        }
    }

    fn retryable_match(&self, output: &str) -> Option<&str> {
        self.retryable
            .iter()
            .find(|(re, _)| re.is_match(output))
            .map(|(_, description)| description.as_str())
    }
}

/// Parse `terraform output -json`, which wraps each value as
/// `{"sensitive": .., "type": .., "value": ..}`.
pub fn parse_output_all(stdout: &str) -> TerraformResult<BTreeMap<String, serde_json::Value>> {
    #[derive(Deserialize)]
    struct OutputEntry {
        value: serde_json::Value,
    }

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(BTreeMap::new());
    }
    let entries: BTreeMap<String, OutputEntry> = serde_json::from_str(trimmed)
        .map_err(|e| TerraformError::InvalidOutput(e.to_string()))?;
    Ok(entries.into_iter().map(|(k, v)| (k, v.value)).collect())
}
