//! Declarative lifecycle scenarios and their execution.
//!
//! A scenario is a configuration directory, an ordered list of steps and a
//! cleanup policy. Steps run in order; a fail-fast step that errors skips
//! the rest, a tolerant step that errors is recorded and the run continues.
//! Cleanup runs afterwards regardless. Verify steps run only after a cleanup
//! destroy that succeeded, to check what the destroy left behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use terracheck_runner::CommandRunner;

use crate::error::{TerraformError, TerraformResult};
use crate::lifecycle::{strict, tolerate, CleanupPolicy, StepOutcome};
use crate::options::TerraformOptions;
use crate::terraform::{PlanStatus, Terraform};

/// Relative location of the Google Workspace example configuration.
pub const GOOGLE_WORKSPACE_DIR: &str = "examples/google-workspace";

/// Relative location of the IAM users/groups policy example configuration.
pub const AWS_POLICIES_DIR: &str =
    "examples/create-users-and-groups/aws-and-customer-managed-policies";

/// A lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Init,
    Apply,
    InitAndApply,
    Destroy,
    Plan,
    Validate,
    /// `plan -detailed-exitcode` must report no pending changes.
    ExpectNoChanges,
    /// `state list` must be empty.
    ExpectEmptyState,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Apply => "apply",
            Self::InitAndApply => "init_and_apply",
            Self::Destroy => "destroy",
            Self::Plan => "plan",
            Self::Validate => "validate",
            Self::ExpectNoChanges => "expect_no_changes",
            Self::ExpectEmptyState => "expect_empty_state",
        };
        write!(f, "{}", name)
    }
}

/// How a step's error affects the scenario.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    #[default]
    FailFast,
    Tolerate,
}

/// One step of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub action: Action,
    #[serde(default)]
    pub on_error: ErrorMode,
}

impl Step {
    pub fn fail_fast(action: Action) -> Self {
        Self {
            action,
            on_error: ErrorMode::FailFast,
        }
    }

    pub fn tolerate(action: Action) -> Self {
        Self {
            action,
            on_error: ErrorMode::Tolerate,
        }
    }
}

/// A named lifecycle scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(flatten)]
    pub options: TerraformOptions,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub cleanup: CleanupPolicy,
    /// Steps run after a successful cleanup destroy.
    #[serde(default)]
    pub verify: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, options: TerraformOptions) -> Self {
        Self {
            name: name.into(),
            description: None,
            options,
            steps: Vec::new(),
            cleanup: CleanupPolicy::default(),
            verify: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn cleanup(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup = policy;
        self
    }

    pub fn verify(mut self, step: Step) -> Self {
        self.verify.push(step);
        self
    }

    /// Init and apply the Google Workspace example, failing on any error or
    /// on pending changes after apply, then destroy it and check that the
    /// state is empty.
    pub fn google_workspace(root: &Path) -> Self {
        Self::new(
            "google-workspace",
            TerraformOptions::new(root.join(GOOGLE_WORKSPACE_DIR)),
        )
        .description("Init and apply the Google Workspace example, then destroy it")
        .step(Step::fail_fast(Action::InitAndApply))
        .step(Step::fail_fast(Action::ExpectNoChanges))
        .cleanup(CleanupPolicy::Strict)
        .verify(Step::fail_fast(Action::ExpectEmptyState))
    }

    /// Init and apply the IAM policy example, then re-apply and destroy
    /// while tolerating errors from both, then destroy again tolerantly.
    pub fn aws_and_customer_managed_policies(root: &Path) -> Self {
        Self::new(
            "aws-and-customer-managed-policies",
            TerraformOptions::new(root.join(AWS_POLICIES_DIR)),
        )
        .description("Apply IAM users, groups and policies; repeated apply/destroy may error")
        .step(Step::fail_fast(Action::InitAndApply))
        .step(Step::tolerate(Action::Apply))
        .step(Step::tolerate(Action::Destroy))
        .cleanup(CleanupPolicy::Tolerant)
    }

    /// All built-in scenarios rooted at `root`.
    pub fn builtin(root: &Path) -> Vec<Self> {
        vec![
            Self::google_workspace(root),
            Self::aws_and_customer_managed_policies(root),
        ]
    }
}

/// Result of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub action: Action,
    pub on_error: ErrorMode,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

impl StepReport {
    fn skipped(step: &Step) -> Self {
        Self {
            action: step.action,
            on_error: step.on_error,
            outcome: StepOutcome::Skipped,
            duration_ms: 0,
        }
    }
}

/// Result of a scenario run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub terraform_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    pub cleanup: StepOutcome,
    #[serde(default)]
    pub verify: Vec<StepReport>,
    pub passed: bool,
}

impl ScenarioReport {
    /// Number of steps whose error was tolerated.
    pub fn tolerated_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Tolerated { .. }))
            .count()
    }

    /// First failure, from the steps, cleanup, then verification.
    pub fn first_failure(&self) -> Option<String> {
        let failed_step = |s: &StepReport| match &s.outcome {
            StepOutcome::Failed { error } => Some(format!("{}: {}", s.action, error)),
            _ => None,
        };
        self.steps
            .iter()
            .find_map(failed_step)
            .or_else(|| match &self.cleanup {
                StepOutcome::Failed { error } => Some(format!("cleanup destroy: {}", error)),
                _ => None,
            })
            .or_else(|| self.verify.iter().find_map(failed_step))
    }

    /// Turn a failed report into an error.
    pub fn ensure_passed(&self) -> TerraformResult<()> {
        if self.passed {
            return Ok(());
        }
        Err(TerraformError::ScenarioFailed {
            scenario: self.scenario.clone(),
            reason: self
                .first_failure()
                .unwrap_or_else(|| "unknown failure".to_string()),
        })
    }
}

/// Executes scenarios against a command runner.
pub struct ScenarioRunner {
    runner: Arc<dyn CommandRunner>,
}

impl ScenarioRunner {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Run one scenario. Errors are returned only when the scenario cannot
    /// start (invalid directory or options); step failures land in the report.
    pub async fn run(&self, scenario: &Scenario) -> TerraformResult<ScenarioReport> {
        scenario.options.check_working_dir()?;
        let tf = Terraform::new(self.runner.clone(), scenario.options.clone())?;

        info!(
            "Running scenario {} ({} steps) in {:?}",
            scenario.name,
            scenario.steps.len(),
            scenario.options.terraform_dir
        );

        let started_at = Utc::now();
        let steps = run_steps(&tf, &scenario.steps).await;

        let cleanup = match tf.deferred_destroy(scenario.cleanup).await {
            Ok(outcome) => outcome,
            Err(e) => StepOutcome::Failed {
                error: e.to_string(),
            },
        };

        // Verify steps need a completed destroy.
        let verify = if cleanup == StepOutcome::Succeeded {
            run_steps(&tf, &scenario.verify).await
        } else {
            scenario.verify.iter().map(StepReport::skipped).collect()
        };

        let passed = steps
            .iter()
            .chain(&verify)
            .all(|s| s.outcome.is_ok())
            && cleanup.is_ok();
        let report = ScenarioReport {
            scenario: scenario.name.clone(),
            terraform_dir: scenario.options.terraform_dir.clone(),
            started_at,
            finished_at: Utc::now(),
            steps,
            cleanup,
            verify,
            passed,
        };

        if report.passed {
            info!(
                "Scenario {} passed ({} tolerated errors)",
                report.scenario,
                report.tolerated_count()
            );
        } else {
            warn!(
                "Scenario {} failed: {}",
                report.scenario,
                report.first_failure().unwrap_or_default()
            );
        }

        Ok(report)
    }

    /// Run scenarios one after another. A scenario that cannot start is
    /// returned as an error for that entry only.
    pub async fn run_all(
        &self,
        scenarios: &[Scenario],
    ) -> Vec<(String, TerraformResult<ScenarioReport>)> {
        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            results.push((scenario.name.clone(), self.run(scenario).await));
        }
        results
    }
}

/// Run steps in order. After a fail-fast error the remaining steps are skipped.
async fn run_steps(tf: &Terraform, steps: &[Step]) -> Vec<StepReport> {
    let mut reports = Vec::with_capacity(steps.len());
    let mut aborted = false;

    for step in steps {
        if aborted {
            reports.push(StepReport::skipped(step));
            continue;
        }

        let start = Instant::now();
        let result = run_action(tf, step.action).await;
        let outcome = match step.on_error {
            ErrorMode::Tolerate => tolerate(&step.action.to_string(), result),
            ErrorMode::FailFast => {
                let (outcome, err) = strict(&step.action.to_string(), result);
                aborted = err.is_some();
                outcome
            }
        };

        reports.push(StepReport {
            action: step.action,
            on_error: step.on_error,
            outcome,
            duration_ms: start.elapsed().as_millis() as u64,
        });
    }
    reports
}

async fn run_action(tf: &Terraform, action: Action) -> TerraformResult<()> {
    match action {
        Action::Init => tf.init().await.map(drop),
        Action::Apply => tf.apply().await.map(drop),
        Action::InitAndApply => tf.init_and_apply().await.map(drop),
        Action::Destroy => tf.destroy().await.map(drop),
        Action::Plan => tf.plan().await.map(drop),
        Action::Validate => tf.validate().await.map(drop),
        Action::ExpectNoChanges => match tf.plan_status().await? {
            PlanStatus::NoChanges => Ok(()),
            PlanStatus::Changes => Err(TerraformError::UnexpectedChanges),
        },
        Action::ExpectEmptyState => {
            let resources = tf.state_list().await?;
            if resources.is_empty() {
                Ok(())
            } else {
                Err(TerraformError::ResourcesRemaining(resources.len()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_google_workspace() {
        let scenario = Scenario::google_workspace(Path::new("/repo"));
        assert_eq!(
            scenario.options.terraform_dir,
            PathBuf::from("/repo/examples/google-workspace")
        );
        assert_eq!(
            scenario.steps,
            vec![
                Step::fail_fast(Action::InitAndApply),
                Step::fail_fast(Action::ExpectNoChanges),
            ]
        );
        assert_eq!(scenario.cleanup, CleanupPolicy::Strict);
        assert_eq!(scenario.verify, vec![Step::fail_fast(Action::ExpectEmptyState)]);
    }

    #[test]
    fn test_builtin_aws_policies() {
        let scenario = Scenario::aws_and_customer_managed_policies(Path::new("/repo"));
        assert!(scenario
            .options
            .terraform_dir
            .ends_with("create-users-and-groups/aws-and-customer-managed-policies"));
        assert_eq!(
            scenario.steps,
            vec![
                Step::fail_fast(Action::InitAndApply),
                Step::tolerate(Action::Apply),
                Step::tolerate(Action::Destroy),
            ]
        );
        assert_eq!(scenario.cleanup, CleanupPolicy::Tolerant);
        assert!(scenario.verify.is_empty());
    }

    #[test]
    fn test_step_deserialize_default_mode() {
        let step: Step = serde_json::from_str(r#"{"action": "expect_no_changes"}"#).unwrap();
        assert_eq!(step, Step::fail_fast(Action::ExpectNoChanges));
    }

    #[test]
    fn test_report_ensure_passed() {
        let report = ScenarioReport {
            scenario: "demo".to_string(),
            terraform_dir: PathBuf::from("demo"),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            steps: vec![StepReport {
                action: Action::Apply,
                on_error: ErrorMode::FailFast,
                outcome: StepOutcome::Failed {
                    error: "boom".to_string(),
                },
                duration_ms: 1,
            }],
            cleanup: StepOutcome::Succeeded,
            verify: Vec::new(),
            passed: false,
        };

        let err = report.ensure_passed().unwrap_err();
        assert_eq!(err.to_string(), "Scenario demo failed: apply: boom");
    }
}
