//! Deferred cleanup and tolerate-and-log error handling around lifecycle verbs.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{TerraformError, TerraformResult};
use crate::terraform::Terraform;

/// What to do with the destroy that always runs after a scenario body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Destroy errors fail the run when the body itself succeeded.
    #[default]
    Strict,
    /// Destroy errors are logged and discarded.
    Tolerant,
    /// No destroy at all.
    None,
}

/// Result of one lifecycle step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    /// Failed, but the step allowed failure.
    Tolerated { error: String },
    Failed { error: String },
    /// Not run because an earlier step failed.
    Skipped,
}

impl StepOutcome {
    /// Whether this outcome lets the scenario pass.
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Observe a result and discard its error after logging it.
///
/// Used for calls such as re-applying an applied configuration or destroying
/// a destroyed one, where terraform may legitimately report an error.
pub fn tolerate<T>(label: &str, result: TerraformResult<T>) -> StepOutcome {
    match result {
        Ok(_) => StepOutcome::Succeeded,
        Err(e) => {
            warn!("{} returned an expected potential error, continuing: {}", label, e);
            StepOutcome::Tolerated {
                error: e.to_string(),
            }
        }
    }
}

impl Terraform {
    /// Run `body`, then always run `terraform destroy`.
    ///
    /// Destroy runs even when `body` fails or panics; a panic is resumed
    /// once cleanup is done. An error from `body` takes precedence over a
    /// destroy error.
    pub async fn with_cleanup<T, Fut>(&self, policy: CleanupPolicy, body: Fut) -> TerraformResult<T>
    where
        Fut: Future<Output = TerraformResult<T>>,
    {
        let body_result = AssertUnwindSafe(body).catch_unwind().await;
        let cleanup = self.deferred_destroy(policy).await;

        match body_result {
            Err(panic) => {
                if let Err(e) = cleanup {
                    error!("Cleanup destroy failed after panic: {}", e);
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(e)) => {
                if let Err(cleanup_err) = cleanup {
                    error!("Cleanup destroy also failed: {}", cleanup_err);
                }
                Err(e)
            }
            Ok(Ok(value)) => cleanup.map(|_| value),
        }
    }

    /// Run the destroy that follows a scenario, honoring `policy`.
    pub async fn deferred_destroy(&self, policy: CleanupPolicy) -> TerraformResult<StepOutcome> {
        match policy {
            CleanupPolicy::None => {
                info!("Cleanup disabled for {:?}", self.options().terraform_dir);
                Ok(StepOutcome::Skipped)
            }
            CleanupPolicy::Tolerant => Ok(tolerate("cleanup destroy", self.destroy().await)),
            CleanupPolicy::Strict => match self.destroy().await {
                Ok(_) => Ok(StepOutcome::Succeeded),
                Err(e) => {
                    error!("Cleanup destroy failed: {}", e);
                    Err(e)
                }
            },
        }
    }
}

/// Convert a strict step result into an outcome, keeping the error for
/// fail-fast propagation.
pub(crate) fn strict<T>(
    label: &str,
    result: TerraformResult<T>,
) -> (StepOutcome, Option<TerraformError>) {
    match result {
        Ok(_) => (StepOutcome::Succeeded, None),
        Err(e) => {
            error!("{} failed: {}", label, e);
            (
                StepOutcome::Failed {
                    error: e.to_string(),
                },
                Some(e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use terracheck_runner::{MockResponse, MockRunner};

    use crate::options::TerraformOptions;

    fn setup(runner: &MockRunner) -> (TempDir, Terraform) {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.tf"), "").unwrap();
        let tf =
            Terraform::new(Arc::new(runner.clone()), TerraformOptions::new(dir.path())).unwrap();
        (dir, tf)
    }

    #[test]
    fn test_tolerate() {
        assert_eq!(tolerate("apply", Ok::<_, TerraformError>(())), StepOutcome::Succeeded);

        let outcome = tolerate::<()>("apply", Err(TerraformError::UnexpectedChanges));
        assert!(outcome.is_ok());
        assert!(matches!(outcome, StepOutcome::Tolerated { .. }));
    }

    #[tokio::test]
    async fn test_destroy_runs_after_success() {
        let runner = MockRunner::new();
        let (_dir, tf) = setup(&runner);

        tf.with_cleanup(CleanupPolicy::Strict, async { tf.init_and_apply().await })
            .await
            .unwrap();

        assert_eq!(runner.subcommands(), vec!["init", "apply", "destroy"]);
    }

    #[tokio::test]
    async fn test_destroy_runs_after_failure() {
        let runner = MockRunner::new().on("apply", MockResponse::failure(1, "Error: quota"));
        let (_dir, tf) = setup(&runner);

        let err = tf
            .with_cleanup(CleanupPolicy::Strict, async { tf.init_and_apply().await })
            .await
            .unwrap_err();

        assert!(matches!(err, TerraformError::CommandFailed { ref verb, .. } if verb == "apply"));
        assert_eq!(runner.subcommands(), vec!["init", "apply", "destroy"]);
    }

    #[tokio::test]
    async fn test_body_error_wins_over_cleanup_error() {
        let runner = MockRunner::new()
            .on("apply", MockResponse::failure(1, "Error: apply"))
            .on("destroy", MockResponse::failure(1, "Error: destroy"));
        let (_dir, tf) = setup(&runner);

        let err = tf
            .with_cleanup(CleanupPolicy::Strict, async { tf.apply().await })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Error: apply"));
    }

    #[tokio::test]
    async fn test_strict_cleanup_error_propagates() {
        let runner = MockRunner::new()
            .on("destroy", MockResponse::failure(1, "Error: DependencyViolation"));
        let (_dir, tf) = setup(&runner);

        let result = tf
            .with_cleanup(CleanupPolicy::Strict, async { tf.apply().await })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tolerant_cleanup_error_is_discarded() {
        let runner =
            MockRunner::new().on("destroy", MockResponse::failure(1, "Error: already gone"));
        let (_dir, tf) = setup(&runner);

        let result = tf
            .with_cleanup(CleanupPolicy::Tolerant, async { tf.apply().await })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_no_cleanup() {
        let runner = MockRunner::new();
        let (_dir, tf) = setup(&runner);

        tf.with_cleanup(CleanupPolicy::None, async { tf.apply().await })
            .await
            .unwrap();
        assert!(!runner.was_called("destroy"));
    }

    #[tokio::test]
    async fn test_destroy_runs_after_panic() {
        let runner = MockRunner::new();
        let (_dir, tf) = setup(&runner);

        let outcome = AssertUnwindSafe(tf.with_cleanup(CleanupPolicy::Strict, async {
            tf.init().await?;
            if runner.was_called("init") {
                panic!("assertion inside scenario body");
            }
            Ok(())
        }))
        .catch_unwind()
        .await;

        assert!(outcome.is_err());
        assert_eq!(runner.subcommands(), vec!["init", "destroy"]);
    }
}
