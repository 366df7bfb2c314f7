//! End-to-end lifecycle tests against the example configurations.
//!
//! These create real cloud resources, so they need a `terraform` binary,
//! provider credentials and the example directories at the repository root.
//! Run them with `cargo test -- --ignored`.

use std::path::PathBuf;
use std::sync::Arc;

use terracheck_runner::CliRunner;
use terracheck_terraform::{
    tolerate, CleanupPolicy, PlanStatus, Terraform, TerraformOptions, AWS_POLICIES_DIR,
    GOOGLE_WORKSPACE_DIR,
};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn terraform(dir: &str) -> Terraform {
    let options = TerraformOptions::new(repo_root().join(dir))
        .no_color()
        .stream_output()
        .with_default_retryable_errors();
    Terraform::new(Arc::new(CliRunner::local()), options).unwrap()
}

#[tokio::test]
#[ignore = "provisions real Google Workspace resources"]
async fn test_google_workspace() {
    let tf = terraform(GOOGLE_WORKSPACE_DIR);

    tf.with_cleanup(CleanupPolicy::Strict, async {
        tf.init_and_apply().await?;
        assert_eq!(tf.plan_status().await?, PlanStatus::NoChanges);
        Ok(())
    })
    .await
    .unwrap();

    assert!(tf.state_list().await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "provisions real AWS IAM resources"]
async fn test_aws_and_customer_managed_policies() {
    let tf = terraform(AWS_POLICIES_DIR);

    tf.with_cleanup(CleanupPolicy::Tolerant, async {
        tf.init_and_apply().await?;

        // Re-applying an applied configuration, or destroying a destroyed
        // one, may legitimately error.
        let _ = tolerate("repeat apply", tf.apply().await);
        let _ = tolerate("repeat destroy", tf.destroy().await);
        Ok(())
    })
    .await
    .unwrap();
}
