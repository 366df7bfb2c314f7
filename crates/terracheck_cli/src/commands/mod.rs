//! CLI command definitions.
//!
//! Each subcommand maps to one way of driving terraform: a suite of
//! scenarios, a built-in scenario, or a single lifecycle verb.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};

use terracheck_runner::{CliRunner, CliRunnerOptions, CommandRunner, ContainerImage};
use terracheck_terraform::TerraformOptions;

pub mod builtin;
pub mod down;
pub mod list;
pub mod report;
pub mod run;
pub mod up;

/// terracheck - Terraform lifecycle checks for example configurations
#[derive(Parser)]
#[command(name = "terracheck")]
#[command(version, about = "terracheck - Terraform lifecycle checks for example configurations")]
#[command(long_about = r#"
terracheck runs terraform init, apply and destroy against example
configurations and reports which steps succeeded, failed, or failed in a
tolerated way. Destroy always runs after a scenario, even when it fails.

COMMANDS:
  run      → Run scenarios from a suite file (terracheck.toml)
  builtin  → Run a built-in example scenario
  up       → terraform init + apply in a directory
  down     → terraform destroy in a directory
  list     → List scenarios in a suite file

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Scenario failure
  5 - Terraform or container runtime unavailable
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log terraform commands without executing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Run terraform inside the hashicorp/terraform image
    #[arg(long, global = true)]
    pub container: bool,

    /// Tag of the terraform image used with --container
    #[arg(long, global = true, default_value = ContainerImage::TERRAFORM_TAG)]
    pub terraform_tag: String,

    /// Print reports as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run scenarios from a suite file
    Run(run::RunArgs),

    /// Run a built-in example scenario
    Builtin(builtin::BuiltinArgs),

    /// Init and apply a configuration directory
    Up(DirArgs),

    /// Destroy a configuration directory
    Down(DirArgs),

    /// List scenarios in a suite file
    List(list::ListArgs),
}

/// Settings shared by every command.
pub struct Context {
    pub runner_options: CliRunnerOptions,
    pub json: bool,
    pub stream_output: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        let mut runner_options = CliRunnerOptions::new();
        if cli.dry_run {
            runner_options = runner_options.dry_run();
        }
        if cli.container {
            runner_options = runner_options
                .in_container(ContainerImage::terraform().tag(&cli.terraform_tag));
        }

        Self {
            runner_options,
            json: cli.json,
            stream_output: cli.verbose && !cli.quiet && !cli.json,
        }
    }

    /// Build the runner for commands that execute terraform. Container
    /// runtime detection happens here, not in `from_cli`.
    pub fn runner(&self) -> Result<Arc<dyn CommandRunner>> {
        let runner = CliRunner::new(self.runner_options.clone())
            .context("Failed to set up the terraform runner")?;
        Ok(Arc::new(runner))
    }
}

/// Arguments for commands operating on one configuration directory.
#[derive(Args)]
pub struct DirArgs {
    /// Directory containing the Terraform configuration
    pub dir: PathBuf,

    /// Input variable as KEY=VALUE (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Variable file (repeatable)
    #[arg(long = "var-file")]
    pub var_files: Vec<PathBuf>,

    /// Terraform binary
    #[arg(long, env = "TERRAFORM_BINARY", default_value = "terraform")]
    pub terraform_binary: String,
}

impl DirArgs {
    pub fn to_options(&self, ctx: &Context) -> Result<TerraformOptions> {
        let dir = std::fs::canonicalize(&self.dir)
            .with_context(|| format!("Configuration directory not found: {}", self.dir.display()))?;
        let mut options = TerraformOptions::new(dir).binary(&self.terraform_binary);
        for var in &self.vars {
            let (key, value) = parse_var(var)?;
            options = options.var(key, value);
        }
        for file in &self.var_files {
            options = options.var_file(file);
        }
        if ctx.stream_output {
            options = options.stream_output();
        }
        Ok(options)
    }
}

/// Parse `KEY=VALUE`; values that parse as JSON keep their type.
pub fn parse_var(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid argument `{}`: expected KEY=VALUE", raw))?;
    if key.is_empty() {
        anyhow::bail!("Invalid argument `{}`: empty variable name", raw);
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("region=eu-west-1").unwrap(),
            ("region".to_string(), json!("eu-west-1"))
        );
        assert_eq!(parse_var("count=3").unwrap(), ("count".to_string(), json!(3)));
        assert_eq!(parse_var("tags={\"a\":\"b\"}").unwrap().1, json!({"a": "b"}));
        assert_eq!(parse_var("expr=a=b").unwrap().1, json!("a=b"));
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
    }

    #[test]
    fn test_context_defers_runtime_detection() {
        let cli = Cli::try_parse_from(["terracheck", "--container", "list"]).unwrap();
        let ctx = Context::from_cli(&cli);
        let image = ctx.runner_options.container.as_ref().unwrap();
        assert_eq!(image.full_image(), "hashicorp/terraform:1.6");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "terracheck",
            "--dry-run",
            "up",
            "examples/google-workspace",
            "--var",
            "domain=example.com",
        ])
        .unwrap();
        assert!(cli.dry_run);
        match cli.command {
            Commands::Up(args) => {
                assert_eq!(args.dir, PathBuf::from("examples/google-workspace"));
                assert_eq!(args.vars, vec!["domain=example.com".to_string()]);
            }
            _ => panic!("expected up"),
        }
    }
}
