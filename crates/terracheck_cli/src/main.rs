//! terracheck CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments or configuration
//! - 3: Scenario failure
//! - 5: Terraform or container runtime unavailable

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use terracheck_runner::RunnerError;
use terracheck_terraform::TerraformError;

mod commands;

use commands::{Cli, Commands, Context};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const SCENARIO_FAILURE: u8 = 3;
    pub const TERRAFORM_UNAVAILABLE: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "terracheck=debug"
    } else if cli.quiet {
        "terracheck=warn"
    } else {
        "terracheck=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},warn", default_level)));

    // Ignore the error when a subscriber is already installed.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    let result = run(cli).await;

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::from_cli(&cli);

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &ctx).await,
        Commands::Builtin(args) => commands::builtin::execute(args, &ctx).await,
        Commands::Up(args) => commands::up::execute(args, &ctx).await,
        Commands::Down(args) => commands::down::execute(args, &ctx).await,
        Commands::List(args) => commands::list::execute(args, &ctx).await,
    }
}

/// Map an error to an exit code by the first typed error in its chain.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<TerraformError>() {
            return match err {
                TerraformError::ScenarioFailed { .. }
                | TerraformError::CommandFailed { .. }
                | TerraformError::UnexpectedChanges
                | TerraformError::ResourcesRemaining(_) => ExitCodes::SCENARIO_FAILURE,
                TerraformError::TerraformNotAvailable(_) => ExitCodes::TERRAFORM_UNAVAILABLE,
                TerraformError::Runner(runner) => categorize_runner_error(runner),
                TerraformError::InvalidWorkingDir { .. }
                | TerraformError::Config(_)
                | TerraformError::ScenarioNotFound(_)
                | TerraformError::Toml(_)
                | TerraformError::Yaml(_)
                | TerraformError::Regex(_) => ExitCodes::INVALID_ARGS,
                _ => ExitCodes::GENERAL_ERROR,
            };
        }
        if let Some(err) = cause.downcast_ref::<RunnerError>() {
            return categorize_runner_error(err);
        }
    }
    ExitCodes::GENERAL_ERROR
}

fn categorize_runner_error(err: &RunnerError) -> u8 {
    match err {
        RunnerError::BinaryNotAvailable(_) | RunnerError::RuntimeNotAvailable(_) => {
            ExitCodes::TERRAFORM_UNAVAILABLE
        }
        RunnerError::InvalidMount(_) => ExitCodes::INVALID_ARGS,
        _ => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context as _;

    #[test]
    fn test_categorize_error() {
        let failed: anyhow::Error = TerraformError::ScenarioFailed {
            scenario: "google-workspace".to_string(),
            reason: "apply".to_string(),
        }
        .into();
        assert_eq!(categorize_error(&failed), ExitCodes::SCENARIO_FAILURE);

        let missing: anyhow::Error =
            TerraformError::Runner(RunnerError::BinaryNotAvailable("terraform".into())).into();
        assert_eq!(categorize_error(&missing), ExitCodes::TERRAFORM_UNAVAILABLE);

        let config = Err::<(), _>(TerraformError::Config("bad".into()))
            .context("Failed to load suite terracheck.toml")
            .unwrap_err();
        assert_eq!(categorize_error(&config), ExitCodes::INVALID_ARGS);

        let other = anyhow::anyhow!("something else");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }
}
