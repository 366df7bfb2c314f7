//! Run command - Run scenarios from a suite file.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use terracheck_terraform::{ScenarioRunner, SuiteConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE};

use super::report;
use super::Context;

#[derive(Args)]
pub struct RunArgs {
    /// Suite file (TOML or YAML)
    #[arg(short, long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Scenario to run (repeatable; runs all if omitted)
    #[arg(short, long)]
    pub scenario: Vec<String>,
}

pub async fn execute(args: RunArgs, ctx: &Context) -> Result<()> {
    let suite = SuiteConfig::load(&args.config)
        .with_context(|| format!("Failed to load suite {}", args.config.display()))?;
    let mut scenarios = suite.select(&args.scenario)?;

    if scenarios.is_empty() {
        println!("⚠️  No scenarios found in {}", args.config.display());
        return Ok(());
    }

    if ctx.stream_output {
        for scenario in &mut scenarios {
            scenario.options.stream_output = true;
        }
    }

    info!("Running {} scenario(s) from {}", scenarios.len(), args.config.display());

    let runner = ScenarioRunner::new(ctx.runner()?);
    let results = runner.run_all(&scenarios).await;
    report::finish(results, ctx.json)
}
