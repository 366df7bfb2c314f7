//! List command - Show the scenarios in a suite file.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;

use terracheck_terraform::{SuiteConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_FILE};

use super::Context;

#[derive(Args)]
pub struct ListArgs {
    /// Suite file (TOML or YAML)
    #[arg(short, long, env = CONFIG_ENV_VAR, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

pub async fn execute(args: ListArgs, ctx: &Context) -> Result<()> {
    let suite = SuiteConfig::load(&args.config)
        .with_context(|| format!("Failed to load suite {}", args.config.display()))?;

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&suite.scenarios)?);
        return Ok(());
    }

    for scenario in &suite.scenarios {
        let steps: Vec<String> = scenario
            .steps
            .iter()
            .map(|s| s.action.to_string())
            .collect();
        println!("{}", scenario.name);
        if let Some(description) = &scenario.description {
            println!("  {}", description);
        }
        println!("  dir:     {}", scenario.options.terraform_dir.display());
        println!("  steps:   {}", steps.join(" → "));
        println!("  cleanup: {:?}", scenario.cleanup);
        if !scenario.verify.is_empty() {
            let verify: Vec<String> =
                scenario.verify.iter().map(|s| s.action.to_string()).collect();
            println!("  verify:  {}", verify.join(" → "));
        }
    }
    Ok(())
}
