//! Builtin command - Run the example scenarios shipped with terracheck.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};

use terracheck_terraform::{Scenario, ScenarioRunner};

use super::report;
use super::Context;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BuiltinScenario {
    /// Init and apply examples/google-workspace, then destroy
    GoogleWorkspace,
    /// Apply the IAM users/groups policy example; repeated apply/destroy may error
    AwsPolicies,
    /// Both, one after another
    All,
}

#[derive(Args)]
pub struct BuiltinArgs {
    /// Scenario to run
    #[arg(value_enum)]
    pub name: BuiltinScenario,

    /// Repository root containing the examples/ directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

pub async fn execute(args: BuiltinArgs, ctx: &Context) -> Result<()> {
    let root = std::fs::canonicalize(&args.root)?;
    let mut scenarios = match args.name {
        BuiltinScenario::GoogleWorkspace => vec![Scenario::google_workspace(&root)],
        BuiltinScenario::AwsPolicies => vec![Scenario::aws_and_customer_managed_policies(&root)],
        BuiltinScenario::All => Scenario::builtin(&root),
    };

    for scenario in &mut scenarios {
        scenario.options.stream_output = ctx.stream_output;
    }

    let runner = ScenarioRunner::new(ctx.runner()?);
    let results = runner.run_all(&scenarios).await;
    report::finish(results, ctx.json)
}
