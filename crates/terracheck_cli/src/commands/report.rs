//! Human and JSON rendering of scenario reports.

use anyhow::Result;
use serde_json::{json, Value};

use terracheck_terraform::{ScenarioReport, StepOutcome, TerraformError, TerraformResult};

fn outcome_marker(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Succeeded => "✅",
        StepOutcome::Tolerated { .. } => "⚠️ ",
        StepOutcome::Failed { .. } => "❌",
        StepOutcome::Skipped => "⏭️ ",
    }
}

fn print_outcome(label: &str, outcome: &StepOutcome, duration_ms: Option<u64>) {
    let timing = duration_ms
        .map(|ms| format!(" ({}ms)", ms))
        .unwrap_or_default();
    println!("   {} {}{}", outcome_marker(outcome), label, timing);
    match outcome {
        StepOutcome::Tolerated { error } => {
            println!("      expected potential error, skipped: {}", error)
        }
        StepOutcome::Failed { error } => println!("      {}", error),
        _ => {}
    }
}

/// Print one report in human-readable form.
pub fn print_report(report: &ScenarioReport) {
    println!("🏗️  {} ({})", report.scenario, report.terraform_dir.display());
    for step in &report.steps {
        print_outcome(&step.action.to_string(), &step.outcome, Some(step.duration_ms));
    }
    print_outcome("cleanup destroy", &report.cleanup, None);
    for step in &report.verify {
        let label = format!("verify {}", step.action);
        print_outcome(&label, &step.outcome, Some(step.duration_ms));
    }
    if report.passed {
        println!("   ✅ passed");
    } else {
        println!("   ❌ failed");
    }
    println!();
}

/// JSON form of a run: one entry per scenario, in run order. A scenario that
/// could not start is an entry with `passed: false` and an `error`.
pub fn to_json(results: &[(String, TerraformResult<ScenarioReport>)]) -> Result<Value> {
    let entries = results
        .iter()
        .map(|(name, result)| match result {
            Ok(report) => serde_json::to_value(report),
            Err(e) => Ok(json!({
                "scenario": name,
                "passed": false,
                "error": e.to_string(),
            })),
        })
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(Value::Array(entries))
}

/// Print all results and fail if any scenario did not pass.
pub fn finish(results: Vec<(String, TerraformResult<ScenarioReport>)>, json: bool) -> Result<()> {
    let failed: Vec<String> = results
        .iter()
        .filter(|(_, result)| !matches!(result, Ok(report) if report.passed))
        .map(|(name, _)| name.clone())
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(&results)?)?);
    } else {
        for (name, result) in &results {
            match result {
                Ok(report) => print_report(report),
                Err(e) => println!("❌ {}: could not start: {}\n", name, e),
            }
        }
        println!(
            "📊 {} scenario(s): {} passed, {} failed",
            results.len(),
            results.len() - failed.len(),
            failed.len()
        );
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(TerraformError::ScenarioFailed {
            scenario: failed.join(", "),
            reason: "see report above".to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_json_includes_scenarios_that_could_not_start() {
        let results = vec![(
            "google-workspace".to_string(),
            Err(TerraformError::InvalidWorkingDir {
                path: PathBuf::from("examples/google-workspace"),
                reason: "directory does not exist".to_string(),
            }),
        )];

        let value = to_json(&results).unwrap();
        let entries = value.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["scenario"], "google-workspace");
        assert_eq!(entries[0]["passed"], false);
        assert!(entries[0]["error"]
            .as_str()
            .unwrap()
            .contains("directory does not exist"));

        let err = finish(results, true).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TerraformError>(),
            Some(TerraformError::ScenarioFailed { .. })
        ));
    }
}
