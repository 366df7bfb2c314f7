//! Suite configuration: scenarios loaded from a TOML or YAML file.
//!
//! ```toml
//! [defaults]
//! no_color = true
//! env_vars = { AWS_REGION = "eu-west-1" }
//!
//! [[scenario]]
//! name = "google-workspace"
//! terraform_dir = "examples/google-workspace"
//! cleanup = "strict"
//! steps = [{ action = "init_and_apply" }]
//! ```
//!
//! Values under `[defaults]` apply to every scenario that does not set them;
//! table values (`vars`, `env_vars`, ...) are merged key by key. Relative
//! `terraform_dir` paths resolve against the directory of the file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{TerraformError, TerraformResult};
use crate::scenario::Scenario;

/// Default suite file name.
pub const DEFAULT_CONFIG_FILE: &str = "terracheck.toml";

/// Environment variable overriding the suite file location.
pub const CONFIG_ENV_VAR: &str = "TERRACHECK_CONFIG";

/// A loaded suite of scenarios.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub base_dir: PathBuf,
    pub scenarios: Vec<Scenario>,
}

impl SuiteConfig {
    /// Load a suite file; `.yaml`/`.yml` are parsed as YAML, anything else as TOML.
    pub fn load(path: &Path) -> TerraformResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TerraformError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        debug!("Loading suite config from {}", path.display());

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content, &base_dir),
            _ => Self::from_toml_str(&content, &base_dir),
        }
    }

    pub fn from_toml_str(content: &str, base_dir: &Path) -> TerraformResult<Self> {
        let raw: Value = toml::from_str(content)?;
        Self::from_value(raw, base_dir)
    }

    pub fn from_yaml_str(content: &str, base_dir: &Path) -> TerraformResult<Self> {
        let raw: Value = serde_yaml::from_str(content)?;
        Self::from_value(raw, base_dir)
    }

    fn from_value(raw: Value, base_dir: &Path) -> TerraformResult<Self> {
        let Value::Object(mut root) = raw else {
            return Err(TerraformError::Config("suite file must be a table".to_string()));
        };

        let defaults = match root.remove("defaults") {
            None => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(TerraformError::Config("`defaults` must be a table".to_string()))
            }
        };

        let entries = match root.remove("scenario").or_else(|| root.remove("scenarios")) {
            None => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(TerraformError::Config("`scenario` must be a list".to_string()))
            }
        };

        let mut seen = HashSet::new();
        let mut scenarios = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let Value::Object(mut table) = entry else {
                return Err(TerraformError::Config(format!(
                    "scenario #{} must be a table",
                    index + 1
                )));
            };
            apply_defaults(&mut table, &defaults);

            let label = table
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index + 1));
            if !table.contains_key("terraform_dir") {
                return Err(TerraformError::Config(format!(
                    "scenario {} is missing terraform_dir",
                    label
                )));
            }

            let mut scenario: Scenario = serde_json::from_value(Value::Object(table))
                .map_err(|e| TerraformError::Config(format!("scenario {}: {}", label, e)))?;
            if !seen.insert(scenario.name.clone()) {
                return Err(TerraformError::Config(format!(
                    "duplicate scenario name: {}",
                    scenario.name
                )));
            }
            scenario.options = scenario.options.resolve_against(base_dir);
            scenarios.push(scenario);
        }

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            scenarios,
        })
    }

    /// Look up a scenario by name.
    pub fn scenario(&self, name: &str) -> TerraformResult<&Scenario> {
        self.scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| TerraformError::ScenarioNotFound(name.to_string()))
    }

    /// Scenarios matching `names`, in the given order; all of them if empty.
    pub fn select(&self, names: &[String]) -> TerraformResult<Vec<Scenario>> {
        if names.is_empty() {
            return Ok(self.scenarios.clone());
        }
        names
            .iter()
            .map(|name| self.scenario(name).cloned())
            .collect()
    }
}

/// Fill keys missing from `table` with `defaults`; nested tables merge one level deep.
fn apply_defaults(table: &mut Map<String, Value>, defaults: &Map<String, Value>) {
    for (key, default) in defaults {
        match (table.get_mut(key), default) {
            (None, _) => {
                table.insert(key.clone(), default.clone());
            }
            (Some(Value::Object(own)), Value::Object(shared)) => {
                for (k, v) in shared {
                    own.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::CleanupPolicy;
    use crate::scenario::{Action, ErrorMode, Step};
    use std::fs;
    use tempfile::tempdir;

    const SUITE: &str = r#"
[defaults]
no_color = true
max_retries = 2
env_vars = { AWS_REGION = "eu-west-1", TF_LOG = "WARN" }

[[scenario]]
name = "google-workspace"
terraform_dir = "examples/google-workspace"
steps = [{ action = "init_and_apply" }]
verify = [{ action = "expect_empty_state" }]

[[scenario]]
name = "aws-policies"
terraform_dir = "examples/create-users-and-groups/aws-and-customer-managed-policies"
cleanup = "tolerant"
no_color = false
env_vars = { TF_LOG = "DEBUG" }
steps = [
    { action = "init_and_apply" },
    { action = "apply", on_error = "tolerate" },
    { action = "destroy", on_error = "tolerate" },
]
"#;

    #[test]
    fn test_parse_toml_suite() {
        let suite = SuiteConfig::from_toml_str(SUITE, Path::new("/repo")).unwrap();
        assert_eq!(suite.scenarios.len(), 2);

        let gw = suite.scenario("google-workspace").unwrap();
        assert_eq!(
            gw.options.terraform_dir,
            PathBuf::from("/repo/examples/google-workspace")
        );
        assert!(gw.options.no_color);
        assert_eq!(gw.options.max_retries, 2);
        assert_eq!(gw.cleanup, CleanupPolicy::Strict);
        assert_eq!(gw.steps, vec![Step::fail_fast(Action::InitAndApply)]);
        assert_eq!(gw.verify, vec![Step::fail_fast(Action::ExpectEmptyState)]);

        let aws = suite.scenario("aws-policies").unwrap();
        assert!(!aws.options.no_color);
        assert_eq!(aws.cleanup, CleanupPolicy::Tolerant);
        assert_eq!(aws.steps[1].on_error, ErrorMode::Tolerate);
        assert!(aws.verify.is_empty());
        assert_eq!(aws.options.env_vars["TF_LOG"], "DEBUG");
        assert_eq!(aws.options.env_vars["AWS_REGION"], "eu-west-1");
    }

    #[test]
    fn test_parse_yaml_suite() {
        let yaml = r#"
scenarios:
  - name: policies
    terraform_dir: /abs/policies
    steps:
      - action: init_and_apply
      - action: expect_no_changes
"#;
        let suite = SuiteConfig::from_yaml_str(yaml, Path::new("/repo")).unwrap();
        let scenario = suite.scenario("policies").unwrap();
        assert_eq!(scenario.options.terraform_dir, PathBuf::from("/abs/policies"));
        assert_eq!(scenario.steps[1].action, Action::ExpectNoChanges);
    }

    #[test]
    fn test_missing_dir_is_rejected() {
        let err =
            SuiteConfig::from_toml_str("[[scenario]]\nname = \"x\"\n", Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("missing terraform_dir"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let toml = r#"
[[scenario]]
name = "x"
terraform_dir = "a"

[[scenario]]
name = "x"
terraform_dir = "b"
"#;
        let err = SuiteConfig::from_toml_str(toml, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("duplicate scenario name"));
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let toml = r#"
[[scenario]]
name = "x"
terraform_dir = "a"
steps = [{ action = "refresh" }]
"#;
        assert!(matches!(
            SuiteConfig::from_toml_str(toml, Path::new(".")),
            Err(TerraformError::Config(_))
        ));
    }

    #[test]
    fn test_select() {
        let suite = SuiteConfig::from_toml_str(SUITE, Path::new("/repo")).unwrap();
        assert_eq!(suite.select(&[]).unwrap().len(), 2);

        let picked = suite.select(&["aws-policies".to_string()]).unwrap();
        assert_eq!(picked[0].name, "aws-policies");

        assert!(matches!(
            suite.select(&["nope".to_string()]),
            Err(TerraformError::ScenarioNotFound(_))
        ));
    }

    #[test]
    fn test_load_resolves_against_file_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("terracheck.toml");
        fs::write(&path, SUITE).unwrap();

        let suite = SuiteConfig::load(&path).unwrap();
        assert_eq!(suite.base_dir, dir.path());
        assert_eq!(
            suite.scenario("google-workspace").unwrap().options.terraform_dir,
            dir.path().join("examples/google-workspace")
        );
    }
}
