//! Options describing how Terraform is invoked for one configuration directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{TerraformError, TerraformResult};

/// Terraform invocation options for a single configuration directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerraformOptions {
    /// Directory containing the `.tf` files
    pub terraform_dir: PathBuf,
    /// Terraform binary name or path
    pub terraform_binary: String,
    /// Input variables, rendered as `-var key=value`
    pub vars: BTreeMap<String, serde_json::Value>,
    /// Variable files, rendered as `-var-file=path`
    pub var_files: Vec<PathBuf>,
    /// Environment variables for the terraform process
    pub env_vars: BTreeMap<String, String>,
    /// Backend configuration passed to `init`
    pub backend_config: BTreeMap<String, String>,
    /// Pass `-upgrade=true` to `init`
    pub upgrade: bool,
    /// Pass `-reconfigure` to `init`
    pub reconfigure: bool,
    /// Pass `-no-color` to every command
    pub no_color: bool,
    /// Explicit state locking (`None` leaves terraform's default)
    pub lock: Option<bool>,
    /// State lock timeout, e.g. `60s`
    pub lock_timeout: Option<String>,
    /// Limit concurrent operations
    pub parallelism: Option<u32>,
    /// Output regex -> description of errors worth retrying
    pub retryable_errors: BTreeMap<String, String>,
    /// Retries after a retryable failure
    pub max_retries: u32,
    /// Pause between retries
    pub time_between_retries_secs: u64,
    /// Per-command timeout (0 = none)
    pub timeout_secs: u64,
    /// Echo terraform output while it runs
    pub stream_output: bool,
}

impl Default for TerraformOptions {
    fn default() -> Self {
        Self {
            terraform_dir: PathBuf::from("."),
            terraform_binary: "terraform".to_string(),
            vars: BTreeMap::new(),
            var_files: Vec::new(),
            env_vars: BTreeMap::new(),
            backend_config: BTreeMap::new(),
            upgrade: false,
            reconfigure: false,
            no_color: false,
            lock: None,
            lock_timeout: None,
            parallelism: None,
            retryable_errors: BTreeMap::new(),
            max_retries: 0,
            time_between_retries_secs: 5,
            timeout_secs: 3600,
            stream_output: false,
        }
    }
}

impl TerraformOptions {
    /// Options pointing at a configuration directory.
    pub fn new(terraform_dir: impl Into<PathBuf>) -> Self {
        Self {
            terraform_dir: terraform_dir.into(),
            ..Self::default()
        }
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.terraform_binary = binary.into();
        self
    }

    pub fn var(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn var_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.var_files.push(path.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn backend_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.backend_config.insert(key.into(), value.into());
        self
    }

    pub fn no_color(mut self) -> Self {
        self.no_color = true;
        self
    }

    pub fn upgrade(mut self) -> Self {
        self.upgrade = true;
        self
    }

    pub fn reconfigure(mut self) -> Self {
        self.reconfigure = true;
        self
    }

    pub fn lock(mut self, enabled: bool) -> Self {
        self.lock = Some(enabled);
        self
    }

    pub fn parallelism(mut self, n: u32) -> Self {
        self.parallelism = Some(n);
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn stream_output(mut self) -> Self {
        self.stream_output = true;
        self
    }

    /// Retry when output matches `pattern`.
    pub fn retryable_error(
        mut self,
        pattern: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.retryable_errors.insert(pattern.into(), description.into());
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn time_between_retries(mut self, seconds: u64) -> Self {
        self.time_between_retries_secs = seconds;
        self
    }

    /// Adds the transient errors commonly seen from providers and registries
    /// and enables three retries.
    pub fn with_default_retryable_errors(mut self) -> Self {
        for (pattern, description) in DEFAULT_RETRYABLE_ERRORS {
            self.retryable_errors
                .entry(pattern.to_string())
                .or_insert_with(|| description.to_string());
        }
        if self.max_retries == 0 {
            self.max_retries = 3;
        }
        self
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_secs(self.time_between_retries_secs)
    }

    /// Resolve a relative `terraform_dir` against `base`.
    pub fn resolve_against(mut self, base: &Path) -> Self {
        if self.terraform_dir.is_relative() {
            self.terraform_dir = base.join(&self.terraform_dir);
        }
        self
    }

    /// Check that the configuration directory exists and holds at least one
    /// Terraform file. Subdirectories (modules, `.terraform`) are not searched.
    pub fn check_working_dir(&self) -> TerraformResult<()> {
        let dir = &self.terraform_dir;
        let invalid = |reason: &str| TerraformError::InvalidWorkingDir {
            path: dir.clone(),
            reason: reason.to_string(),
        };

        if !dir.exists() {
            return Err(invalid("does not exist"));
        }
        if !dir.is_dir() {
            return Err(invalid("is not a directory"));
        }

        let has_config = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .any(|e| {
                let name = e.file_name().to_string_lossy();
                name.ends_with(".tf") || name.ends_with(".tf.json")
            });

        if !has_config {
            return Err(invalid("contains no .tf or .tf.json files"));
        }
        Ok(())
    }
}

/// Transient failures worth retrying.
pub const DEFAULT_RETRYABLE_ERRORS: &[(&str, &str)] = &[
    (
        ".*read: connection reset by peer.*",
        "Failed to reach registry due to transient network error",
    ),
    (
        ".*TLS handshake timeout.*",
        "Failed to reach registry due to TLS handshake timeout",
    ),
    (
        ".*Failed to query available provider packages.*",
        "Failed to retrieve provider plugin list",
    ),
    (
        ".*Error installing provider.*",
        "Failed to install provider plugin",
    ),
    (
        ".*timeout while waiting for plugin to start.*",
        "Provider plugin did not start in time",
    ),
    (
        ".*Client\\.Timeout exceeded while awaiting headers.*",
        "Registry request timed out",
    ),
];
