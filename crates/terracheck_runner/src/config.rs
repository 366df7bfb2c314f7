//! Command and container configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Container mount configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    /// Host path to mount
    pub source: PathBuf,
    /// Container path to mount to
    pub target: String,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl MountConfig {
    pub fn new(source: PathBuf, target: impl Into<String>) -> Self {
        Self {
            source,
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Render as a `-v` argument value.
    pub fn to_volume_spec(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.source.to_string_lossy(), self.target)
        } else {
            format!("{}:{}", self.source.to_string_lossy(), self.target)
        }
    }
}

/// A single invocation of an external program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to execute (looked up on `PATH` when not absolute)
    pub program: String,
    /// Arguments passed to the program
    pub args: Vec<String>,
    /// Working directory for the process
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
}

impl CommandConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// First argument, which for most CLIs is the subcommand.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Render the command line for logging.
    pub fn display(&self) -> String {
        let mut cmd = self.program.clone();
        for arg in &self.args {
            if arg.contains(' ') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push(' ');
                cmd.push_str(arg);
            }
        }
        cmd
    }
}

/// Container image used to wrap commands when executing in a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerImage {
    pub image: String,
    pub tag: String,
    /// Path inside the container where the working directory is mounted
    pub workdir: String,
    /// Additional mounts (credentials, plugin caches)
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    /// Network mode
    #[serde(default)]
    pub network_mode: Option<String>,
}

impl ContainerImage {
    pub const TERRAFORM: &'static str = "hashicorp/terraform";
    pub const TERRAFORM_TAG: &'static str = "1.6";

    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: "latest".to_string(),
            workdir: "/workspace".to_string(),
            mounts: Vec::new(),
            network_mode: None,
        }
    }

    /// The official Terraform image. Its entrypoint is the terraform binary.
    pub fn terraform() -> Self {
        Self::new(Self::TERRAFORM).tag(Self::TERRAFORM_TAG)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = dir.into();
        self
    }

    pub fn mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network_mode = Some(network.into());
        self
    }

    /// Get the full image name with tag.
    pub fn full_image(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

/// Run configuration with timeouts and output handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
    /// Whether to stream output lines as they arrive
    pub stream_logs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 3600,
            stream_logs: false,
        }
    }
}

impl RunConfig {
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn stream(mut self) -> Self {
        self.stream_logs = true;
        self
    }

    /// Enable or disable log streaming.
    pub fn stream_logs(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_config_builder() {
        let config = CommandConfig::new("terraform")
            .args(["apply", "-input=false"])
            .working_dir("/tmp/infra")
            .env("TF_IN_AUTOMATION", "1");

        assert_eq!(config.subcommand(), Some("apply"));
        assert_eq!(config.working_dir, Some(PathBuf::from("/tmp/infra")));
        assert_eq!(config.env.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
        assert_eq!(config.display(), "terraform apply -input=false");
    }

    #[test]
    fn test_display_quotes_spaces() {
        let config = CommandConfig::new("terraform").args(["apply", "-var", "name=two words"]);
        assert_eq!(config.display(), "terraform apply -var 'name=two words'");
    }

    #[test]
    fn test_mount_config() {
        let mount = MountConfig::new(PathBuf::from("/host/path"), "/container/path").read_only();

        assert!(mount.read_only);
        assert_eq!(mount.to_volume_spec(), "/host/path:/container/path:ro");
    }

    #[test]
    fn test_terraform_image() {
        let image = ContainerImage::terraform();
        assert_eq!(image.full_image(), "hashicorp/terraform:1.6");
        assert_eq!(image.workdir, "/workspace");
    }
}
