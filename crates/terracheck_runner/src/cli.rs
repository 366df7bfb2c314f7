//! Process runner for host binaries, optionally wrapped in Docker or Podman.
//!
//! Commands run directly on the host by default. When a [`ContainerImage`]
//! is configured, the command is translated into a `docker run` (or
//! `podman run`) invocation that mounts the working directory into the
//! container and uses the program as the entrypoint.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{CommandConfig, ContainerImage, MountConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{CommandRunner, ExecutionResult};

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Get the CLI command name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// A single line of process output.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: LogStream,
    pub message: String,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Log handler callback type.
pub type LogHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// CLI runner options.
#[derive(Debug, Clone)]
pub struct CliRunnerOptions {
    /// Run commands inside this image instead of on the host
    pub container: Option<ContainerImage>,
    /// Preferred container runtime (if not set, auto-detect)
    pub preferred_runtime: Option<ContainerRuntime>,
    /// Dry-run mode (log commands without executing)
    pub dry_run: bool,
    /// CI mode (timestamped log lines)
    pub ci_mode: bool,
}

impl Default for CliRunnerOptions {
    fn default() -> Self {
        Self {
            container: None,
            preferred_runtime: None,
            dry_run: false,
            ci_mode: std::env::var("CI").is_ok(),
        }
    }
}

impl CliRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn ci_mode(mut self) -> Self {
        self.ci_mode = true;
        self
    }

    pub fn in_container(mut self, image: ContainerImage) -> Self {
        self.container = Some(image);
        self
    }

    pub fn prefer_docker(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Docker);
        self
    }

    pub fn prefer_podman(mut self) -> Self {
        self.preferred_runtime = Some(ContainerRuntime::Podman);
        self
    }
}

/// Runner that spawns real processes.
pub struct CliRunner {
    runtime: Option<ContainerRuntime>,
    options: CliRunnerOptions,
    log_handler: Option<LogHandler>,
}

impl CliRunner {
    /// Create a new runner. Detects a container runtime when container
    /// execution is requested.
    pub fn new(options: CliRunnerOptions) -> RunnerResult<Self> {
        let runtime = match &options.container {
            Some(image) => {
                let runtime = Self::detect_runtime(&options)?;
                info!("Using container runtime {} with {}", runtime, image.full_image());
                Some(runtime)
            }
            None => None,
        };

        Ok(Self {
            runtime,
            options,
            log_handler: None,
        })
    }

    /// Create a runner that executes on the host.
    pub fn local() -> Self {
        Self {
            runtime: None,
            options: CliRunnerOptions::default(),
            log_handler: None,
        }
    }

    /// Create a runner with a specific runtime, skipping detection.
    pub fn with_runtime(runtime: ContainerRuntime, options: CliRunnerOptions) -> Self {
        Self {
            runtime: Some(runtime),
            options,
            log_handler: None,
        }
    }

    /// Set a log handler for streamed lines.
    pub fn with_log_handler(mut self, handler: LogHandler) -> Self {
        self.log_handler = Some(handler);
        self
    }

    /// Detect available container runtime.
    pub fn detect_runtime(options: &CliRunnerOptions) -> RunnerResult<ContainerRuntime> {
        if let Some(preferred) = options.preferred_runtime {
            if Self::is_program_available(preferred.command()) {
                return Ok(preferred);
            }
            warn!(
                "Preferred runtime {} not available, trying alternatives",
                preferred
            );
        }

        for runtime in [ContainerRuntime::Docker, ContainerRuntime::Podman] {
            if Self::is_program_available(runtime.command()) {
                return Ok(runtime);
            }
        }

        Err(RunnerError::RuntimeNotAvailable(
            "Neither Docker nor Podman is available".to_string(),
        ))
    }

    /// Check if `<program> version` runs successfully.
    fn is_program_available(program: &str) -> bool {
        Command::new(program)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Get the container runtime, if commands run in containers.
    pub fn runtime(&self) -> Option<ContainerRuntime> {
        self.runtime
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Translate a command into the program and arguments actually spawned.
    fn build_invocation(&self, command: &CommandConfig) -> RunnerResult<(String, Vec<String>)> {
        let (Some(runtime), Some(image)) = (self.runtime, &self.options.container) else {
            return Ok((command.program.clone(), command.args.clone()));
        };

        let mut args = vec!["run".to_string(), "--rm".to_string()];

        if let Some(dir) = &command.working_dir {
            if !dir.is_absolute() {
                return Err(RunnerError::InvalidMount(format!(
                    "working directory must be absolute to mount: {}",
                    dir.display()
                )));
            }
            args.push("-v".to_string());
            args.push(MountConfig::new(dir.clone(), image.workdir.clone()).to_volume_spec());
            args.push("-w".to_string());
            args.push(image.workdir.clone());
        }

        for mount in &image.mounts {
            args.push("-v".to_string());
            args.push(mount.to_volume_spec());
        }

        for (key, value) in &command.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        if let Some(network) = &image.network_mode {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        let entrypoint = Path::new(&command.program)
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| command.program.clone());
        args.push("--entrypoint".to_string());
        args.push(entrypoint);

        args.push(image.full_image());
        args.extend(command.args.iter().cloned());

        Ok((runtime.command().to_string(), args))
    }

    /// Spawn the process and capture its output, enforcing the timeout.
    fn execute(
        program: &str,
        args: &[String],
        command: &CommandConfig,
        run_config: &RunConfig,
        on_host: bool,
        ci_mode: bool,
        log_handler: Option<LogHandler>,
    ) -> RunnerResult<(i64, String, String)> {
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        // Containers receive the environment and workdir through flags instead.
        if on_host {
            cmd.envs(&command.env);
            if let Some(dir) = &command.working_dir {
                cmd.current_dir(dir);
            }
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RunnerError::BinaryNotAvailable(program.to_string())
            } else {
                RunnerError::ExecutionFailed(format!("Failed to spawn {}: {}", program, e))
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr not captured".to_string()))?;

        let stdout_handle = spawn_reader(
            stdout,
            LogStream::Stdout,
            run_config.stream_logs,
            ci_mode,
            log_handler.clone(),
        );
        let stderr_handle = spawn_reader(
            stderr,
            LogStream::Stderr,
            run_config.stream_logs,
            ci_mode,
            log_handler,
        );

        let status = if run_config.timeout_seconds > 0 {
            let timeout = Duration::from_secs(run_config.timeout_seconds);
            let start = Instant::now();
            loop {
                match child.try_wait() {
                    Ok(Some(status)) => break status,
                    Ok(None) => {
                        if start.elapsed() > timeout {
                            let _ = child.kill();
                            let _ = child.wait();
                            return Err(RunnerError::Timeout(run_config.timeout_seconds));
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    Err(e) => {
                        return Err(RunnerError::ExecutionFailed(format!(
                            "Failed to wait for process: {}",
                            e
                        )));
                    }
                }
            }
        } else {
            child.wait().map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?
        };

        let stdout_output = stdout_handle.join().unwrap_or_default();
        let stderr_output = stderr_handle.join().unwrap_or_default();

        let exit_code = status.code().unwrap_or(-1) as i64;

        Ok((exit_code, stdout_output, stderr_output))
    }
}

/// Collect a pipe line by line, optionally echoing each line as it arrives.
fn spawn_reader<R: Read + Send + 'static>(
    pipe: R,
    stream: LogStream,
    stream_logs: bool,
    ci_mode: bool,
    log_handler: Option<LogHandler>,
) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let reader = BufReader::new(pipe);
        let mut output = String::new();
        for line in reader.lines().map_while(Result::ok) {
            output.push_str(&line);
            output.push('\n');
            if !stream_logs {
                continue;
            }
            let log_line = LogLine {
                timestamp: Utc::now(),
                stream,
                message: line,
            };
            if ci_mode {
                println!(
                    "[{}] [{}] {}",
                    log_line.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                    log_line.stream,
                    log_line.message
                );
            } else {
                match stream {
                    LogStream::Stdout => println!("{}", log_line.message),
                    LogStream::Stderr => eprintln!("{}", log_line.message),
                }
            }
            if let Some(handler) = &log_handler {
                handler(log_line);
            }
        }
        output
    })
}

#[async_trait]
impl CommandRunner for CliRunner {
    async fn is_available(&self, program: &str) -> RunnerResult<bool> {
        match self.runtime {
            Some(runtime) => Ok(Self::is_program_available(runtime.command())),
            None => Ok(Self::is_program_available(program)),
        }
    }

    async fn version(&self, program: &str) -> RunnerResult<String> {
        let command = CommandConfig::new(program).arg("version");
        let result = self.run(&command, &RunConfig::default().timeout(60)).await?;
        if !result.success() {
            return Err(RunnerError::ExecutionFailed(result.combined_output()));
        }
        Ok(result.stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    async fn run(
        &self,
        command: &CommandConfig,
        run_config: &RunConfig,
    ) -> RunnerResult<ExecutionResult> {
        let (program, args) = self.build_invocation(command)?;
        let rendered = CommandConfig::new(program.clone()).args(args.clone()).display();

        // Nothing on stdout: callers parse it as terraform output.
        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", rendered);
            let now = Utc::now();
            return Ok(ExecutionResult {
                execution_id: ExecutionResult::DRY_RUN_ID.to_string(),
                exit_code: 0,
                stdout: String::new(),
                stderr: format!("[DRY-RUN] Command: {}", rendered),
                started_at: now,
                finished_at: now,
                duration_ms: 0,
            });
        }

        debug!("Executing: {}", rendered);

        let started_at = Utc::now();
        let (exit_code, stdout, stderr) = {
            let command = command.clone();
            let run_config = run_config.clone();
            let on_host = self.runtime.is_none() || self.options.container.is_none();
            let ci_mode = self.options.ci_mode;
            let log_handler = self.log_handler.clone();
            tokio::task::spawn_blocking(move || {
                Self::execute(
                    &program,
                    &args,
                    &command,
                    &run_config,
                    on_host,
                    ci_mode,
                    log_handler,
                )
            })
            .await
            .map_err(|e| RunnerError::ExecutionFailed(format!("Execution task failed: {}", e)))??
        };
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if exit_code == 0 {
            info!("{} completed in {}ms", command.display(), duration_ms);
        } else {
            error!(
                "{} failed with exit code {} after {}ms",
                command.display(),
                exit_code,
                duration_ms
            );
        }

        Ok(ExecutionResult {
            execution_id: uuid::Uuid::new_v4().to_string(),
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_local_invocation_is_passthrough() {
        let runner = CliRunner::local();
        let command = CommandConfig::new("terraform")
            .args(["init", "-upgrade=false"])
            .working_dir("/srv/infra");

        let (program, args) = runner.build_invocation(&command).unwrap();
        assert_eq!(program, "terraform");
        assert_eq!(args, vec!["init", "-upgrade=false"]);
        assert!(runner.runtime().is_none());
    }

    #[test]
    fn test_container_invocation() {
        let options = CliRunnerOptions::new().in_container(
            ContainerImage::terraform()
                .mount(MountConfig::new(PathBuf::from("/home/me/.aws"), "/root/.aws").read_only()),
        );
        let runner = CliRunner::with_runtime(ContainerRuntime::Docker, options);

        let command = CommandConfig::new("/usr/local/bin/terraform")
            .args(["apply", "-auto-approve"])
            .working_dir("/srv/infra")
            .env("TF_LOG", "INFO");

        let (program, args) = runner.build_invocation(&command).unwrap();
        assert_eq!(program, "docker");
        assert_eq!(&args[..2], &["run".to_string(), "--rm".to_string()]);
        assert!(args.contains(&"/srv/infra:/workspace".to_string()));
        assert!(args.contains(&"/home/me/.aws:/root/.aws:ro".to_string()));
        assert!(args.contains(&"TF_LOG=INFO".to_string()));

        let entry = args.iter().position(|a| a == "--entrypoint").unwrap();
        assert_eq!(args[entry + 1], "terraform");
        assert_eq!(args[entry + 2], "hashicorp/terraform:1.6");
        assert_eq!(&args[entry + 3..], &["apply".to_string(), "-auto-approve".to_string()]);
    }

    #[test]
    fn test_container_requires_absolute_dir() {
        let options = CliRunnerOptions::new().in_container(ContainerImage::terraform());
        let runner = CliRunner::with_runtime(ContainerRuntime::Podman, options);
        let command = CommandConfig::new("terraform").arg("init").working_dir("relative/dir");

        assert!(matches!(
            runner.build_invocation(&command),
            Err(RunnerError::InvalidMount(_))
        ));
    }

    #[tokio::test]
    async fn test_dry_run_mode() {
        let runner = CliRunner::with_runtime(
            ContainerRuntime::Docker,
            CliRunnerOptions::new().dry_run(),
        );
        assert!(runner.is_dry_run());

        let result = runner
            .run(&CommandConfig::new("terraform").arg("plan"), &RunConfig::default())
            .await
            .unwrap();
        assert!(result.success());
        assert!(result.is_dry_run());
        assert!(result.stdout.is_empty());
        assert!(result.stderr.contains("terraform plan"));
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let runner = CliRunner::local();
        let result = runner
            .run(
                &CommandConfig::new("terracheck-definitely-missing-binary"),
                &RunConfig::default(),
            )
            .await;
        assert!(matches!(result, Err(RunnerError::BinaryNotAvailable(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_host_process() {
        let dir = tempfile::tempdir().unwrap();
        let runner = CliRunner::local();
        let command = CommandConfig::new("sh")
            .args(["-c", "echo \"$GREETING\"; pwd; echo oops >&2; exit 3"])
            .working_dir(dir.path())
            .env("GREETING", "hello");

        let result = runner.run(&command, &RunConfig::default()).await.unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(result.stdout.starts_with("hello\n"));
        assert_eq!(result.stderr, "oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_process() {
        let runner = CliRunner::local();
        let command = CommandConfig::new("sh").args(["-c", "sleep 5"]);

        let result = runner.run(&command, &RunConfig::default().timeout(1)).await;
        assert!(matches!(result, Err(RunnerError::Timeout(1))));
    }
}
