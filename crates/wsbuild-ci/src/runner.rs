//! External command execution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::debug;

/// A command line to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable.
    pub program: String,

    pub args: Vec<String>,

    /// Extra environment variables.
    pub env: BTreeMap<String, String>,

    /// Working directory; inherits the current one when `None`.
    pub current_dir: Option<PathBuf>,

    /// Stream output to the terminal instead of capturing it.
    pub stream: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            stream: false,
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn streamed(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Command line for log messages.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (0 = success, -1 = terminated by signal).
    pub exit_code: i32,

    /// Captured stdout (empty when streamed).
    pub stdout: String,

    /// Captured stderr (empty when streamed).
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the command exited with status 0.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs commands to completion, one at a time.
pub struct CommandRunner;

impl CommandRunner {
    /// Execute a command and wait for it to exit.
    ///
    /// A non-zero exit is not an error; only a failure to spawn or wait is.
    pub async fn run(spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        let start = Instant::now();
        debug!(command = %spec.display(), "Executing command");

        let mut command = Command::new(&spec.program);
        command.args(&spec.args).envs(&spec.env);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        if spec.stream {
            command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let output = command.spawn()?.wait_with_output().await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_passed() {
        let output = CommandOutput {
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
        };
        assert!(output.passed());
    }

    #[test]
    fn test_command_output_failed() {
        let output = CommandOutput {
            exit_code: 1,
            stdout: "".to_string(),
            stderr: "error".to_string(),
            duration_ms: 100,
        };
        assert!(!output.passed());
    }

    #[test]
    fn test_spec_display() {
        let spec = CommandSpec::new("docker").args(["rm", "-f", "workspace-test-full"]);
        assert_eq!(spec.display(), "docker rm -f workspace-test-full");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let spec = CommandSpec::new("echo").arg("hello");
        let output = CommandRunner::run(&spec).await.expect("execute failed");
        assert!(output.passed());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let spec = CommandSpec::new("false");
        let output = CommandRunner::run(&spec).await.expect("execute failed");
        assert!(!output.passed());
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_env_and_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $WORKSPACE_IP; pwd"])
            .env("WORKSPACE_IP", "172.17.0.9")
            .current_dir(dir.path());
        let output = CommandRunner::run(&spec).await.expect("execute failed");
        assert!(output.stdout.contains("172.17.0.9"));
        let name = dir.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(output.stdout.contains(&name));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let spec = CommandSpec::new("wsbuild-definitely-not-installed");
        assert!(CommandRunner::run(&spec).await.is_err());
    }
}
