//! Docker CLI backend for image building, publishing and test containers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};
use wsbuild_core::{
    is_stable_version, BuildArgs, ContainerDetails, ContainerRuntime, ImageFacility, Result,
    RuntimeError, RuntimeResult,
};

use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Image and container facilities backed by the `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    context_dir: PathBuf,
}

impl DockerCli {
    /// Use `docker` from `PATH` with `context_dir` as the build context.
    pub fn new(context_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: "docker".to_string(),
            context_dir: context_dir.into(),
        }
    }

    /// Use another docker-compatible binary, e.g. `podman`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.binary)
    }

    /// Command line for `docker build`, tagging both `version` and `latest`.
    pub fn build_command(&self, name: &str, version: &str, build_args: &BuildArgs) -> CommandSpec {
        self.command()
            .arg("build")
            .args(["-t".to_string(), format!("{name}:{version}")])
            .args(["-t".to_string(), format!("{name}:latest")])
            .args(build_args.to_cli_args())
            .arg(self.context_dir.to_string_lossy())
            .streamed()
    }

    /// Remote tags a release publishes: the version, plus `latest` for stable versions.
    pub fn release_tags(name: &str, version: &str, prefix: &str) -> Vec<String> {
        let remote = format!("{prefix}{name}");
        let mut tags = vec![format!("{remote}:{version}")];
        if is_stable_version(version) {
            tags.push(format!("{remote}:latest"));
        }
        tags
    }

    /// Command line for `docker run` of a detached, non-auto-removed container.
    pub fn run_command(
        &self,
        image_ref: &str,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> CommandSpec {
        let mut spec = self.command().args(["run", "--detach", "--name", name]);
        for (key, value) in env {
            spec = spec.args(["--env".to_string(), format!("{key}={value}")]);
        }
        spec.arg(image_ref)
    }

    /// Command line for `docker exec` with environment overrides.
    pub fn exec_command(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
        command: &[String],
    ) -> CommandSpec {
        let mut spec = self.command().arg("exec");
        for (key, value) in env {
            spec = spec.args(["--env".to_string(), format!("{key}={value}")]);
        }
        spec.arg(name).args(command.iter().cloned()).streamed()
    }

    async fn run_status(&self, spec: CommandSpec) -> Result<i32> {
        let output = CommandRunner::run(&spec).await?;
        Ok(output.exit_code)
    }

    async fn run_in_container(&self, container: &str, spec: CommandSpec) -> RuntimeResult<CommandOutput> {
        let output = CommandRunner::run(&spec).await?;
        if !output.passed() {
            return Err(RuntimeError::Container {
                container: container.to_string(),
                message: format!(
                    "`{}` exited with {}: {}",
                    spec.display(),
                    output.exit_code,
                    output.stderr.trim()
                ),
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl ImageFacility for DockerCli {
    async fn build_image(&self, name: &str, version: &str, build_args: &BuildArgs) -> Result<i32> {
        info!(image = %name, version = %version, "Building docker image");
        self.run_status(self.build_command(name, version, build_args))
            .await
    }

    async fn release_image(&self, name: &str, version: &str, prefix: &str) -> Result<i32> {
        let local = format!("{name}:{version}");
        for remote in Self::release_tags(name, version, prefix) {
            let status = self
                .run_status(self.command().args(["tag", local.as_str(), remote.as_str()]))
                .await?;
            if status != 0 {
                return Ok(status);
            }
            info!(image = %remote, "Pushing docker image");
            let status = self
                .run_status(self.command().args(["push", remote.as_str()]).streamed())
                .await?;
            if status != 0 {
                return Ok(status);
            }
        }
        Ok(0)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run_detached(
        &self,
        image_ref: &str,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> RuntimeResult<()> {
        let probe = self.command().args(["image", "inspect", image_ref]);
        let probe = CommandRunner::run(&probe).await?;
        if !probe.passed() {
            return Err(image_probe_failure(image_ref, name, &probe));
        }

        let output = self
            .run_in_container(name, self.run_command(image_ref, name, env))
            .await?;
        debug!(container = %name, id = %output.stdout.trim(), "Started container");
        Ok(())
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<ContainerDetails> {
        let output = self
            .run_in_container(name, self.command().args(["inspect", name]))
            .await?;
        let parsed: serde_json::Value = serde_json::from_str(&output.stdout)
            .map_err(|e| RuntimeError::Parse(format!("docker inspect {name}: {e}")))?;
        let first = parsed
            .as_array()
            .and_then(|items| items.first())
            .ok_or_else(|| RuntimeError::Parse(format!("docker inspect {name}: empty result")))?;
        Ok(ContainerDetails::from_inspect(first))
    }

    async fn exec(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
        command: &[String],
    ) -> RuntimeResult<i32> {
        let output = CommandRunner::run(&self.exec_command(name, env, command)).await?;
        Ok(output.exit_code)
    }

    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<()> {
        let mut spec = self.command().arg("rm");
        if force {
            spec = spec.arg("--force");
        }
        self.run_in_container(name, spec.arg(name)).await?;
        Ok(())
    }

    async fn logs(&self, name: &str) -> RuntimeResult<String> {
        let output = self
            .run_in_container(name, self.command().args(["logs", name]))
            .await?;
        Ok(format!("{}{}", output.stdout, output.stderr))
    }
}

/// Only a "no such image" answer means the image is missing; anything else
/// (daemon down, permissions) is a runtime failure.
fn image_probe_failure(image_ref: &str, container: &str, probe: &CommandOutput) -> RuntimeError {
    let stderr = probe.stderr.trim();
    if stderr.contains("No such image") || stderr.contains("No such object") {
        return RuntimeError::ImageNotFound {
            image: image_ref.to_string(),
        };
    }
    RuntimeError::Container {
        container: container.to_string(),
        message: format!(
            "docker image inspect {image_ref} exited with {}: {stderr}",
            probe.exit_code
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use wsbuild_core::{BuildRequest, Flavor};

    #[test]
    fn test_build_command_tags_version_and_latest() {
        let docker = DockerCli::new(".");
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = BuildRequest::new(Flavor::Light, "1.3.0", "abc1234", at);
        let spec = docker.build_command(&request.image_name, "1.3.0", &request.build_args());

        assert_eq!(spec.program, "docker");
        assert_eq!(spec.args[0], "build");
        assert!(spec.args.contains(&"ml-workspace-light:1.3.0".to_string()));
        assert!(spec.args.contains(&"ml-workspace-light:latest".to_string()));
        assert!(spec.args.contains(&"ARG_WORKSPACE_FLAVOR=light".to_string()));
        assert_eq!(spec.args.last().map(String::as_str), Some("."));
    }

    #[test]
    fn test_release_tags_for_stable_and_prerelease() {
        assert_eq!(
            DockerCli::release_tags("ml-workspace", "1.3.0", "khulnasoft/"),
            vec!["khulnasoft/ml-workspace:1.3.0", "khulnasoft/ml-workspace:latest"]
        );
        assert_eq!(
            DockerCli::release_tags("ml-workspace-minimal", "1.3.0-dev.2", "khulnasoft/"),
            vec!["khulnasoft/ml-workspace-minimal:1.3.0-dev.2"]
        );
    }

    #[test]
    fn test_run_command_is_detached_without_auto_remove() {
        let docker = DockerCli::new(".");
        let mut env = BTreeMap::new();
        env.insert("WORKSPACE_NAME".to_string(), "workspace-test-full".to_string());
        env.insert("WORKSPACE_ACCESS_PORT".to_string(), "8080".to_string());
        let spec = docker.run_command("ml-workspace:1.3.0", "workspace-test-full", &env);

        assert!(spec.args.contains(&"--detach".to_string()));
        assert!(!spec.args.contains(&"--rm".to_string()));
        assert!(spec.args.contains(&"WORKSPACE_ACCESS_PORT=8080".to_string()));
        assert_eq!(spec.args.last().map(String::as_str), Some("ml-workspace:1.3.0"));
    }

    #[test]
    fn test_exec_command_passes_env_before_container() {
        let docker = DockerCli::new(".").with_binary("podman");
        let mut env = BTreeMap::new();
        env.insert("WORKSPACE_IP".to_string(), "172.17.0.4".to_string());
        let command = vec!["pytest".to_string(), "/resources/tests".to_string()];
        let spec = docker.exec_command("workspace-test-gpu", &env, &command);

        assert_eq!(spec.program, "podman");
        assert_eq!(
            spec.args,
            vec![
                "exec",
                "--env",
                "WORKSPACE_IP=172.17.0.4",
                "workspace-test-gpu",
                "pytest",
                "/resources/tests"
            ]
        );
        assert!(spec.stream);
    }

    fn probe_output(stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_image_probe_failure_classification() {
        let missing = image_probe_failure(
            "ml-workspace:1.3.0",
            "workspace-test-full",
            &probe_output("Error: No such image: ml-workspace:1.3.0\n"),
        );
        assert!(matches!(missing, RuntimeError::ImageNotFound { .. }));

        let denied = image_probe_failure(
            "ml-workspace:1.3.0",
            "workspace-test-full",
            &probe_output("permission denied while trying to connect to the Docker daemon socket"),
        );
        match denied {
            RuntimeError::Container { container, message } => {
                assert_eq!(container, "workspace-test-full");
                assert!(message.contains("permission denied"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Write an executable stand-in for the docker binary.
    #[cfg(unix)]
    fn fake_docker(dir: &std::path::Path, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("docker");
        std::fs::write(&path, format!("#!/bin/sh\n{script}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreachable_daemon_is_not_a_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_docker(
            dir.path(),
            "echo 'Cannot connect to the Docker daemon at unix:///var/run/docker.sock.' >&2\nexit 1\n",
        );
        let docker = DockerCli::new(dir.path()).with_binary(binary);

        let err = docker
            .run_detached("ml-workspace:1.3.0", "workspace-test-full", &BTreeMap::new())
            .await
            .unwrap_err();
        match err {
            RuntimeError::Container { container, message } => {
                assert_eq!(container, "workspace-test-full");
                assert!(message.contains("Cannot connect to the Docker daemon"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_image_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_docker(
            dir.path(),
            "echo 'Error: No such image: ml-workspace:1.3.0' >&2\nexit 1\n",
        );
        let docker = DockerCli::new(dir.path()).with_binary(binary);

        let err = docker
            .run_detached("ml-workspace:1.3.0", "workspace-test-full", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ImageNotFound { ref image } if image == "ml-workspace:1.3.0"
        ));
    }
}
