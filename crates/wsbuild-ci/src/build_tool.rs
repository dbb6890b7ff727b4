//! Build-tool backend that delegates flavor preparation to per-flavor scripts.

use async_trait::async_trait;
use tracing::info;
use wsbuild_core::{BuildTool, PipelineConfig, Result, WsbuildError};

use crate::runner::{CommandRunner, CommandSpec};

/// Script name looked up in each build step directory.
pub const BUILD_SCRIPT: &str = "build.py";

/// Runs `<project_root>/<step>/build.py` with the pipeline flags forwarded.
///
/// A step without a directory or script has nothing to prepare and succeeds.
#[derive(Debug, Clone)]
pub struct ScriptBuildTool {
    interpreter: String,
}

impl Default for ScriptBuildTool {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
        }
    }
}

impl ScriptBuildTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Flags forwarded to the step script.
    pub fn forwarded_flags(config: &PipelineConfig) -> Vec<String> {
        let mut flags = vec!["--version".to_string(), config.version.clone()];
        if config.phases.make {
            flags.push("--make".to_string());
        }
        if config.phases.test {
            flags.push("--test".to_string());
        }
        if config.phases.release {
            flags.push("--release".to_string());
        }
        flags.push("--docker-image-prefix".to_string());
        flags.push(config.docker_image_prefix.clone());
        flags
    }
}

#[async_trait]
impl BuildTool for ScriptBuildTool {
    async fn build(&self, step: &str, config: &PipelineConfig) -> Result<()> {
        let dir = config.step_dir(step);
        if !dir.join(BUILD_SCRIPT).is_file() {
            info!(step = %step, dir = %dir.display(), "No build script for step, skipping");
            return Ok(());
        }

        let spec = CommandSpec::new(&self.interpreter)
            .arg(BUILD_SCRIPT)
            .args(Self::forwarded_flags(config))
            .current_dir(&dir)
            .streamed();

        let output = CommandRunner::run(&spec)
            .await
            .map_err(|e| WsbuildError::BuildStepFailed {
                step: step.to_string(),
                exit_code: None,
                reason: format!("failed to run {}: {e}", spec.display()),
            })?;

        if !output.passed() {
            return Err(WsbuildError::BuildStepFailed {
                step: step.to_string(),
                exit_code: Some(output.exit_code),
                reason: format!("{} exited with {}", spec.display(), output.exit_code),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_forwarded_flags_follow_toggles() {
        let config = PipelineConfig::new("1.3.0")
            .unwrap()
            .with_phases(true, false, true);
        assert_eq!(
            ScriptBuildTool::forwarded_flags(&config),
            vec![
                "--version",
                "1.3.0",
                "--make",
                "--release",
                "--docker-image-prefix",
                "khulnasoft/"
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_step_directory_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new("1.3.0")
            .unwrap()
            .with_project_root(root.path());
        ScriptBuildTool::new()
            .build("gpu-flavor", &config)
            .await
            .expect("missing step should be skipped");
    }

    #[tokio::test]
    async fn test_failing_script_reports_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let step_dir = root.path().join("light-flavor");
        fs::create_dir_all(&step_dir).unwrap();
        fs::write(step_dir.join(BUILD_SCRIPT), "exit 3\n").unwrap();
        let config = PipelineConfig::new("1.3.0")
            .unwrap()
            .with_project_root(root.path());

        let err = ScriptBuildTool::new()
            .with_interpreter("sh")
            .build("light-flavor", &config)
            .await
            .unwrap_err();
        match err {
            WsbuildError::BuildStepFailed { step, exit_code, .. } => {
                assert_eq!(step, "light-flavor");
                assert_eq!(exit_code, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_succeeding_script_runs_in_step_directory() {
        let root = tempfile::tempdir().unwrap();
        let step_dir = root.path().join("full-flavor");
        fs::create_dir_all(&step_dir).unwrap();
        fs::write(step_dir.join(BUILD_SCRIPT), "touch prepared\n").unwrap();
        let config = PipelineConfig::new("1.3.0")
            .unwrap()
            .with_project_root(root.path());

        ScriptBuildTool::new()
            .with_interpreter("sh")
            .build("full-flavor", &config)
            .await
            .expect("script should succeed");
        assert!(step_dir.join("prepared").exists());
    }
}
