//! Recording fakes for the facility traits (testing only)
//!
//! Each fake records every call it receives and answers from a script set up
//! by the test, so pipeline behavior can be asserted without docker or git.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::PipelineConfig;
use crate::domain::{BuildArgs, Result, RuntimeError, WsbuildError};
use crate::facilities::*;

// ---------------------------------------------------------------------------
// RecordingBuildTool
// ---------------------------------------------------------------------------

/// Build tool that records step names and optionally fails one step.
#[derive(Debug, Default)]
pub struct RecordingBuildTool {
    steps: Mutex<Vec<String>>,
    failing_step: Option<String>,
}

impl RecordingBuildTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the given step with an error.
    pub fn failing_on(step: impl Into<String>) -> Self {
        Self {
            failing_step: Some(step.into()),
            ..Self::default()
        }
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildTool for RecordingBuildTool {
    async fn build(&self, step: &str, _config: &PipelineConfig) -> Result<()> {
        self.steps.lock().unwrap().push(step.to_string());
        if self.failing_step.as_deref() == Some(step) {
            return Err(WsbuildError::BuildStepFailed {
                step: step.to_string(),
                exit_code: None,
                reason: "build script raised".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingImageFacility
// ---------------------------------------------------------------------------

/// One recorded `build_image` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuildCall {
    pub name: String,
    pub version: String,
    pub build_args: BuildArgs,
}

/// One recorded `release_image` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReleaseCall {
    pub name: String,
    pub version: String,
    pub prefix: String,
}

/// Image facility answering with fixed exit statuses.
#[derive(Debug, Default)]
pub struct RecordingImageFacility {
    builds: Mutex<Vec<ImageBuildCall>>,
    releases: Mutex<Vec<ImageReleaseCall>>,
    build_status: i32,
    release_status: i32,
    build_raises: bool,
}

impl RecordingImageFacility {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_build_status(mut self, status: i32) -> Self {
        self.build_status = status;
        self
    }

    pub fn with_release_status(mut self, status: i32) -> Self {
        self.release_status = status;
        self
    }

    /// Make `build_image` fail with an invocation error instead of a status.
    pub fn raising_on_build(mut self) -> Self {
        self.build_raises = true;
        self
    }

    pub fn builds(&self) -> Vec<ImageBuildCall> {
        self.builds.lock().unwrap().clone()
    }

    pub fn releases(&self) -> Vec<ImageReleaseCall> {
        self.releases.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFacility for RecordingImageFacility {
    async fn build_image(&self, name: &str, version: &str, build_args: &BuildArgs) -> Result<i32> {
        self.builds.lock().unwrap().push(ImageBuildCall {
            name: name.to_string(),
            version: version.to_string(),
            build_args: build_args.clone(),
        });
        if self.build_raises {
            return Err(WsbuildError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "docker: command not found",
            )));
        }
        Ok(self.build_status)
    }

    async fn release_image(&self, name: &str, version: &str, prefix: &str) -> Result<i32> {
        self.releases.lock().unwrap().push(ImageReleaseCall {
            name: name.to_string(),
            version: version.to_string(),
            prefix: prefix.to_string(),
        });
        Ok(self.release_status)
    }
}

// ---------------------------------------------------------------------------
// ScriptedContainerRuntime
// ---------------------------------------------------------------------------

/// One recorded container runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    RunDetached {
        image: String,
        name: String,
        env: BTreeMap<String, String>,
    },
    Inspect {
        name: String,
    },
    Exec {
        name: String,
        env: BTreeMap<String, String>,
        command: Vec<String>,
    },
    Remove {
        name: String,
        force: bool,
    },
    Logs {
        name: String,
    },
}

/// How the scripted runtime answers `run_detached`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StartBehavior {
    #[default]
    Start,
    ImageMissing,
    ContainerError(String),
}

/// How the scripted runtime answers `exec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecBehavior {
    Exit(i32),
    ContainerError(String),
}

impl Default for ExecBehavior {
    fn default() -> Self {
        ExecBehavior::Exit(0)
    }
}

/// Container runtime that follows a script and records every call.
#[derive(Debug)]
pub struct ScriptedContainerRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    start: StartBehavior,
    bridge_ip: Option<String>,
    inspect_error: Option<String>,
    exec: ExecBehavior,
    remove_fails: bool,
    logs: String,
}

impl Default for ScriptedContainerRuntime {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            start: StartBehavior::Start,
            bridge_ip: Some("172.17.0.2".to_string()),
            inspect_error: None,
            exec: ExecBehavior::Exit(0),
            remove_fails: false,
            logs: String::new(),
        }
    }
}

impl ScriptedContainerRuntime {
    /// A healthy runtime: container starts, gets `172.17.0.2`, tests pass.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_start(mut self, start: StartBehavior) -> Self {
        self.start = start;
        self
    }

    pub fn with_bridge_ip(mut self, ip: Option<&str>) -> Self {
        self.bridge_ip = ip.map(str::to_string);
        self
    }

    /// Make `inspect` fail with a runtime error.
    pub fn with_failing_inspect(mut self, message: impl Into<String>) -> Self {
        self.inspect_error = Some(message.into());
        self
    }

    pub fn with_exec(mut self, exec: ExecBehavior) -> Self {
        self.exec = exec;
        self
    }

    pub fn with_failing_remove(mut self) -> Self {
        self.remove_fails = true;
        self
    }

    pub fn with_logs(mut self, logs: impl Into<String>) -> Self {
        self.logs = logs.into();
        self
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn removal_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Remove { .. }))
            .count()
    }

    pub fn start_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::RunDetached { .. }))
            .count()
    }

    fn record(&self, call: RuntimeCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedContainerRuntime {
    async fn run_detached(
        &self,
        image_ref: &str,
        name: &str,
        env: &BTreeMap<String, String>,
    ) -> RuntimeResult<()> {
        self.record(RuntimeCall::RunDetached {
            image: image_ref.to_string(),
            name: name.to_string(),
            env: env.clone(),
        });
        match &self.start {
            StartBehavior::Start => Ok(()),
            StartBehavior::ImageMissing => Err(RuntimeError::ImageNotFound {
                image: image_ref.to_string(),
            }),
            StartBehavior::ContainerError(message) => Err(RuntimeError::Container {
                container: name.to_string(),
                message: message.clone(),
            }),
        }
    }

    async fn inspect(&self, name: &str) -> RuntimeResult<ContainerDetails> {
        self.record(RuntimeCall::Inspect {
            name: name.to_string(),
        });
        if let Some(message) = &self.inspect_error {
            return Err(RuntimeError::Container {
                container: name.to_string(),
                message: message.clone(),
            });
        }
        Ok(ContainerDetails {
            id: Some(format!("id-{name}")),
            state: Some("running".to_string()),
            bridge_ip: self.bridge_ip.clone(),
        })
    }

    async fn exec(
        &self,
        name: &str,
        env: &BTreeMap<String, String>,
        command: &[String],
    ) -> RuntimeResult<i32> {
        self.record(RuntimeCall::Exec {
            name: name.to_string(),
            env: env.clone(),
            command: command.to_vec(),
        });
        match &self.exec {
            ExecBehavior::Exit(code) => Ok(*code),
            ExecBehavior::ContainerError(message) => Err(RuntimeError::Container {
                container: name.to_string(),
                message: message.clone(),
            }),
        }
    }

    async fn remove(&self, name: &str, force: bool) -> RuntimeResult<()> {
        self.record(RuntimeCall::Remove {
            name: name.to_string(),
            force,
        });
        if self.remove_fails {
            return Err(RuntimeError::Container {
                container: name.to_string(),
                message: "removal of container is already in progress".to_string(),
            });
        }
        Ok(())
    }

    async fn logs(&self, name: &str) -> RuntimeResult<String> {
        self.record(RuntimeCall::Logs {
            name: name.to_string(),
        });
        Ok(self.logs.clone())
    }
}

// ---------------------------------------------------------------------------
// Static git metadata
// ---------------------------------------------------------------------------

/// Revision source returning a fixed revision, or failing when `None`.
#[derive(Debug, Clone, Default)]
pub struct StaticRevision(Option<String>);

impl StaticRevision {
    pub fn new(revision: Option<&str>) -> Self {
        Self(revision.map(str::to_string))
    }
}

#[async_trait]
impl RevisionSource for StaticRevision {
    async fn head_revision(&self) -> Result<String> {
        self.0
            .clone()
            .ok_or_else(|| WsbuildError::GitError("not a git repository".to_string()))
    }
}

/// Version source returning a fixed previous version.
#[derive(Debug, Clone, Default)]
pub struct StaticVersionSource {
    version: Option<String>,
    fails: bool,
}

impl StaticVersionSource {
    pub fn new(version: Option<&str>) -> Self {
        Self {
            version: version.map(str::to_string),
            fails: false,
        }
    }

    /// A source whose lookup always errors.
    pub fn failing() -> Self {
        Self {
            version: None,
            fails: true,
        }
    }
}

#[async_trait]
impl VersionSource for StaticVersionSource {
    async fn latest_version(&self) -> Result<Option<String>> {
        if self.fails {
            return Err(WsbuildError::GitError("git describe failed".to_string()));
        }
        Ok(self.version.clone())
    }
}
