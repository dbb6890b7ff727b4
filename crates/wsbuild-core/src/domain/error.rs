//! Error taxonomy for wsbuild.

use std::path::PathBuf;

use super::flavor::Flavor;
use super::phase::Phase;

/// Errors reported by a container runtime facility.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("image not found: {image}")]
    ImageNotFound { image: String },

    #[error("container {container}: {message}")]
    Container { container: String, message: String },

    #[error("unexpected runtime response: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// wsbuild errors.
#[derive(Debug, thiserror::Error)]
pub enum WsbuildError {
    #[error("invalid flavor: {0} (expected one of all, minimal, light, full, gpu)")]
    InvalidFlavor(String),

    #[error("invalid version {version}: {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("build step {step} failed: {reason}")]
    BuildStepFailed {
        step: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("build of {flavor} flavor failed: {reason}")]
    BuildFailed {
        flavor: Flavor,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("docker image {image} not found for testing")]
    ImageNotFound { image: String },

    #[error("container runtime error in {container}: {message}")]
    ContainerRuntime {
        container: String,
        message: String,
        logs: Option<String>,
    },

    #[error("could not get IP address for container {container}")]
    MissingNetworkAddress { container: String },

    #[error("tests for {flavor} failed with exit code {exit_code}")]
    TestsFailed { flavor: Flavor, exit_code: i32 },

    #[error("failed to update version in {}: {reason}", path.display())]
    VersionRewrite { path: PathBuf, reason: String },

    #[error("release of {image} failed: {reason}")]
    ReleaseFailed {
        image: String,
        exit_code: Option<i32>,
        reason: String,
    },

    #[error("git error: {0}")]
    GitError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl WsbuildError {
    /// The pipeline phase this error is fatal to, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            WsbuildError::BuildStepFailed { .. } | WsbuildError::BuildFailed { .. } => {
                Some(Phase::Build)
            }
            WsbuildError::ImageNotFound { .. }
            | WsbuildError::ContainerRuntime { .. }
            | WsbuildError::MissingNetworkAddress { .. }
            | WsbuildError::TestsFailed { .. } => Some(Phase::Test),
            WsbuildError::VersionRewrite { .. } | WsbuildError::ReleaseFailed { .. } => {
                Some(Phase::Release)
            }
            _ => None,
        }
    }

    /// Whether this is an anticipated failure (missing artifact or a
    /// non-zero exit status) rather than a crash of a collaborator.
    pub fn is_expected(&self) -> bool {
        match self {
            WsbuildError::ImageNotFound { .. } | WsbuildError::TestsFailed { .. } => true,
            WsbuildError::BuildStepFailed { exit_code, .. }
            | WsbuildError::BuildFailed { exit_code, .. }
            | WsbuildError::ReleaseFailed { exit_code, .. } => exit_code.is_some(),
            _ => false,
        }
    }

    /// Whether rerunning the invocation could succeed without changes.
    /// wsbuild itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WsbuildError::MissingNetworkAddress { .. })
    }

    /// Container logs captured while diagnosing this error.
    pub fn container_logs(&self) -> Option<&str> {
        match self {
            WsbuildError::ContainerRuntime { logs, .. } => logs.as_deref(),
            _ => None,
        }
    }
}

/// Result type for wsbuild operations.
pub type Result<T> = std::result::Result<T, WsbuildError>;
