//! Immutable pipeline configuration.
//!
//! A `PipelineConfig` is assembled once (by the CLI) and passed by reference
//! into every component entry point.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Result, WsbuildError};

/// Registry prefix used when none is configured.
pub const DEFAULT_IMAGE_PREFIX: &str = "khulnasoft/";

/// Command executed inside the test container.
pub const DEFAULT_TEST_COMMAND: &[&str] = &["pytest", "/resources/tests"];

/// Files whose previous version token is rewritten on release, relative to
/// the project root.
pub const VERSION_FILES: &[&str] = &["README.md", "deployment/google-cloud-run/Dockerfile"];

/// Which flavors the test and release phases act on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseScope {
    /// Test and release every flavor right after it is built.
    #[default]
    PerFlavor,

    /// Build every flavor first, then test and release only the last one.
    LastFlavor,
}

/// What to do with the remaining flavors after a fatal outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole run at the first fatal outcome.
    #[default]
    AbortRun,

    /// Skip the failing flavor's remaining phases and go on with the next
    /// flavor. The run still reports failure.
    ContinueWithNextFlavor,
}

/// Phase toggles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PhaseToggles {
    pub make: bool,
    pub test: bool,
    pub release: bool,
}

/// Configuration for one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Version of the images being built, validated as semver.
    pub version: String,

    pub phases: PhaseToggles,

    /// Registry prefix for released images, e.g. `khulnasoft/`.
    pub docker_image_prefix: String,

    /// Directory holding the flavor build contexts and the version files.
    pub project_root: PathBuf,

    /// Test command run inside the test container.
    pub test_command: Vec<String>,

    pub phase_scope: PhaseScope,
    pub failure_policy: FailurePolicy,
}

impl PipelineConfig {
    /// Create a configuration with defaults for everything but the version.
    pub fn new(version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        validate_version(&version)?;
        Ok(Self {
            version,
            phases: PhaseToggles::default(),
            docker_image_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            project_root: PathBuf::from("."),
            test_command: DEFAULT_TEST_COMMAND.iter().map(|s| s.to_string()).collect(),
            phase_scope: PhaseScope::default(),
            failure_policy: FailurePolicy::default(),
        })
    }

    pub fn with_phases(mut self, make: bool, test: bool, release: bool) -> Self {
        self.phases = PhaseToggles {
            make,
            test,
            release,
        };
        self
    }

    /// Set the registry prefix; an empty prefix falls back to the default.
    pub fn with_image_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.docker_image_prefix = if prefix.trim().is_empty() {
            DEFAULT_IMAGE_PREFIX.to_string()
        } else {
            prefix
        };
        self
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    pub fn with_test_command(mut self, command: Vec<String>) -> Self {
        self.test_command = command;
        self
    }

    pub fn with_phase_scope(mut self, scope: PhaseScope) -> Self {
        self.phase_scope = scope;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Absolute-or-relative paths of the version files under the project root.
    pub fn version_files(&self) -> Vec<PathBuf> {
        VERSION_FILES
            .iter()
            .map(|rel| self.project_root.join(rel))
            .collect()
    }

    /// Directory of a build-tool step under the project root.
    pub fn step_dir(&self, step: &str) -> PathBuf {
        self.project_root.join(step)
    }

    pub fn root(&self) -> &Path {
        &self.project_root
    }
}

/// Check that a version string is valid semver.
pub fn validate_version(version: &str) -> Result<semver::Version> {
    semver::Version::parse(version).map_err(|e| WsbuildError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })
}

/// Whether the version is a stable (non-prerelease) release.
pub fn is_stable_version(version: &str) -> bool {
    semver::Version::parse(version)
        .map(|v| v.pre.is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_config_defaults() {
        let config = PipelineConfig::new("1.3.0").unwrap();
        assert_eq!(config.docker_image_prefix, "khulnasoft/");
        assert_eq!(config.test_command, vec!["pytest", "/resources/tests"]);
        assert_eq!(config.phase_scope, PhaseScope::PerFlavor);
        assert_eq!(config.failure_policy, FailurePolicy::AbortRun);
        assert!(!config.phases.make && !config.phases.test && !config.phases.release);
    }

    #[test]
    fn test_invalid_version_rejected() {
        let err = PipelineConfig::new("latest").unwrap_err();
        assert!(matches!(err, WsbuildError::InvalidVersion { .. }));
    }

    #[test]
    fn test_empty_prefix_falls_back_to_default() {
        let config = PipelineConfig::new("1.0.0")
            .unwrap()
            .with_image_prefix("  ");
        assert_eq!(config.docker_image_prefix, DEFAULT_IMAGE_PREFIX);

        let config = PipelineConfig::new("1.0.0")
            .unwrap()
            .with_image_prefix("ghcr.io/acme/");
        assert_eq!(config.docker_image_prefix, "ghcr.io/acme/");
    }

    #[test]
    fn test_version_files_are_rooted() {
        let config = PipelineConfig::new("1.0.0")
            .unwrap()
            .with_project_root("/work");
        let files = config.version_files();
        assert_eq!(files[0], PathBuf::from("/work/README.md"));
        assert_eq!(
            files[1],
            PathBuf::from("/work/deployment/google-cloud-run/Dockerfile")
        );
    }

    #[test]
    fn test_stable_version_detection() {
        assert!(is_stable_version("1.3.0"));
        assert!(!is_stable_version("1.3.0-dev.1"));
        assert!(!is_stable_version("not-a-version"));
    }
}
