//! Per-flavor requests and artifacts that flow between pipeline phases.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flavor::Flavor;

/// Revision recorded when the git revision cannot be resolved.
pub const UNKNOWN_REVISION: &str = "unknown";

/// Port the workspace listens on inside the test container.
pub const WORKSPACE_TEST_PORT: &str = "8080";

/// Ordered `--build-arg` set passed to the container build facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildArgs(Vec<(String, String)>);

impl BuildArgs {
    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    /// Look up a build argument by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Expand into `docker build` arguments.
    pub fn to_cli_args(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(k, v)| ["--build-arg".to_string(), format!("{k}={v}")])
            .collect()
    }
}

impl fmt::Display for BuildArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("--build-arg {k}={v}"))
            .collect();
        f.write_str(&rendered.join(" "))
    }
}

/// Everything needed to materialize one flavor's image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub flavor: Flavor,
    pub version: String,
    pub git_revision: String,
    pub build_date: String,
    pub image_name: String,
}

impl BuildRequest {
    pub fn new(
        flavor: Flavor,
        version: impl Into<String>,
        git_revision: impl Into<String>,
        built_at: DateTime<Utc>,
    ) -> Self {
        Self {
            flavor,
            version: version.into(),
            git_revision: git_revision.into(),
            build_date: format_build_date(built_at),
            image_name: flavor.image_name(),
        }
    }

    /// Fixed build-argument set: revision, date, flavor, version.
    pub fn build_args(&self) -> BuildArgs {
        BuildArgs(vec![
            ("ARG_VCS_REF".to_string(), self.git_revision.clone()),
            ("ARG_BUILD_DATE".to_string(), self.build_date.clone()),
            (
                "ARG_WORKSPACE_FLAVOR".to_string(),
                self.flavor.name().to_string(),
            ),
            ("ARG_WORKSPACE_VERSION".to_string(), self.version.clone()),
        ])
    }
}

/// ISO-8601 UTC timestamp with microseconds and a trailing `Z`.
pub fn format_build_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// A flavor image that later phases may test or release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltImage {
    pub flavor: Flavor,
    pub name: String,
    pub version: String,

    /// False when the make phase was disabled and the image is expected to
    /// exist from an earlier invocation.
    pub materialized: bool,
}

impl BuiltImage {
    /// `name:version` reference.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// Record of one ephemeral test container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSession {
    pub container_name: String,
    pub port: String,
    pub ip_address: Option<String>,
    pub exit_code: Option<i32>,
}

impl TestSession {
    pub fn for_flavor(flavor: Flavor) -> Self {
        Self {
            container_name: flavor.test_container_name(),
            port: WORKSPACE_TEST_PORT.to_string(),
            ip_address: None,
            exit_code: None,
        }
    }
}

/// Inputs of one release step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub previous_version: Option<String>,
    pub new_version: String,
    pub files: Vec<PathBuf>,
    pub image_name: String,
    pub registry_prefix: String,
}

impl ReleaseRequest {
    /// Whether the version files need rewriting before publishing.
    pub fn needs_rewrite(&self) -> bool {
        matches!(&self.previous_version, Some(prev) if !prev.is_empty() && *prev != self.new_version)
    }

    /// Registry reference the image is published under.
    pub fn remote_reference(&self) -> String {
        format!(
            "{}{}:{}",
            self.registry_prefix, self.image_name, self.new_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 45).unwrap()
    }

    #[test]
    fn test_build_date_has_trailing_z() {
        let date = format_build_date(fixed_time());
        assert_eq!(date, "2024-03-01T12:30:45.000000Z");
    }

    #[test]
    fn test_build_args_fixed_set_and_order() {
        let request = BuildRequest::new(Flavor::Minimal, "1.3.0", "abc1234", fixed_time());
        let build_args = request.build_args();
        let keys: Vec<&str> = build_args
            .pairs()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(
            keys,
            vec![
                "ARG_VCS_REF",
                "ARG_BUILD_DATE",
                "ARG_WORKSPACE_FLAVOR",
                "ARG_WORKSPACE_VERSION"
            ]
        );
        let args = request.build_args();
        assert_eq!(args.get("ARG_WORKSPACE_FLAVOR"), Some("minimal"));
        assert_eq!(args.get("ARG_WORKSPACE_VERSION"), Some("1.3.0"));
        assert_eq!(request.image_name, "ml-workspace-minimal");
    }

    #[test]
    fn test_build_args_rendering() {
        let request = BuildRequest::new(Flavor::Full, "2.0.0", UNKNOWN_REVISION, fixed_time());
        let args = request.build_args();
        assert!(args
            .to_string()
            .starts_with("--build-arg ARG_VCS_REF=unknown --build-arg ARG_BUILD_DATE="));
        let cli = args.to_cli_args();
        assert_eq!(cli.len(), 8);
        assert_eq!(cli[0], "--build-arg");
        assert_eq!(cli[7], "ARG_WORKSPACE_VERSION=2.0.0");
    }

    #[test]
    fn test_release_request_rewrite_decision() {
        let mut request = ReleaseRequest {
            previous_version: Some("1.2.0".to_string()),
            new_version: "1.3.0".to_string(),
            files: vec![],
            image_name: "ml-workspace".to_string(),
            registry_prefix: "khulnasoft/".to_string(),
        };
        assert!(request.needs_rewrite());
        assert_eq!(request.remote_reference(), "khulnasoft/ml-workspace:1.3.0");

        request.previous_version = None;
        assert!(!request.needs_rewrite());

        request.previous_version = Some("1.3.0".to_string());
        assert!(!request.needs_rewrite());
    }

    #[test]
    fn test_session_record_for_flavor() {
        let session = TestSession::for_flavor(Flavor::Gpu);
        assert_eq!(session.container_name, "workspace-test-gpu");
        assert_eq!(session.port, "8080");
        assert!(session.ip_address.is_none());
    }
}
