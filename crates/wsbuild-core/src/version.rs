//! Release version resolution.
//!
//! The new version comes from configuration; the previously published one is
//! the most recent git tag reachable from HEAD.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{validate_version, PipelineConfig};
use crate::domain::{Result, WsbuildError};
use crate::facilities::VersionSource;

/// Versions involved in one release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVersions {
    pub current: String,
    pub previous: Option<String>,
}

/// Resolve the configured version and the previously published one.
pub async fn resolve_versions(
    config: &PipelineConfig,
    source: &dyn VersionSource,
) -> Result<ResolvedVersions> {
    validate_version(&config.version)?;
    let previous = source
        .latest_version()
        .await?
        .map(|tag| normalize_tag(&tag))
        .filter(|tag| !tag.is_empty());
    Ok(ResolvedVersions {
        current: config.version.clone(),
        previous,
    })
}

/// Strip a leading `v` from tags such as `v1.2.0`.
pub fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim();
    match tag.strip_prefix('v') {
        Some(rest) if semver::Version::parse(rest).is_ok() => rest.to_string(),
        _ => tag.to_string(),
    }
}

/// `git describe` pinned to the C locale so its "no tags" message can be matched.
fn describe_command(repo_dir: &Path) -> Command {
    let mut command = Command::new("git");
    command
        .args(["describe", "--tags", "--abbrev=0"])
        .env("LC_ALL", "C")
        .current_dir(repo_dir);
    command
}

/// Most recent tag reachable from HEAD, or `None` when the repository has no tags.
pub fn describe_latest_tag(repo_dir: &Path) -> Result<Option<String>> {
    let output = describe_command(repo_dir)
        .output()
        .map_err(|e| WsbuildError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("No names found") || stderr.contains("cannot describe anything") {
            return Ok(None);
        }
        return Err(WsbuildError::GitError(format!(
            "git describe --tags failed: {}",
            stderr.trim()
        )));
    }

    let tag = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if tag.is_empty() {
        return Ok(None);
    }
    Ok(Some(normalize_tag(&tag)))
}

/// `VersionSource` backed by git tags.
#[derive(Debug, Clone)]
pub struct GitTagVersions {
    repo_dir: PathBuf,
}

impl GitTagVersions {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

#[async_trait]
impl VersionSource for GitTagVersions {
    async fn latest_version(&self) -> Result<Option<String>> {
        let dir = self.repo_dir.clone();
        tokio::task::spawn_blocking(move || describe_latest_tag(&dir))
            .await
            .map_err(|e| WsbuildError::GitError(format!("tag lookup panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::StaticVersionSource;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {:?} failed", args);
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("v1.2.0"), "1.2.0");
        assert_eq!(normalize_tag("1.2.0\n"), "1.2.0");
        assert_eq!(normalize_tag("vintage"), "vintage");
    }

    #[test]
    fn test_no_tags_means_no_previous_version() {
        let repo = make_git_repo();
        assert_eq!(describe_latest_tag(repo.path()).unwrap(), None);
    }

    #[test]
    fn test_describe_runs_in_c_locale() {
        let command = describe_command(Path::new("."));
        let lc_all = command
            .get_envs()
            .find(|(key, _)| key.to_str() == Some("LC_ALL"))
            .and_then(|(_, value)| value);
        assert_eq!(lc_all, Some(std::ffi::OsStr::new("C")));
    }

    #[test]
    fn test_latest_tag_is_found() {
        let repo = make_git_repo();
        run_git(repo.path(), &["tag", "v1.2.0"]);
        assert_eq!(
            describe_latest_tag(repo.path()).unwrap(),
            Some("1.2.0".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolve_versions_combines_config_and_source() {
        let config = PipelineConfig::new("1.3.0").unwrap();
        let source = StaticVersionSource::new(Some("1.2.0"));
        let versions = resolve_versions(&config, &source).await.unwrap();
        assert_eq!(versions.current, "1.3.0");
        assert_eq!(versions.previous.as_deref(), Some("1.2.0"));
    }
}
