//! Git integration for build metadata.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{Result, WsbuildError, UNKNOWN_REVISION};
use crate::facilities::RevisionSource;

/// Capture the short HEAD revision of a git repository.
///
/// Runs `git rev-parse --short HEAD` in the given directory. Returns an error
/// if the directory is not inside a git repository or if git is not available.
pub fn capture_head_revision(repo_dir: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .current_dir(repo_dir)
        .output()
        .map_err(|e| WsbuildError::GitError(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(WsbuildError::GitError(format!(
            "git rev-parse HEAD failed: {stderr}"
        )));
    }

    let rev = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if rev.is_empty() {
        return Err(WsbuildError::GitError(
            "git rev-parse HEAD returned empty output".to_string(),
        ));
    }

    Ok(rev)
}

/// Resolve the revision for build metadata, degrading to `unknown`.
///
/// Lookup failures are logged and never abort the build.
pub async fn resolve_revision(source: &dyn RevisionSource) -> String {
    match source.head_revision().await {
        Ok(rev) => rev,
        Err(e) => {
            warn!(error = %e, "Could not get git revision, using fallback");
            UNKNOWN_REVISION.to_string()
        }
    }
}

/// `RevisionSource` backed by the system `git` binary.
#[derive(Debug, Clone)]
pub struct GitRevision {
    repo_dir: PathBuf,
}

impl GitRevision {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }
}

#[async_trait]
impl RevisionSource for GitRevision {
    async fn head_revision(&self) -> Result<String> {
        let dir = self.repo_dir.clone();
        tokio::task::spawn_blocking(move || capture_head_revision(&dir))
            .await
            .map_err(|e| WsbuildError::GitError(format!("revision lookup panicked: {e}")))?
    }
}
