//! In-place version token rewriting for documentation and deployment files.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Result, WsbuildError};

/// Per-file outcome of a rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRewrite {
    pub path: PathBuf,
    pub replacements: usize,
}

/// Replace every exact occurrence of `previous` with `next` in each file.
///
/// Matching is plain substring matching. Every file is read before any is
/// written, so an unreadable file leaves all of them untouched. Each write
/// goes through a temporary file in the same directory and a rename. Files
/// without an occurrence are left as they are.
pub fn rewrite_version_in_files(
    paths: &[PathBuf],
    previous: &str,
    next: &str,
) -> Result<Vec<FileRewrite>> {
    if previous.is_empty() {
        return Err(WsbuildError::VersionRewrite {
            path: paths.first().cloned().unwrap_or_default(),
            reason: "previous version token is empty".to_string(),
        });
    }

    let mut pending = Vec::with_capacity(paths.len());
    for path in paths {
        let content = fs::read_to_string(path).map_err(|e| rewrite_err(path, e))?;
        let replacements = content.matches(previous).count();
        pending.push((path, content, replacements));
    }

    let mut results = Vec::with_capacity(pending.len());
    for (path, content, replacements) in pending {
        if replacements > 0 {
            let updated = content.replace(previous, next);
            write_atomic(path, &updated).map_err(|e| rewrite_err(path, e))?;
        }
        debug!(path = %path.display(), replacements, "Rewrote version token");
        results.push(FileRewrite {
            path: path.clone(),
            replacements,
        });
    }
    Ok(results)
}

fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)?.permissions();
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), permissions)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn rewrite_err(path: &Path, e: std::io::Error) -> WsbuildError {
    WsbuildError::VersionRewrite {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
