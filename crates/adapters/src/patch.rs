// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Safe application of literal patch text.
//!
//! Every target path is vetted before `git apply` runs: no absolute paths,
//! no parent-directory escapes, no symlinked components, nothing under a
//! forbidden glob.

use crate::git::{GitAdapter, GitError};
use crate::invoker::Invoker;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("patch touches invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("patch path {0} traverses a symlink")]
    Symlink(String),
    #[error("patch touches forbidden path {0}")]
    Scope(String),
    #[error("patch did not apply: {0}")]
    Apply(String),
    #[error("patch contains no target paths")]
    Empty,
}

/// Target paths named by a unified diff: `---`/`+++` headers (with the
/// `a/`/`b/` prefixes stripped) and rename directives. `/dev/null` is
/// skipped.
pub fn patch_target_paths(patch: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in patch.lines() {
        let candidate = if let Some(rest) = line.strip_prefix("+++ ") {
            strip_diff_prefix(rest)
        } else if let Some(rest) = line.strip_prefix("--- ") {
            strip_diff_prefix(rest)
        } else if let Some(rest) = line.strip_prefix("rename to ") {
            Some(rest.trim())
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            Some(rest.trim())
        } else {
            None
        };
        if let Some(path) = candidate {
            if !path.is_empty() && path != "/dev/null" {
                paths.push(path.to_string());
            }
        }
    }
    paths.sort();
    paths.dedup();
    paths
}

fn strip_diff_prefix(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed == "/dev/null" {
        return Some(trimmed);
    }
    Some(
        trimmed
            .strip_prefix("a/")
            .or_else(|| trimmed.strip_prefix("b/"))
            .unwrap_or(trimmed),
    )
}

/// Vet a single patch target path against the workspace.
fn check_path(
    repo_root: &Path,
    path: &str,
    forbidden: &(dyn Fn(&str) -> bool + Sync),
) -> Result<(), PatchError> {
    let as_path = Path::new(path);
    if as_path.is_absolute() {
        return Err(PatchError::InvalidPath {
            path: path.to_string(),
            reason: "absolute path".to_string(),
        });
    }
    for component in as_path.components() {
        match component {
            Component::ParentDir => {
                return Err(PatchError::InvalidPath {
                    path: path.to_string(),
                    reason: "parent-directory component".to_string(),
                });
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(PatchError::InvalidPath {
                    path: path.to_string(),
                    reason: "rooted component".to_string(),
                });
            }
            _ => {}
        }
    }
    if forbidden(path) {
        return Err(PatchError::Scope(path.to_string()));
    }

    // Reject symlinks anywhere along the existing portion of the path.
    let mut probe = repo_root.to_path_buf();
    for component in as_path.components() {
        probe.push(component);
        match std::fs::symlink_metadata(&probe) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(PatchError::Symlink(path.to_string()));
            }
            Ok(_) => {}
            Err(_) => break, // Path does not exist yet; nothing to traverse.
        }
    }
    Ok(())
}

/// Vet every target path, then apply the patch via `git apply`.
pub async fn apply_patch<I: Invoker>(
    git: &GitAdapter<I>,
    patch: &str,
    forbidden: &(dyn Fn(&str) -> bool + Sync),
) -> Result<Vec<String>, PatchError> {
    let paths = patch_target_paths(patch);
    if paths.is_empty() {
        return Err(PatchError::Empty);
    }
    for path in &paths {
        check_path(git.repo_root(), path, forbidden)?;
    }

    let tmp = temp_patch_path();
    std::fs::write(&tmp, patch).map_err(|e| PatchError::Apply(e.to_string()))?;
    let result = git.apply_patch_file(&tmp).await;
    let _ = std::fs::remove_file(&tmp);

    match result {
        Ok(()) => Ok(paths),
        Err(GitError::Command { stderr, .. }) => Err(PatchError::Apply(stderr)),
        Err(e) => Err(PatchError::Apply(e.to_string())),
    }
}

fn temp_patch_path() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("relais-patch-{}-{nanos}.diff", std::process::id()))
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
