// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Git adapter: argv-only invocations, no shell.
//!
//! Porcelain and numstat parsing are pure functions so they can be table
//! tested without a repository.

use crate::invoker::{InvokeError, Invoker, InvokerRequest};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default timeout for git operations.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GitError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error("git {args:?} failed with {exit:?}: {stderr}")]
    Command {
        args: Vec<String>,
        exit: Option<i32>,
        stderr: String,
    },
    #[error("git {args:?} timed out")]
    Timeout { args: Vec<String> },
    #[error("unparseable git output: {0}")]
    Parse(String),
    #[error("worktree io error: {0}")]
    Io(String),
}

/// Union of tracked and untracked changes relative to a base commit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiffAnalysis {
    /// Every touched path (tracked + untracked), sorted, deduplicated.
    pub files: Vec<String>,
    /// The subset of `files` that is untracked (new).
    pub untracked: Vec<String>,
    pub lines_added: u64,
    pub lines_deleted: u64,
}

impl DiffAnalysis {
    pub fn files_touched(&self) -> u32 {
        self.files.len() as u32
    }

    pub fn new_files(&self) -> u32 {
        self.untracked.len() as u32
    }

    pub fn lines_changed(&self) -> u64 {
        self.lines_added + self.lines_deleted
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Git operations scoped to one repository.
pub struct GitAdapter<I> {
    invoker: I,
    repo_root: PathBuf,
    timeout: Duration,
}

impl<I: Invoker> GitAdapter<I> {
    pub fn new(invoker: I, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            invoker,
            repo_root: repo_root.into(),
            timeout: GIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let args_vec: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let request = InvokerRequest::new("git", args_vec.clone(), self.timeout)
            .with_cwd(&self.repo_root);
        let output = self.invoker.invoke(request).await?;
        if output.timed_out {
            return Err(GitError::Timeout { args: args_vec });
        }
        if output.exit_code != Some(0) {
            return Err(GitError::Command {
                args: args_vec,
                exit: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Current HEAD commit id.
    pub async fn head(&self) -> Result<String, GitError> {
        let out = self.run(&["rev-parse", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// Current branch name (`HEAD` when detached).
    pub async fn current_branch(&self) -> Result<String, GitError> {
        let out = self.run(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// Whether the repo root is inside a git work tree.
    pub async fn inside_repo(&self) -> bool {
        matches!(
            self.run(&["rev-parse", "--is-inside-work-tree"]).await,
            Ok(out) if out.trim() == "true"
        )
    }

    /// Worktree cleanliness, ignoring entries accepted by `ignored`.
    ///
    /// Returns `(clean, dirty_paths)` where `dirty_paths` are the entries
    /// that did NOT match the ignore predicate.
    pub async fn is_clean(
        &self,
        ignored: impl Fn(&str) -> bool,
    ) -> Result<(bool, Vec<String>), GitError> {
        let out = self.run(&["status", "--porcelain"]).await?;
        let dirty: Vec<String> = parse_porcelain(&out)
            .into_iter()
            .map(|(_, path)| path)
            .filter(|path| !ignored(path))
            .collect();
        Ok((dirty.is_empty(), dirty))
    }

    /// No uncommitted changes and no untracked files at all.
    pub async fn verify_clean(&self) -> Result<bool, GitError> {
        let out = self.run(&["status", "--porcelain"]).await?;
        Ok(out.trim().is_empty())
    }

    /// Tracked paths changed between `base` and the worktree.
    /// Renames report the destination path.
    pub async fn touched_tracked(&self, base: &str) -> Result<Vec<String>, GitError> {
        let out = self.run(&["diff", "--name-status", "-M", base]).await?;
        Ok(parse_name_status(&out))
    }

    /// Untracked (and newly added) paths from porcelain status.
    pub async fn touched_untracked(&self) -> Result<Vec<String>, GitError> {
        let out = self.run(&["status", "--porcelain"]).await?;
        Ok(parse_porcelain(&out)
            .into_iter()
            .filter(|(status, _)| status == "??" || status.starts_with('A'))
            .map(|(_, path)| path)
            .collect())
    }

    /// Added/deleted line counts per tracked file against `base`.
    /// Binary files contribute zero.
    pub async fn numstat(&self, base: &str) -> Result<Vec<(u64, u64, String)>, GitError> {
        let out = self.run(&["diff", "--numstat", "-M", base]).await?;
        parse_numstat(&out)
    }

    /// Full diff analysis against `base`: tracked + untracked union with
    /// line totals. Untracked text files count their lines as additions.
    pub async fn analyze(&self, base: &str) -> Result<DiffAnalysis, GitError> {
        let tracked = self.touched_tracked(base).await?;
        let mut untracked = self.touched_untracked().await?;
        untracked.sort();
        untracked.dedup();

        let mut lines_added = 0u64;
        let mut lines_deleted = 0u64;
        for (added, deleted, _path) in self.numstat(base).await? {
            lines_added += added;
            lines_deleted += deleted;
        }
        for path in &untracked {
            lines_added += count_text_lines(&self.repo_root.join(path));
        }

        let mut files: Vec<String> = tracked;
        files.extend(untracked.iter().cloned());
        files.sort();
        files.dedup();

        debug!(
            files = files.len(),
            lines_added, lines_deleted, "diff analyzed"
        );
        Ok(DiffAnalysis {
            files,
            untracked,
            lines_added,
            lines_deleted,
        })
    }

    /// Hard-reset the worktree to `commit`.
    pub async fn reset_hard(&self, commit: &str) -> Result<(), GitError> {
        self.run(&["reset", "--hard", commit]).await?;
        Ok(())
    }

    /// Remove untracked files by path, tolerating already-missing entries.
    pub fn remove_untracked(&self, paths: &[String]) -> Result<(), GitError> {
        for path in paths {
            let full = self.repo_root.join(path);
            match std::fs::remove_file(&full) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(GitError::Io(format!(
                        "failed to remove untracked {}: {}",
                        full.display(),
                        e
                    )));
                }
            }
        }
        Ok(())
    }

    /// Create the branch at the current HEAD, or reset it there if it
    /// already exists, and switch to it.
    pub async fn create_or_switch_branch(&self, name: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-B", name]).await?;
        Ok(())
    }

    /// Apply a patch file to the worktree.
    pub async fn apply_patch_file(&self, patch_path: &Path) -> Result<(), GitError> {
        let path = patch_path.display().to_string();
        self.run(&["apply", "--whitespace=nowarn", &path]).await?;
        Ok(())
    }
}

/// Parse `git status --porcelain` output into (status, path) pairs.
/// Rename entries report the destination path.
pub(crate) fn parse_porcelain(out: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for line in out.lines() {
        if line.len() < 4 {
            continue;
        }
        let status = line[..2].to_string();
        let rest = line[3..].trim();
        let path = match rest.split_once(" -> ") {
            Some((_, destination)) => destination,
            None => rest,
        };
        entries.push((status, unquote(path)));
    }
    entries
}

/// Parse `git diff --name-status` output into touched paths.
/// `R`/`C` entries report the destination column.
pub(crate) fn parse_name_status(out: &str) -> Vec<String> {
    let mut paths = Vec::new();
    for line in out.lines() {
        let mut cols = line.split('\t');
        let Some(status) = cols.next() else { continue };
        let path = if status.starts_with('R') || status.starts_with('C') {
            cols.nth(1)
        } else {
            cols.next()
        };
        if let Some(path) = path {
            paths.push(unquote(path.trim()));
        }
    }
    paths
}

/// Parse `git diff --numstat` output. `-`/`-` (binary) contributes (0, 0).
pub(crate) fn parse_numstat(out: &str) -> Result<Vec<(u64, u64, String)>, GitError> {
    let mut stats = Vec::new();
    for line in out.lines() {
        let mut cols = line.split('\t');
        let (Some(added), Some(deleted), Some(path)) = (cols.next(), cols.next(), cols.next())
        else {
            continue;
        };
        let parse = |s: &str| -> Result<u64, GitError> {
            if s == "-" {
                Ok(0)
            } else {
                s.parse()
                    .map_err(|_| GitError::Parse(format!("bad numstat column {s:?}")))
            }
        };
        stats.push((
            parse(added)?,
            parse(deleted)?,
            resolve_numstat_path(path.trim()),
        ));
    }
    Ok(stats)
}

/// Resolve numstat rename notation to the destination path:
/// `old => new`, `dir/{old => new}/file`.
pub(crate) fn resolve_numstat_path(path: &str) -> String {
    if let (Some(open), Some(close)) = (path.find('{'), path.find('}')) {
        if open < close {
            let inner = &path[open + 1..close];
            let to = inner.split(" => ").nth(1).unwrap_or(inner);
            let mut resolved = format!("{}{}{}", &path[..open], to, &path[close + 1..]);
            resolved = resolved.replace("//", "/");
            return unquote(&resolved);
        }
    }
    match path.split_once(" => ") {
        Some((_, to)) => unquote(to),
        None => unquote(path),
    }
}

/// Strip the quoting git applies to paths with special characters.
fn unquote(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        trimmed.to_string()
    }
}

/// Line count of a text file; binary or unreadable files count zero.
fn count_text_lines(path: &Path) -> u64 {
    match std::fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(text) => text.lines().count() as u64,
            Err(_) => 0,
        },
        Err(_) => 0,
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
