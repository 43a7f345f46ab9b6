// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preflight gate, run on every tick entry and as the loop's cheap
//! pre-check. Checks run in a fixed order and the first failure decides
//! the verdict. Everything here is fail-closed: an unsafe cleanup glob
//! deletes nothing.

use crate::scope::matches_glob;
use relais_adapters::{GitAdapter, Invoker};
use relais_core::{Config, ReportCode};
use relais_storage::{
    cleanup_temp, glob_safe, read_json, GlobSafety, LockError, StateStore, WorkspaceLock,
    WorkspacePaths,
};
use tracing::{debug, warn};

/// Outcome of the preflight gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightOutcome {
    pub ok: bool,
    pub blocked_code: Option<ReportCode>,
    pub blocked_reason: Option<String>,
    pub warnings: Vec<String>,
    /// HEAD at preflight time; captured only once the workspace checks pass.
    pub base_commit: Option<String>,
}

impl PreflightOutcome {
    fn blocked(code: ReportCode, reason: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            ok: false,
            blocked_code: Some(code),
            blocked_reason: Some(reason.into()),
            warnings,
            base_commit: None,
        }
    }
}

/// Run the gate. `assume_locked` skips the lock probe when the caller
/// already holds the workspace lock (the tick machine acquires it in the
/// LOCK phase, before preflight).
pub async fn run_preflight<I: Invoker>(
    config: &Config,
    git: &GitAdapter<I>,
    paths: &WorkspacePaths,
    assume_locked: bool,
) -> PreflightOutcome {
    let mut warnings = Vec::new();

    // (2) The crash-cleanup glob must be provably workspace-local before
    // anything gets deleted.
    let delete_glob = &config.runner.crash_cleanup.delete_tmp_glob;
    if let GlobSafety::Unsafe(reason) = glob_safe(delete_glob) {
        return PreflightOutcome::blocked(
            ReportCode::BlockedCrashRecoveryRequired,
            format!("crash-cleanup glob {delete_glob:?} is unsafe: {reason}; nothing was deleted"),
            warnings,
        );
    }

    // (3) Must be inside a git repository.
    if config.runner.require_git && !git.inside_repo().await {
        return PreflightOutcome::blocked(
            ReportCode::BlockedMissingConfig,
            format!("{} is not inside a git repository", git.repo_root().display()),
            warnings,
        );
    }

    // (4) Worktree clean, ignoring runner-owned paths.
    let runner_owned = &config.runner.runner_owned_globs;
    match git.is_clean(|path| matches_glob(path, runner_owned)).await {
        Ok((true, _)) => {}
        Ok((false, dirty)) => {
            return PreflightOutcome::blocked(
                ReportCode::BlockedDirtyWorktree,
                format!("worktree has uncommitted changes: {}", dirty.join(", ")),
                warnings,
            );
        }
        Err(e) => {
            return PreflightOutcome::blocked(
                ReportCode::BlockedMissingConfig,
                format!("cannot inspect worktree: {e}"),
                warnings,
            );
        }
    }

    // (5) Crash recovery: sweep temp files, then prove the runner-owned
    // JSON artifacts still parse.
    let suffix = temp_suffix(delete_glob);
    let failed = cleanup_temp(paths.root(), &suffix);
    for path in &failed {
        warnings.push(format!("could not remove temp file {}", path.display()));
    }
    if config.runner.crash_cleanup.validate_runner_json {
        for path in paths.runner_json_files() {
            if !path.exists() {
                continue;
            }
            if let Err(e) = read_json::<serde_json::Value>(&path) {
                return PreflightOutcome::blocked(
                    ReportCode::BlockedCrashRecoveryRequired,
                    format!("runner-owned file is corrupt: {e}"),
                    warnings,
                );
            }
        }
    }

    // Base commit is captured after the workspace checks and before any
    // expensive work.
    let base_commit = match git.head().await {
        Ok(head) => head,
        Err(e) => {
            return PreflightOutcome::blocked(
                ReportCode::BlockedMissingConfig,
                format!("cannot resolve HEAD: {e}"),
                warnings,
            );
        }
    };

    // (6) Lock must be acquirable (probe-and-release) unless already held.
    if !assume_locked {
        match WorkspaceLock::acquire(&paths.lock()) {
            Ok(lock) => lock.release(),
            Err(LockError::Held { pid }) => {
                return PreflightOutcome::blocked(
                    ReportCode::BlockedLockHeld,
                    format!("workspace lock held by pid {pid}"),
                    warnings,
                );
            }
            Err(LockError::Corrupt(path)) => {
                return PreflightOutcome::blocked(
                    ReportCode::BlockedLockHeld,
                    format!("workspace lock at {} is held but unreadable", path.display()),
                    warnings,
                );
            }
            Err(LockError::Io { path, source }) => {
                return PreflightOutcome::blocked(
                    ReportCode::BlockedLockHeld,
                    format!("cannot probe lock {}: {source}", path.display()),
                    warnings,
                );
            }
        }
    }

    // (7) Budget caps.
    let state = match StateStore::new(paths.clone()).load() {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "workspace state unreadable at preflight");
            return PreflightOutcome::blocked(
                ReportCode::BlockedCrashRecoveryRequired,
                format!("workspace state unreadable: {e}"),
                warnings,
            );
        }
    };
    if let Some(dimension) = config.budgets.exceeded_dimension(&state.budgets) {
        return PreflightOutcome::blocked(
            ReportCode::BlockedBudgetCap,
            format!("budget cap reached for {dimension}"),
            warnings,
        );
    }

    debug!(base = %base_commit, "preflight passed");
    PreflightOutcome {
        ok: true,
        blocked_code: None,
        blocked_reason: None,
        warnings,
        base_commit: Some(base_commit),
    }
}

/// Suffix swept by cleanup, derived from the configured glob
/// (`*.tmp` → `.tmp`).
fn temp_suffix(pattern: &str) -> String {
    match pattern.rsplit('*').next() {
        Some(suffix) if !suffix.is_empty() => suffix.to_string(),
        _ => ".tmp".to_string(),
    }
}

#[cfg(test)]
#[path = "preflight_tests.rs"]
mod tests;
