// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scope and diff policy: glob matching, lockfile detection, ordered
//! violation rules, and limit checks.

use glob::{MatchOptions, Pattern};
use relais_adapters::DiffAnalysis;
use relais_core::{ScopeOutcome, ScopeViolation, ScopeViolationKind, TaskDiffLimits, TaskScope};

/// Bash-like matching: `*` stays within one path component, `**` crosses.
fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Whether any pattern matches `path`. An empty pattern list matches
/// nothing. Invalid patterns are skipped.
pub fn matches_glob(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|raw| {
        Pattern::new(raw)
            .map(|pattern| pattern.matches_with(path, match_options()))
            .unwrap_or(false)
    })
}

/// Whether `path` names a lockfile. Bare names match by suffix equality;
/// entries with glob metacharacters or separators are glob-matched.
pub fn is_lockfile(path: &str, lockfiles: &[String]) -> bool {
    lockfiles.iter().any(|entry| {
        let is_pattern = entry.contains(['*', '?', '[']) || entry.contains('/');
        if is_pattern {
            matches_glob(path, std::slice::from_ref(entry))
        } else {
            path == entry || path.ends_with(&format!("/{entry}"))
        }
    })
}

/// Check every touched path against the task scope, in rule order:
/// forbidden, outside-allowed, new-file-forbidden, lockfile-change-forbidden.
/// A forbidden match stops further checks for that path.
pub fn check_scope(
    touched: &[String],
    untracked: &[String],
    scope: &TaskScope,
    lockfiles: &[String],
) -> ScopeOutcome {
    let mut violations = Vec::new();
    for path in touched {
        if matches_glob(path, &scope.forbidden_globs) {
            violations.push(ScopeViolation {
                path: path.clone(),
                kind: ScopeViolationKind::Forbidden,
            });
            continue;
        }
        if !scope.allowed_globs.is_empty() && !matches_glob(path, &scope.allowed_globs) {
            violations.push(ScopeViolation {
                path: path.clone(),
                kind: ScopeViolationKind::OutsideAllowed,
            });
        }
        if !scope.allow_new_files && untracked.iter().any(|u| u == path) {
            violations.push(ScopeViolation {
                path: path.clone(),
                kind: ScopeViolationKind::NewFileForbidden,
            });
        }
        if !scope.allow_lockfile_changes && is_lockfile(path, lockfiles) {
            violations.push(ScopeViolation {
                path: path.clone(),
                kind: ScopeViolationKind::LockfileChangeForbidden,
            });
        }
    }
    ScopeOutcome {
        ok: violations.is_empty(),
        violations,
        touched_paths: touched.to_vec(),
    }
}

/// Check the analysis against the diff limits. Passing exactly at the
/// boundary is legal; every exceeded dimension is reported.
pub fn check_diff_limits(analysis: &DiffAnalysis, limits: &TaskDiffLimits) -> Result<(), String> {
    let mut violations = Vec::new();
    if analysis.files_touched() > limits.max_files {
        violations.push(format!(
            "files touched {} exceeds max {}",
            analysis.files_touched(),
            limits.max_files
        ));
    }
    if analysis.lines_changed() > limits.max_lines as u64 {
        violations.push(format!(
            "lines changed {} exceeds max {}",
            analysis.lines_changed(),
            limits.max_lines
        ));
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations.join("; "))
    }
}

/// HEAD must not move during a tick.
pub fn check_head_moved(expected: &str, actual: &str) -> bool {
    expected != actual
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
