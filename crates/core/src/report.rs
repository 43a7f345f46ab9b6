// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Canonical tick outcome records: REPORT.json and BLOCKED.json shapes.

use crate::{BudgetCaps, BudgetCounts, ReportCode, RunId, Verdict};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantitative summary of a builder's diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlastRadius {
    pub files_touched: u32,
    pub lines_added: u64,
    pub lines_deleted: u64,
    pub new_files: u32,
}

/// Why a touched path violated the task scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeViolationKind {
    Forbidden,
    OutsideAllowed,
    NewFileForbidden,
    LockfileChangeForbidden,
}

impl fmt::Display for ScopeViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeViolationKind::Forbidden => write!(f, "forbidden"),
            ScopeViolationKind::OutsideAllowed => write!(f, "outside_allowed"),
            ScopeViolationKind::NewFileForbidden => write!(f, "new_file_forbidden"),
            ScopeViolationKind::LockfileChangeForbidden => {
                write!(f, "lockfile_change_forbidden")
            }
        }
    }
}

/// One scope violation for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeViolation {
    pub path: String,
    pub kind: ScopeViolationKind,
}

/// Outcome of the scope check over the tick's diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ScopeOutcome {
    pub ok: bool,
    #[serde(default)]
    pub violations: Vec<ScopeViolation>,
    #[serde(default)]
    pub touched_paths: Vec<String>,
}

impl ScopeOutcome {
    pub fn clean(touched_paths: Vec<String>) -> Self {
        Self {
            ok: true,
            violations: Vec::new(),
            touched_paths,
        }
    }
}

/// Diff summary carried by the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiffSummary {
    #[serde(default)]
    pub files_changed: Vec<String>,
    pub lines_changed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_path: Option<String>,
}

/// Which verification phase a template ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyPhase {
    Fast,
    Slow,
}

impl fmt::Display for VerifyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyPhase::Fast => write!(f, "fast"),
            VerifyPhase::Slow => write!(f, "slow"),
        }
    }
}

/// One executed verification template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRunRecord {
    pub template_id: String,
    pub phase: VerifyPhase,
    pub cmd: String,
    pub args_template: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl VerifyRunRecord {
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Verification section of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySummary {
    /// Always `"argv_no_shell"`.
    pub exec_mode: String,
    #[serde(default)]
    pub runs: Vec<VerifyRunRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
}

impl Default for VerifySummary {
    fn default() -> Self {
        Self {
            exec_mode: "argv_no_shell".to_string(),
            runs: Vec::new(),
            log_path: None,
        }
    }
}

/// Budget counters against their caps at tick end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BudgetSnapshot {
    pub counts: BudgetCounts,
    pub caps: BudgetCaps,
    pub warning: bool,
}

/// The canonical outcome record of one tick.
///
/// Written atomically at END; REPORT.md is rendered from this structure
/// and carries no additional information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_summary: Option<String>,
    pub verdict: Verdict,
    pub code: ReportCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub blast_radius: BlastRadius,
    pub scope: ScopeOutcome,
    pub diff: DiffSummary,
    pub verification: VerifySummary,
    pub budgets: BudgetSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_error: Option<String>,
}

/// Extra context preserved when a tick blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Diagnostics {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_excerpt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_subtype: Option<String>,
}

impl Diagnostics {
    pub fn is_empty(&self) -> bool {
        self.schema_errors.is_empty()
            && self.extract_method.is_none()
            && self.stdout_excerpt.is_none()
            && self.json_excerpt.is_none()
            && self.provider_subtype.is_none()
    }
}

/// BLOCKED.json: present iff the last verdict was blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedRecord {
    pub blocked_at: DateTime<Utc>,
    pub code: ReportCode,
    pub reason: String,
    pub remediation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl BlockedRecord {
    pub fn new(at: DateTime<Utc>, code: ReportCode, reason: impl Into<String>) -> Self {
        Self {
            blocked_at: at,
            code,
            reason: reason.into(),
            remediation: code.remediation().unwrap_or_default().to_string(),
            diagnostics: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        if !diagnostics.is_empty() {
            self.diagnostics = Some(diagnostics);
        }
        self
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
