// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Risk flags, guardrail state, escalation, and merge eligibility.

use crate::scope::matches_glob;
use relais_adapters::DiffAnalysis;
use relais_core::{Report, ReportCode, ReviewerConfig, Task, TriggerConfig};
use sha2::{Digest, Sha256};
use std::fmt;

/// Bound on the stop/verify histories kept in guardrail state.
const HISTORY_CAP: usize = 50;

/// Conditions that route a tick through the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskFlag {
    HighRiskPath,
    DiffNearCap,
    VerifyFailed,
    RepeatedStop,
    BudgetWarning,
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskFlag::HighRiskPath => write!(f, "high_risk_path"),
            RiskFlag::DiffNearCap => write!(f, "diff_near_cap"),
            RiskFlag::VerifyFailed => write!(f, "verify_failed"),
            RiskFlag::RepeatedStop => write!(f, "repeated_stop"),
            RiskFlag::BudgetWarning => write!(f, "budget_warning"),
        }
    }
}

/// A stop recorded in guardrail history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopEvent {
    pub tick: u32,
    pub code: ReportCode,
}

/// One verification outcome in guardrail history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyHistoryEntry {
    pub tick: u32,
    pub passed: bool,
    pub timed_out: bool,
}

/// Escalation routing when the failure streak crosses the threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Escalation {
    pub mode: EscalationMode,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationMode {
    Reviewer,
    Human,
}

/// Cross-tick guardrail state, owned by the loop driver.
#[derive(Debug, Clone, Default)]
pub struct GuardrailState {
    /// Constrain the next tick to patch-mode builders until a PASS occurs.
    pub force_patch: bool,
    pub last_flags: Vec<RiskFlag>,
    pub stop_history: Vec<StopEvent>,
    pub verify_history: Vec<VerifyHistoryEntry>,
    pub failure_streak: u32,
    pub last_failed_fingerprint: Option<String>,
    pub redispatch_count: u32,
    pub escalation: Option<Escalation>,
    /// Retry bookkeeping, reset on success.
    pub retry_count: u32,
    pub last_error_kind: Option<String>,
    pub last_run_id: Option<String>,
}

impl GuardrailState {
    pub fn record_stop(&mut self, tick: u32, code: ReportCode) {
        self.stop_history.push(StopEvent { tick, code });
        if self.stop_history.len() > HISTORY_CAP {
            let overflow = self.stop_history.len() - HISTORY_CAP;
            self.stop_history.drain(..overflow);
        }
    }

    pub fn record_verify(&mut self, entry: VerifyHistoryEntry) {
        self.verify_history.push(entry);
        if self.verify_history.len() > HISTORY_CAP {
            let overflow = self.verify_history.len() - HISTORY_CAP;
            self.verify_history.drain(..overflow);
        }
    }

    /// A verification PASS clears the force-patch constraint and the
    /// failure streak.
    pub fn record_pass(&mut self, tick: u32) {
        self.record_verify(VerifyHistoryEntry {
            tick,
            passed: true,
            timed_out: false,
        });
        self.failure_streak = 0;
        self.force_patch = false;
        self.last_failed_fingerprint = None;
        self.redispatch_count = 0;
        self.retry_count = 0;
        self.last_error_kind = None;
    }

    pub fn record_failure(&mut self, tick: u32, timed_out: bool, fingerprint: Option<String>) {
        self.record_verify(VerifyHistoryEntry {
            tick,
            passed: false,
            timed_out,
        });
        self.failure_streak = self.failure_streak.saturating_add(1);
        self.last_failed_fingerprint = fingerprint;
    }
}

/// Inputs to risk-flag computation.
pub struct RiskContext<'a> {
    pub task: &'a Task,
    /// Post-build analysis when available; pre-build reviews pass None.
    pub analysis: Option<&'a DiffAnalysis>,
    pub triggers: &'a TriggerConfig,
    pub state: &'a GuardrailState,
    pub current_tick: u32,
    pub verify_failed_last_tick: bool,
    pub budget_warning: bool,
}

/// Compute the active risk flags.
pub fn compute_risk_flags(ctx: &RiskContext<'_>) -> Vec<RiskFlag> {
    let mut flags = Vec::new();

    let high_risk = &ctx.triggers.high_risk_globs;
    if !high_risk.is_empty() {
        let touched_hit = ctx
            .analysis
            .map(|a| a.files.iter().any(|path| matches_glob(path, high_risk)))
            .unwrap_or(false);
        let scope_hit = ctx
            .task
            .scope
            .allowed_globs
            .iter()
            .any(|allowed| high_risk.iter().any(|risk| globs_overlap(allowed, risk)));
        if touched_hit || scope_hit {
            flags.push(RiskFlag::HighRiskPath);
        }
    }

    if let Some(analysis) = ctx.analysis {
        let limits = &ctx.task.diff_limits;
        let files_ratio = analysis.files_touched() as f64 / limits.max_files.max(1) as f64;
        let lines_ratio = analysis.lines_changed() as f64 / limits.max_lines.max(1) as f64;
        if files_ratio >= ctx.triggers.diff_near_cap_ratio
            || lines_ratio >= ctx.triggers.diff_near_cap_ratio
        {
            flags.push(RiskFlag::DiffNearCap);
        }
    }

    if ctx.verify_failed_last_tick {
        flags.push(RiskFlag::VerifyFailed);
    }

    let window_floor = ctx
        .current_tick
        .saturating_sub(ctx.triggers.repeated_stop_window);
    let stops_in_window = ctx
        .state
        .stop_history
        .iter()
        .filter(|event| event.tick >= window_floor)
        .count() as u32;
    if stops_in_window >= ctx.triggers.repeated_stop_max {
        flags.push(RiskFlag::RepeatedStop);
    }

    if ctx.budget_warning {
        flags.push(RiskFlag::BudgetWarning);
    }

    flags
}

/// Conservative overlap test between two glob patterns: their literal
/// prefixes (text before the first metacharacter) must be nested.
fn globs_overlap(a: &str, b: &str) -> bool {
    let prefix = |pattern: &str| -> String {
        pattern
            .chars()
            .take_while(|c| !matches!(c, '*' | '?' | '['))
            .collect()
    };
    let pa = prefix(a);
    let pb = prefix(b);
    pa.starts_with(&pb) || pb.starts_with(&pa)
}

/// The reviewer runs iff it is enabled and any flag fired.
pub fn should_trigger_reviewer(config: &ReviewerConfig, flags: &[RiskFlag]) -> bool {
    config.enabled && !flags.is_empty()
}

/// Escalate after two consecutive failures; route to the reviewer when it
/// is enabled, otherwise to the human.
pub fn should_escalate(state: &GuardrailState, reviewer_enabled: bool) -> Option<Escalation> {
    if state.failure_streak < 2 {
        return None;
    }
    let mode = if reviewer_enabled {
        EscalationMode::Reviewer
    } else {
        EscalationMode::Human
    };
    Some(Escalation {
        mode,
        reason: format!(
            "verification failed {} consecutive times",
            state.failure_streak
        ),
    })
}

/// Merge eligibility: at least one PASS in verify history AND a non-empty
/// diff. All failing reasons are concatenated.
pub fn merge_eligible(state: &GuardrailState, report: &Report) -> Result<(), String> {
    let mut reasons = Vec::new();
    if !state.verify_history.iter().any(|entry| entry.passed) {
        reasons.push(format!(
            "{}: no passing verification in history",
            ReportCode::StopEvidenceIncomplete
        ));
    }
    if report.diff.files_changed.is_empty() {
        reasons.push(format!(
            "{}: diff is empty",
            ReportCode::StopEvidenceIncomplete
        ));
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(reasons.join("; "))
    }
}

/// Stable fingerprint of a task's canonical form.
pub fn task_fingerprint(task: &Task) -> String {
    let mut hasher = Sha256::new();
    hasher.update(task.canonical_json().as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
#[path = "risk_tests.rs"]
mod tests;
