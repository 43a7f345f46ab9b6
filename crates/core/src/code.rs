// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verdicts and the closed report-code enumeration.
//!
//! Every tick ends with exactly one [`ReportCode`]; the coarse [`Verdict`]
//! is derived from it. Codes are wire-stable: they serialize as their
//! SCREAMING_SNAKE_CASE names in REPORT.json and BLOCKED.json.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse outcome of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// Verify passed (or verify_only ran), scope and diff legal, head unmoved.
    Success,
    /// An expected negative outcome of work; artifacts are consistent.
    Stop,
    /// The runner cannot safely proceed; work was not attempted or was rolled back.
    Blocked,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => write!(f, "success"),
            Verdict::Stop => write!(f, "stop"),
            Verdict::Blocked => write!(f, "blocked"),
        }
    }
}

/// The specific enumerated reason for a tick outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportCode {
    Success,

    // Scope & diff policy
    StopScopeViolationForbidden,
    StopScopeViolationOutsideAllowed,
    StopScopeViolationNewFile,
    StopScopeViolationLockfileChange,
    StopDiffTooLarge,

    // Verification
    StopVerifyFailedFast,
    StopVerifyFailedSlow,
    StopVerifyTainted,
    StopVerifyFlakyOrTimeout,
    StopVerifyOnlySideEffects,
    StopQuestionSideEffects,
    StopRunnerOwnedMutation,

    // Builder
    StopBuilderJsonParse,
    StopBuilderSchemaInvalid,
    StopBuilderShapeInvalid,
    StopBuilderCliError,
    StopBuilderTimeout,
    StopPatchApplyFailed,
    StopPatchScopeViolation,
    StopPatchInvalidPath,
    StopPatchSymlink,

    // Tick-level stops
    StopHeadMoved,
    StopInterrupted,
    StopReviewerForcedPatch,
    StopReviewerAskQuestion,
    StopOrchestratorAskQuestion,
    StopOrchestratorTimeout,
    StopRedispatchIdenticalTask,
    StopMergeDirtyWorktree,
    StopBranchMismatch,
    StopEvidenceIncomplete,

    // Blocked
    BlockedBudgetExhausted,
    BlockedBudgetCap,
    BlockedDirtyWorktree,
    BlockedLockHeld,
    BlockedCrashRecoveryRequired,
    BlockedOrchestratorOutputInvalid,
    BlockedHistoryCapCleanupRequired,
    BlockedMissingConfig,
    BlockedTransportStalled,
    BlockedRollbackFailed,
    BlockedRollbackDirty,
    BlockedBuilderCommandNotFound,
    BlockedBuilderModeNotAllowed,
    BlockedBranchFailed,
}

impl ReportCode {
    /// The coarse verdict this code implies.
    pub fn verdict(&self) -> Verdict {
        use ReportCode::*;
        match self {
            Success => Verdict::Success,
            BlockedBudgetExhausted
            | BlockedBudgetCap
            | BlockedDirtyWorktree
            | BlockedLockHeld
            | BlockedCrashRecoveryRequired
            | BlockedOrchestratorOutputInvalid
            | BlockedHistoryCapCleanupRequired
            | BlockedMissingConfig
            | BlockedTransportStalled
            | BlockedRollbackFailed
            | BlockedRollbackDirty
            | BlockedBuilderCommandNotFound
            | BlockedBuilderModeNotAllowed
            | BlockedBranchFailed => Verdict::Blocked,
            _ => Verdict::Stop,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict() == Verdict::Blocked
    }

    /// Actionable remediation for blocked codes, keyed on the code.
    ///
    /// Stop codes are expected outcomes and carry no remediation.
    pub fn remediation(&self) -> Option<&'static str> {
        use ReportCode::*;
        match self {
            BlockedBudgetExhausted | BlockedBudgetCap => Some(
                "milestone budget reached; start a new milestone or raise the caps in relais.json",
            ),
            BlockedDirtyWorktree => {
                Some("commit or stash the uncommitted changes, then re-run")
            }
            BlockedLockHeld => Some(
                "another runner holds the workspace lock; wait for it or remove a stale lock.json",
            ),
            BlockedCrashRecoveryRequired => Some(
                "a previous tick crashed mid-write; inspect the workspace directory, remove or \
                 repair the offending files, then re-run",
            ),
            BlockedOrchestratorOutputInvalid => Some(
                "the planner returned unusable output twice; check the prompt templates and the \
                 task schema, then re-run",
            ),
            BlockedHistoryCapCleanupRequired => Some(
                "the history directory cannot be pruned; inspect history/ permissions and free \
                 space, then re-run",
            ),
            BlockedMissingConfig => Some(
                "create relais.json at the repository root (or repair the named section) and \
                 re-run inside a git repository",
            ),
            BlockedTransportStalled => Some(
                "the external agent produced no result; check its authentication and re-run",
            ),
            BlockedRollbackFailed | BlockedRollbackDirty => Some(
                "automatic rollback could not restore the base commit; run `git status`, restore \
                 the worktree by hand, then re-run",
            ),
            BlockedBuilderCommandNotFound => Some(
                "the configured builder command is not on PATH; install it or fix the command in \
                 relais.json",
            ),
            BlockedBuilderModeNotAllowed => Some(
                "the task requested a builder mode the autonomy profile denies; adjust the \
                 profile or the orchestrator prompts",
            ),
            BlockedBranchFailed => Some(
                "per-tick branch creation failed; check for a conflicting branch name and \
                 repository permissions",
            ),
            _ => None,
        }
    }
}

impl fmt::Display for ReportCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Serialize via serde to keep Display identical to the wire form.
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

#[cfg(test)]
#[path = "code_tests.rs"]
mod tests;
