// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loop driver: chains ticks under mode-specific stop conditions.
//!
//! `task` stops at the first non-success (or orchestrator stop);
//! `milestone` additionally stops when the milestone changes;
//! `autonomous` rolls milestones over (archiving the departing ledger)
//! and stops only on blocked, signal, budget warning, or the tick cap.

use crate::preflight::run_preflight;
use crate::risk::GuardrailState;
use crate::tick::TickRunner;
use relais_adapters::{GitAdapter, Invoker};
use relais_core::{is_stop_requested, MilestoneId, Report, Verdict};
use relais_storage::StateStore;
use std::fmt;
use tracing::{info, warn};

/// Loop mode, selecting the stop semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Task,
    Milestone,
    Autonomous,
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopMode::Task => write!(f, "task"),
            LoopMode::Milestone => write!(f, "milestone"),
            LoopMode::Autonomous => write!(f, "autonomous"),
        }
    }
}

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStopReason {
    Sigint,
    Blocked,
    MaxTicks,
    BudgetWarning,
    OrchestratorStop,
    Verdict,
    MilestoneChange,
}

impl fmt::Display for LoopStopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopStopReason::Sigint => write!(f, "sigint"),
            LoopStopReason::Blocked => write!(f, "blocked"),
            LoopStopReason::MaxTicks => write!(f, "max_ticks"),
            LoopStopReason::BudgetWarning => write!(f, "budget_warning"),
            LoopStopReason::OrchestratorStop => write!(f, "orchestrator_stop"),
            LoopStopReason::Verdict => write!(f, "verdict"),
            LoopStopReason::MilestoneChange => write!(f, "milestone_change"),
        }
    }
}

/// Result of a loop run.
#[derive(Debug)]
pub struct LoopOutcome {
    pub ticks_executed: u32,
    pub final_verdict: Option<Verdict>,
    pub stop_reason: LoopStopReason,
    pub reports: Vec<Report>,
}

/// Drive ticks until a stop condition fires.
pub async fn run_loop<I: Invoker + Clone + Send + Sync + 'static>(
    runner: &TickRunner<I>,
    mode: LoopMode,
    max_ticks: Option<u32>,
) -> LoopOutcome {
    let store = StateStore::new(runner.paths().clone());
    let mut guard = GuardrailState::default();
    let mut reports: Vec<Report> = Vec::new();
    let mut ticks_executed = 0u32;
    let mut current_milestone: Option<MilestoneId> =
        store.load().ok().and_then(|state| state.milestone_id);

    info!(mode = %mode, max_ticks = ?max_ticks, "loop started");

    let stop_reason = loop {
        if is_stop_requested() || runner.cancel_token().is_cancelled() {
            break LoopStopReason::Sigint;
        }

        // Cheap pre-check before committing to a tick.
        let git = GitAdapter::new(runner.invoker().clone(), runner.repo_root());
        let preflight =
            run_preflight(runner.config(), &git, runner.paths(), false).await;
        if !preflight.ok {
            warn!(
                code = ?preflight.blocked_code,
                reason = ?preflight.blocked_reason,
                "loop pre-check blocked"
            );
            break LoopStopReason::Blocked;
        }

        if let Some(max) = max_ticks {
            if ticks_executed >= max {
                break LoopStopReason::MaxTicks;
            }
        }

        let crate::tick::TickOutcome {
            report,
            orchestrator_stop,
            task_milestone,
            guard: next_guard,
            ..
        } = runner.run_tick(guard).await;
        guard = next_guard;
        ticks_executed += 1;
        let verdict = report.verdict;
        reports.push(report);

        let state = store.load().unwrap_or_default();
        if state.budget_warning {
            break LoopStopReason::BudgetWarning;
        }

        // Milestone bookkeeping.
        let seen_milestone = outcome_milestone(&task_milestone, &state.milestone_id);
        let milestone_changed = match (&current_milestone, &seen_milestone) {
            (Some(current), Some(seen)) => current != seen,
            _ => false,
        };
        if current_milestone.is_none() {
            current_milestone = seen_milestone.clone();
        }

        match mode {
            LoopMode::Task => {
                if orchestrator_stop {
                    break LoopStopReason::OrchestratorStop;
                }
                if verdict != Verdict::Success {
                    break LoopStopReason::Verdict;
                }
            }
            LoopMode::Milestone => {
                if milestone_changed {
                    break LoopStopReason::MilestoneChange;
                }
                if orchestrator_stop {
                    break LoopStopReason::OrchestratorStop;
                }
                if verdict != Verdict::Success {
                    break LoopStopReason::Verdict;
                }
            }
            LoopMode::Autonomous => {
                // The tick's state update already archived the departing
                // ledger and zeroed the counters; the loop just follows.
                if milestone_changed {
                    if let Some(next) = seen_milestone.clone() {
                        info!(milestone = %next, "milestone rollover");
                        current_milestone = Some(next);
                    }
                }
                // Autonomous mode continues through orchestrator stops and
                // stop verdicts; only a blocked tick ends it.
                if verdict == Verdict::Blocked {
                    break LoopStopReason::Blocked;
                }
            }
        }
    };

    let final_verdict = reports.last().map(|report| report.verdict);
    info!(
        reason = %stop_reason,
        ticks = ticks_executed,
        verdict = ?final_verdict,
        "loop finished"
    );
    LoopOutcome {
        ticks_executed,
        final_verdict,
        stop_reason,
        reports,
    }
}

fn outcome_milestone(
    task_milestone: &Option<MilestoneId>,
    state_milestone: &Option<MilestoneId>,
) -> Option<MilestoneId> {
    task_milestone.clone().or_else(|| state_milestone.clone())
}

#[cfg(test)]
#[path = "runloop_tests.rs"]
mod tests;
