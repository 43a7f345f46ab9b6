// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent per-milestone workspace ledger (STATE.json shape).

use crate::{MilestoneId, RunId, Verdict};
use serde::{Deserialize, Serialize};

/// Per-milestone call counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BudgetCounts {
    pub ticks: u32,
    pub orchestrator_calls: u32,
    pub builder_calls: u32,
    pub verify_runs: u32,
}

impl BudgetCounts {
    /// Add the calls made during one tick.
    pub fn apply(&mut self, delta: BudgetCounts) {
        self.ticks = self.ticks.saturating_add(delta.ticks);
        self.orchestrator_calls = self
            .orchestrator_calls
            .saturating_add(delta.orchestrator_calls);
        self.builder_calls = self.builder_calls.saturating_add(delta.builder_calls);
        self.verify_runs = self.verify_runs.saturating_add(delta.verify_runs);
    }
}

/// Per-milestone caps for the counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetCaps {
    pub max_ticks: u32,
    pub max_orchestrator_calls: u32,
    pub max_builder_calls: u32,
    pub max_verify_runs: u32,
    /// Fraction of any cap at which the budget warning latches.
    pub warn_at: f64,
}

impl Default for BudgetCaps {
    fn default() -> Self {
        Self {
            max_ticks: 50,
            max_orchestrator_calls: 60,
            max_builder_calls: 60,
            max_verify_runs: 200,
            warn_at: 0.8,
        }
    }
}

impl BudgetCaps {
    /// First exhausted budget dimension, if any.
    pub fn exceeded_dimension(&self, counts: &BudgetCounts) -> Option<&'static str> {
        if counts.ticks >= self.max_ticks {
            Some("ticks")
        } else if counts.orchestrator_calls >= self.max_orchestrator_calls {
            Some("orchestrator_calls")
        } else if counts.builder_calls >= self.max_builder_calls {
            Some("builder_calls")
        } else if counts.verify_runs >= self.max_verify_runs {
            Some("verify_runs")
        } else {
            None
        }
    }

    /// Whether any dimension has crossed the warn-at fraction of its cap.
    pub fn warning(&self, counts: &BudgetCounts) -> bool {
        let over = |count: u32, cap: u32| {
            cap > 0 && (count as f64) >= (cap as f64) * self.warn_at
        };
        over(counts.ticks, self.max_ticks)
            || over(counts.orchestrator_calls, self.max_orchestrator_calls)
            || over(counts.builder_calls, self.max_builder_calls)
            || over(counts.verify_runs, self.max_verify_runs)
    }
}

/// Persistent workspace state, rewritten atomically at the end of each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkspaceState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<MilestoneId>,
    #[serde(default)]
    pub budgets: BudgetCounts,
    #[serde(default)]
    pub budget_warning: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_id: Option<RunId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verdict: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idea_inbox: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_questions: Option<Vec<String>>,
}

impl WorkspaceState {
    /// Switch the ledger to `milestone`, zeroing the counters if it changed.
    ///
    /// Returns true when a new milestone was started.
    pub fn ensure_milestone(&mut self, milestone: &MilestoneId) -> bool {
        if self.milestone_id.as_ref() == Some(milestone) {
            return false;
        }
        self.milestone_id = Some(milestone.clone());
        self.budgets = BudgetCounts::default();
        self.budget_warning = false;
        true
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
