// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relais_core::{BudgetCounts, RunId, Verdict};
use tempfile::tempdir;

fn store(dir: &std::path::Path) -> StateStore {
    StateStore::new(WorkspacePaths::new(dir, "lock.json"))
}

#[test]
fn load_missing_returns_default() {
    let dir = tempdir().unwrap();
    let state = store(dir.path()).load().unwrap();
    assert_eq!(state, WorkspaceState::default());
}

#[test]
fn save_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());

    let mut state = WorkspaceState::default();
    state.ensure_milestone(&MilestoneId::new("m-1"));
    state.budgets.apply(BudgetCounts {
        ticks: 1,
        orchestrator_calls: 1,
        builder_calls: 1,
        verify_runs: 2,
    });
    state.last_run_id = Some(RunId::new("20260101T000001Z-abc123"));
    state.last_verdict = Some(Verdict::Success);

    store.save(&state).unwrap();
    let back = store.load().unwrap();
    assert_eq!(back, state);
}

#[test]
fn corrupt_state_is_an_error() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());
    std::fs::write(store_path(dir.path()), "{torn write").unwrap();
    assert!(store.load().is_err());
}

fn store_path(dir: &std::path::Path) -> std::path::PathBuf {
    dir.join("STATE.json")
}

#[test]
fn archive_and_reset_writes_departing_ledger() {
    let dir = tempdir().unwrap();
    let store = store(dir.path());

    let mut state = WorkspaceState::default();
    state.ensure_milestone(&MilestoneId::new("m-1"));
    state.budgets.ticks = 5;
    store.save(&state).unwrap();

    store
        .archive_and_reset(&mut state, &MilestoneId::new("m-2"))
        .unwrap();

    assert_eq!(state.milestone_id, Some(MilestoneId::new("m-2")));
    assert_eq!(state.budgets.ticks, 0);

    let archive = dir.path().join("history/milestones/m-1.json");
    assert!(archive.exists());
    let archived: WorkspaceState =
        serde_json::from_str(&std::fs::read_to_string(&archive).unwrap()).unwrap();
    assert_eq!(archived.budgets.ticks, 5);
    assert_eq!(archived.milestone_id, Some(MilestoneId::new("m-1")));
}
