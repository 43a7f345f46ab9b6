//! Successful tick behavior against a real git repository.

use crate::prelude::*;

#[test]
fn verify_only_tick_succeeds_and_writes_artifacts() {
    let repo = scratch_repo();
    write_plan(&repo, &verify_only_plan("m-1"));

    let output = relais_cmd()
        .arg("tick")
        .current_dir(repo.root())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report = repo.read_report();
    assert_eq!(report["verdict"], "success");
    assert_eq!(report["code"], "SUCCESS");
    assert_eq!(report["verification"]["exec_mode"], "argv_no_shell");
    assert!(report["run_id"].as_str().unwrap().len() > 10);

    // Markdown rendering is on by default.
    assert!(repo.workspace().join("REPORT.md").exists());
    // No blocked record, no leftover lock.
    assert!(!repo.blocked().exists());
    assert!(!repo.lock().exists());

    // Ledger counted the tick and the single planner call.
    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(repo.state()).unwrap()).unwrap();
    assert_eq!(state["budgets"]["ticks"], 1);
    assert_eq!(state["budgets"]["orchestrator_calls"], 1);
    assert_eq!(state["budgets"]["builder_calls"], 0);
    assert_eq!(state["last_verdict"], "success");
}

#[test]
fn two_ticks_produce_distinct_run_ids() {
    let repo = scratch_repo();
    write_plan(&repo, &verify_only_plan("m-1"));

    relais_cmd()
        .arg("tick")
        .current_dir(repo.root())
        .assert()
        .success();
    let first = repo.read_report()["run_id"].as_str().unwrap().to_string();

    relais_cmd()
        .arg("tick")
        .current_dir(repo.root())
        .assert()
        .success();
    let second = repo.read_report()["run_id"].as_str().unwrap().to_string();

    assert_ne!(first, second);

    // Per-tick history artifacts for both runs.
    let ticks_dir = repo.workspace().join("history/ticks");
    assert!(ticks_dir.join(&first).join("REPORT.json").exists());
    assert!(ticks_dir.join(&second).join("REPORT.json").exists());
}

#[test]
fn run_with_max_ticks_zero_executes_nothing() {
    let repo = scratch_repo();
    write_plan(&repo, &verify_only_plan("m-1"));

    relais_cmd()
        .args(["run", "--max-ticks", "0"])
        .current_dir(repo.root())
        .assert()
        .success();
    assert!(!repo.report().exists());
}

#[test]
fn orchestrator_control_stop_ends_a_task_run() {
    let repo = scratch_repo();
    write_plan(
        &repo,
        &serde_json::json!({
            "task_id": "t-done",
            "milestone_id": "m-1",
            "kind": "execute",
            "intent": "nothing left to do",
            "scope": {},
            "diff_limits": { "max_files": 5, "max_lines": 50 },
            "control": { "action": "stop", "reason": "milestone complete" }
        }),
    );

    relais_cmd()
        .args(["run", "--mode", "task"])
        .current_dir(repo.root())
        .assert()
        .success();

    let report = repo.read_report();
    assert_eq!(report["verdict"], "success");
    let reason = report["reason"].as_str().unwrap();
    assert!(reason.contains("milestone complete"), "{reason}");
}
