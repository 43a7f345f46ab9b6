//! Blocked tick behavior.

use crate::prelude::*;

#[test]
fn outside_a_git_repo_blocks_with_remediation() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join(".relais/prompts")).unwrap();
    std::fs::write(root.join(".relais/prompts/orchestrator-system.txt"), "s").unwrap();
    std::fs::write(root.join(".relais/prompts/orchestrator-user.txt"), "u").unwrap();
    std::fs::write(
        root.join("relais.json"),
        serde_json::to_string_pretty(&serde_json::json!({
            "orchestrator": {
                "invoker": { "command": "sh", "args": ["-c", "true"] }
            }
        }))
        .unwrap(),
    )
    .unwrap();

    // Verdicts travel via REPORT.json; the exit code stays zero.
    relais_cmd()
        .arg("tick")
        .current_dir(root)
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(root.join(".relais/REPORT.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["verdict"], "blocked");
    assert_eq!(report["code"], "BLOCKED_MISSING_CONFIG");

    let blocked: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(root.join(".relais/BLOCKED.json")).unwrap(),
    )
    .unwrap();
    assert!(!blocked["remediation"].as_str().unwrap().is_empty());
    assert!(!root.join(".relais/lock.json").exists());
}

#[test]
fn dirty_worktree_blocks_the_tick() {
    let repo = scratch_repo();
    write_plan(&repo, &verify_only_plan("m-1"));
    // Uncommitted user change.
    std::fs::write(repo.root().join("src.rs"), "fn main() { panic!() }\n").unwrap();

    relais_cmd()
        .arg("tick")
        .current_dir(repo.root())
        .assert()
        .success();

    let report = repo.read_report();
    assert_eq!(report["code"], "BLOCKED_DIRTY_WORKTREE");
    assert!(repo.blocked().exists());
}

#[test]
fn next_successful_tick_clears_the_blocked_record() {
    let repo = scratch_repo();
    write_plan(&repo, &verify_only_plan("m-1"));

    // First: block on a dirty worktree.
    std::fs::write(repo.root().join("src.rs"), "fn main() { panic!() }\n").unwrap();
    relais_cmd()
        .arg("tick")
        .current_dir(repo.root())
        .assert()
        .success();
    assert!(repo.blocked().exists());

    // Restore and run again: success must delete BLOCKED.json.
    std::fs::write(repo.root().join("src.rs"), "fn main() {}\n").unwrap();
    relais_cmd()
        .arg("tick")
        .current_dir(repo.root())
        .assert()
        .success();
    assert_eq!(repo.read_report()["verdict"], "success");
    assert!(!repo.blocked().exists());
}
