//! Test helpers for behavioral specifications.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

/// A scratch git repository with a committed tree, a relais.json, and the
/// workspace skeleton the runner expects.
pub struct Repo {
    pub dir: tempfile::TempDir,
}

impl Repo {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn workspace(&self) -> PathBuf {
        self.root().join(".relais")
    }

    pub fn report(&self) -> PathBuf {
        self.workspace().join("REPORT.json")
    }

    pub fn blocked(&self) -> PathBuf {
        self.workspace().join("BLOCKED.json")
    }

    pub fn state(&self) -> PathBuf {
        self.workspace().join("STATE.json")
    }

    pub fn lock(&self) -> PathBuf {
        self.workspace().join("lock.json")
    }

    pub fn read_report(&self) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(self.report()).unwrap()).unwrap()
    }
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

/// Build a repository whose planner is `sh -c 'cat .relais/plan.json'`,
/// so specs choose the next task by writing that file.
pub fn scratch_repo() -> Repo {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    std::fs::create_dir_all(root.join(".relais/prompts")).unwrap();
    std::fs::write(
        root.join(".relais/prompts/orchestrator-system.txt"),
        "You plan one task per tick.",
    )
    .unwrap();
    std::fs::write(
        root.join(".relais/prompts/orchestrator-user.txt"),
        "Goal: {{project_goal}}",
    )
    .unwrap();

    std::fs::write(root.join("src.rs"), "fn main() {}\n").unwrap();
    std::fs::write(root.join(".gitignore"), ".relais/\n").unwrap();

    let config = serde_json::json!({
        "project_goal": "stay green",
        "orchestrator": {
            "invoker": {
                "command": "sh",
                "args": ["-c", "cat .relais/plan.json", "relais-planner"]
            }
        }
    });
    std::fs::write(
        root.join("relais.json"),
        serde_json::to_string_pretty(&config).unwrap(),
    )
    .unwrap();

    git(root, &["init", "-q"]);
    git(root, &["add", "-A"]);
    git(
        root,
        &[
            "-c",
            "user.name=spec",
            "-c",
            "user.email=spec@example.invalid",
            "commit",
            "-q",
            "-m",
            "init",
        ],
    );

    Repo { dir }
}

/// Queue the next planned task.
pub fn write_plan(repo: &Repo, plan: &serde_json::Value) {
    std::fs::write(
        repo.workspace().join("plan.json"),
        serde_json::to_string_pretty(plan).unwrap(),
    )
    .unwrap();
}

/// A verify_only task with no templates: the cheapest successful tick.
pub fn verify_only_plan(milestone: &str) -> serde_json::Value {
    serde_json::json!({
        "task_id": format!("t-{milestone}"),
        "milestone_id": milestone,
        "kind": "verify_only",
        "intent": "confirm the tree is green",
        "scope": {},
        "diff_limits": { "max_files": 5, "max_lines": 50 },
        "verification": { "fast": [], "slow": [], "params": {} }
    })
}

pub fn relais_cmd() -> assert_cmd::Command {
    assert_cmd::Command::cargo_bin("relais").unwrap()
}
