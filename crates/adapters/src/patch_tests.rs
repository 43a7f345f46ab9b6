// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::{FakeInvoker, FakeResponse};

const SIMPLE_PATCH: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,1 +1,2 @@
 fn a() {}
+fn b() {}
";

#[test]
fn target_paths_from_headers() {
    assert_eq!(patch_target_paths(SIMPLE_PATCH), vec!["src/lib.rs"]);
}

#[test]
fn dev_null_is_skipped() {
    let patch = "--- /dev/null\n+++ b/src/new.rs\n@@ -0,0 +1 @@\n+fn n() {}\n";
    assert_eq!(patch_target_paths(patch), vec!["src/new.rs"]);
}

#[test]
fn rename_directives_are_captured() {
    let patch = "diff --git a/old.rs b/new.rs\nrename from old.rs\nrename to new.rs\n";
    assert_eq!(patch_target_paths(patch), vec!["new.rs", "old.rs"]);
}

#[test]
fn empty_patch_has_no_paths() {
    assert!(patch_target_paths("just prose").is_empty());
}

fn no_forbidden(_: &str) -> bool {
    false
}

#[tokio::test]
async fn valid_patch_is_applied_via_git() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok("")); // git apply

    let git = GitAdapter::new(fake.clone(), dir.path());
    let paths = apply_patch(&git, SIMPLE_PATCH, &no_forbidden).await.unwrap();
    assert_eq!(paths, vec!["src/lib.rs"]);

    let request = &fake.requests()[0];
    assert_eq!(request.args[0], "apply");
}

#[tokio::test]
async fn absolute_path_is_rejected_before_git_runs() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    let git = GitAdapter::new(fake.clone(), dir.path());

    let patch = "--- a//etc/passwd\n+++ b//etc/passwd\n@@\n";
    match apply_patch(&git, patch, &no_forbidden).await {
        Err(PatchError::InvalidPath { reason, .. }) => {
            assert!(reason.contains("absolute") || reason.contains("rooted"));
        }
        other => panic!("expected InvalidPath, got {other:?}"),
    }
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn parent_escape_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    let git = GitAdapter::new(fake.clone(), dir.path());

    let patch = "--- a/../outside.rs\n+++ b/../outside.rs\n@@\n";
    assert!(matches!(
        apply_patch(&git, patch, &no_forbidden).await,
        Err(PatchError::InvalidPath { .. })
    ));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn forbidden_path_is_a_scope_error() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    let git = GitAdapter::new(fake.clone(), dir.path());

    let forbidden = |path: &str| path.starts_with(".git/");
    let patch = "--- a/.git/config\n+++ b/.git/config\n@@\n";
    assert!(matches!(
        apply_patch(&git, patch, &forbidden).await,
        Err(PatchError::Scope(path)) if path == ".git/config"
    ));
    assert_eq!(fake.call_count(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_component_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("real")).unwrap();
    std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

    let fake = FakeInvoker::new();
    let git = GitAdapter::new(fake.clone(), dir.path());

    let patch = "--- a/link/inner.rs\n+++ b/link/inner.rs\n@@\n";
    assert!(matches!(
        apply_patch(&git, patch, &no_forbidden).await,
        Err(PatchError::Symlink(path)) if path == "link/inner.rs"
    ));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn git_apply_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::exit(1, "error: patch failed: src/lib.rs:1"));

    let git = GitAdapter::new(fake.clone(), dir.path());
    match apply_patch(&git, SIMPLE_PATCH, &no_forbidden).await {
        Err(PatchError::Apply(message)) => assert!(message.contains("patch failed")),
        other => panic!("expected Apply, got {other:?}"),
    }
}

#[tokio::test]
async fn patch_without_paths_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    let git = GitAdapter::new(fake, dir.path());
    assert!(matches!(
        apply_patch(&git, "no headers here", &no_forbidden).await,
        Err(PatchError::Empty)
    ));
}
