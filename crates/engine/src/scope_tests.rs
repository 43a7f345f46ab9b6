// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn scope(allowed: &[&str], forbidden: &[&str]) -> TaskScope {
    TaskScope {
        allowed_globs: allowed.iter().map(|s| s.to_string()).collect(),
        forbidden_globs: forbidden.iter().map(|s| s.to_string()).collect(),
        allow_new_files: false,
        allow_lockfile_changes: false,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[yare::parameterized(
    recursive = { "src/**", "src/a/b/c.rs", true },
    single_star_stays_in_component = { "src/*", "src/a/b.rs", false },
    single_star_direct_child = { "src/*", "src/a.rs", true },
    suffix = { "**/*.lock", "deps/Cargo.lock", true },
    no_match = { "src/**", "docs/readme.md", false },
    exact = { "Cargo.toml", "Cargo.toml", true },
)]
fn glob_semantics(pattern: &str, path: &str, expected: bool) {
    assert_eq!(matches_glob(path, &strings(&[pattern])), expected);
}

#[test]
fn empty_pattern_list_matches_nothing() {
    assert!(!matches_glob("src/lib.rs", &[]));
}

#[test]
fn invalid_pattern_is_skipped() {
    assert!(!matches_glob("src/lib.rs", &strings(&["[unclosed"])));
    assert!(matches_glob("src/lib.rs", &strings(&["[unclosed", "src/**"])));
}

#[yare::parameterized(
    bare_exact = { "Cargo.lock", "Cargo.lock", true },
    bare_nested = { "Cargo.lock", "crates/core/Cargo.lock", true },
    bare_not_suffix = { "Cargo.lock", "notCargo.lock", false },
    pattern = { "*.lock", "poetry.lock", true },
    pattern_nested_misses = { "*.lock", "sub/poetry.lock", false },
    unrelated = { "Cargo.lock", "src/lib.rs", false },
)]
fn lockfile_detection(entry: &str, path: &str, expected: bool) {
    assert_eq!(is_lockfile(path, &strings(&[entry])), expected);
}

#[test]
fn forbidden_wins_and_short_circuits_the_path() {
    // .git/config is both forbidden and outside the allowed list; only the
    // forbidden violation is recorded for it.
    let outcome = check_scope(
        &strings(&[".git/config"]),
        &[],
        &scope(&["src/**"], &[".git/**"]),
        &[],
    );
    assert!(!outcome.ok);
    assert_eq!(outcome.violations.len(), 1);
    assert_eq!(outcome.violations[0].kind, ScopeViolationKind::Forbidden);
    assert_eq!(outcome.violations[0].path, ".git/config");
}

#[test]
fn outside_allowed_is_flagged_when_allowlist_nonempty() {
    let outcome = check_scope(
        &strings(&["docs/guide.md"]),
        &[],
        &scope(&["src/**"], &[]),
        &[],
    );
    assert_eq!(
        outcome.violations[0].kind,
        ScopeViolationKind::OutsideAllowed
    );
}

#[test]
fn empty_allowlist_allows_everything_not_forbidden() {
    let outcome = check_scope(&strings(&["docs/guide.md"]), &[], &scope(&[], &[]), &[]);
    assert!(outcome.ok);
}

#[test]
fn new_file_forbidden_when_flag_off() {
    let outcome = check_scope(
        &strings(&["src/new.rs"]),
        &strings(&["src/new.rs"]),
        &scope(&["src/**"], &[]),
        &[],
    );
    assert!(!outcome.ok);
    assert_eq!(
        outcome.violations[0].kind,
        ScopeViolationKind::NewFileForbidden
    );
}

#[test]
fn new_file_allowed_when_flag_on() {
    let mut task_scope = scope(&["src/**"], &[]);
    task_scope.allow_new_files = true;
    let outcome = check_scope(
        &strings(&["src/new.rs"]),
        &strings(&["src/new.rs"]),
        &task_scope,
        &[],
    );
    assert!(outcome.ok);
}

#[test]
fn lockfile_change_forbidden_by_default() {
    let outcome = check_scope(
        &strings(&["Cargo.lock"]),
        &[],
        &scope(&[], &[]),
        &strings(&["Cargo.lock"]),
    );
    assert!(!outcome.ok);
    assert_eq!(
        outcome.violations[0].kind,
        ScopeViolationKind::LockfileChangeForbidden
    );
}

#[test]
fn lockfile_change_allowed_when_task_permits() {
    let mut task_scope = scope(&[], &[]);
    task_scope.allow_lockfile_changes = true;
    let outcome = check_scope(
        &strings(&["Cargo.lock"]),
        &[],
        &task_scope,
        &strings(&["Cargo.lock"]),
    );
    assert!(outcome.ok);
}

#[test]
fn one_path_can_collect_multiple_violations() {
    // Outside allowed AND a new file.
    let outcome = check_scope(
        &strings(&["docs/new.md"]),
        &strings(&["docs/new.md"]),
        &scope(&["src/**"], &[]),
        &[],
    );
    let kinds: Vec<_> = outcome.violations.iter().map(|v| v.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ScopeViolationKind::OutsideAllowed,
            ScopeViolationKind::NewFileForbidden
        ]
    );
}

fn analysis(files: usize, added: u64, deleted: u64) -> DiffAnalysis {
    DiffAnalysis {
        files: (0..files).map(|i| format!("src/f{i}.rs")).collect(),
        untracked: Vec::new(),
        lines_added: added,
        lines_deleted: deleted,
    }
}

#[yare::parameterized(
    under = { 19, 99, true },
    at_boundary = { 20, 100, true },
    files_over = { 21, 10, false },
    lines_over = { 5, 101, false },
)]
fn diff_limits_boundary(files: usize, lines_added: u64, ok: bool) {
    let limits = TaskDiffLimits {
        max_files: 20,
        max_lines: 100,
    };
    assert_eq!(
        check_diff_limits(&analysis(files, lines_added, 0), &limits).is_ok(),
        ok
    );
}

#[test]
fn both_exceeded_dimensions_are_named() {
    let limits = TaskDiffLimits {
        max_files: 20,
        max_lines: 100,
    };
    let message = check_diff_limits(&analysis(25, 150, 60), &limits).unwrap_err();
    assert!(message.contains("files touched 25"));
    assert!(message.contains("lines changed 210"));
}

#[test]
fn head_moved_detection() {
    assert!(!check_head_moved("abc", "abc"));
    assert!(check_head_moved("abc", "def"));
}
