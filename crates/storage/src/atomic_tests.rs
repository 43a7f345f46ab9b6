// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tempfile::tempdir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    values: BTreeMap<String, u32>,
}

fn sample() -> Sample {
    Sample {
        name: "tick".to_string(),
        values: [("a".to_string(), 1), ("b".to_string(), 2)].into(),
    }
}

#[test]
fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.json");

    write_json(&path, &sample()).unwrap();
    let back: Sample = read_json(&path).unwrap();
    assert_eq!(back, sample());
}

#[test]
fn written_json_ends_with_newline_and_is_indented() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.json");
    write_json(&path, &sample()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.ends_with('\n'));
    assert!(text.contains("  \"name\""));
    assert!(!text.is_empty());
}

#[test]
fn no_temp_file_survives_a_successful_write() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.json");
    write_json(&path, &sample()).unwrap();

    assert!(path.exists());
    assert!(!dir.path().join("sample.json.tmp").exists());
}

#[test]
fn rewrite_replaces_contents_atomically() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.json");
    write_json(&path, &sample()).unwrap();

    let mut second = sample();
    second.name = "tock".to_string();
    write_json(&path, &second).unwrap();

    let back: Sample = read_json(&path).unwrap();
    assert_eq!(back.name, "tock");
}

#[test]
fn read_missing_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent.json");
    match read_json::<Sample>(&path) {
        Err(FsError::Read { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected read error, got {other:?}"),
    }
}

#[test]
fn read_corrupt_file_reports_parse_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{oops").unwrap();
    assert!(matches!(
        read_json::<Sample>(&path),
        Err(FsError::Parse { .. })
    ));
}

#[test]
fn cleanup_temp_removes_only_matching_files() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("a.tmp"), "x").unwrap();
    std::fs::write(dir.path().join("b.tmp"), "y").unwrap();
    std::fs::write(dir.path().join("keep.json"), "{}").unwrap();
    std::fs::create_dir(dir.path().join("sub.tmp")).unwrap();

    let failed = cleanup_temp(dir.path(), ".tmp");
    assert!(failed.is_empty());
    assert!(!dir.path().join("a.tmp").exists());
    assert!(!dir.path().join("b.tmp").exists());
    assert!(dir.path().join("keep.json").exists());
    // Directories are not touched.
    assert!(dir.path().join("sub.tmp").exists());
}

#[test]
fn cleanup_temp_on_missing_dir_is_a_noop() {
    let dir = tempdir().unwrap();
    let failed = cleanup_temp(&dir.path().join("absent"), ".tmp");
    assert!(failed.is_empty());
}

#[yare::parameterized(
    simple = { "relais/*.tmp" },
    bare = { "*.tmp" },
    nested = { "history/**/*.tmp" },
)]
fn safe_globs(pattern: &str) {
    assert!(glob_safe(pattern).is_safe(), "{pattern}");
}

#[yare::parameterized(
    empty = { "" },
    whitespace = { "   " },
    dotdot = { "../*.tmp" },
    dotdot_inner = { "a/../b/*.tmp" },
    absolute = { "/tmp/*.tmp" },
    unc = { "\\\\server\\share\\*.tmp" },
    double_slash = { "//server/share/*.tmp" },
    drive = { "C:/temp/*.tmp" },
)]
fn unsafe_globs(pattern: &str) {
    match glob_safe(pattern) {
        GlobSafety::Unsafe(reason) => assert!(!reason.is_empty()),
        GlobSafety::Safe => panic!("{pattern:?} should be unsafe"),
    }
}
