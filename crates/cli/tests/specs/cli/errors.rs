//! CLI error paths.

use crate::prelude::*;

#[test]
fn missing_config_blocks_with_report_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let output = relais_cmd()
        .arg("tick")
        .current_dir(dir.path())
        .output()
        .unwrap();
    // Verdicts travel via REPORT.json; the exit code stays zero.
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let workspace = dir.path().join(".relais");
    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.join("REPORT.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["verdict"], "blocked");
    assert_eq!(report["code"], "BLOCKED_MISSING_CONFIG");

    let blocked: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(workspace.join("BLOCKED.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(blocked["code"], "BLOCKED_MISSING_CONFIG");
    assert!(blocked["reason"].as_str().unwrap().contains("relais.json"));
    assert!(!blocked["remediation"].as_str().unwrap().is_empty());
    assert!(!workspace.join("lock.json").exists());
}

#[test]
fn corrupt_config_blocks_the_same_way() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("relais.json"), "{not json").unwrap();

    relais_cmd()
        .arg("tick")
        .current_dir(dir.path())
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join(".relais/REPORT.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["code"], "BLOCKED_MISSING_CONFIG");
}

#[test]
fn nonexistent_directory_is_an_error_exit() {
    let output = relais_cmd()
        .args(["-C", "/definitely/not/a/real/dir", "tick"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
