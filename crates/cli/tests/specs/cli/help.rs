//! Help and version output.

use crate::prelude::*;

#[test]
fn help_lists_subcommands() {
    let output = relais_cmd().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("tick"));
}

#[test]
fn version_prints_and_exits_zero() {
    let output = relais_cmd().arg("--version").output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("relais"));
}

#[test]
fn unknown_subcommand_fails() {
    let output = relais_cmd().arg("frobnicate").output().unwrap();
    assert!(!output.status.success());
}
