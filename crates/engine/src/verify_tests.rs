// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use relais_adapters::{FakeInvoker, FakeResponse};
use relais_core::VerificationConfig;

fn config_with(templates: &[(&str, &str, &[&str])]) -> VerificationConfig {
    let mut config = VerificationConfig::default();
    for (id, cmd, args) in templates {
        config.templates.insert(
            id.to_string(),
            CommandTemplate {
                cmd: cmd.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
                params: BTreeMap::new(),
            },
        );
    }
    config
}

fn plan(fast: &[&str], slow: &[&str]) -> TaskVerification {
    TaskVerification {
        fast: fast.iter().map(|s| s.to_string()).collect(),
        slow: slow.iter().map(|s| s.to_string()).collect(),
        params: BTreeMap::new(),
    }
}

#[tokio::test]
async fn all_pass_runs_fast_then_slow_in_order() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok("lint ok"));
    fake.push(FakeResponse::ok("build ok"));
    fake.push(FakeResponse::ok("tests ok"));

    let config = config_with(&[
        ("lint", "cargo", &["clippy"]),
        ("build", "cargo", &["build"]),
        ("tests", "cargo", &["test"]),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_verification(
        &fake,
        &config,
        &plan(&["lint", "build"], &["tests"]),
        dir.path(),
        None,
    )
    .await;

    assert!(outcome.passed());
    assert_eq!(outcome.runs.len(), 3);
    assert_eq!(outcome.runs[0].template_id, "lint");
    assert_eq!(outcome.runs[0].phase, VerifyPhase::Fast);
    assert_eq!(outcome.runs[2].template_id, "tests");
    assert_eq!(outcome.runs[2].phase, VerifyPhase::Slow);
}

#[tokio::test]
async fn fast_failure_skips_slow_entirely() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok("t1 ok"));
    fake.push(FakeResponse::exit(1, "t2 failed"));

    let config = config_with(&[
        ("t1", "cmd1", &[]),
        ("t2", "cmd2", &[]),
        ("t3", "cmd3", &[]),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let outcome =
        run_verification(&fake, &config, &plan(&["t1", "t2"], &["t3"]), dir.path(), None).await;

    assert_eq!(
        outcome.result,
        VerifyResultType::Fail {
            phase: VerifyPhase::Fast
        }
    );
    let ids: Vec<_> = outcome.runs.iter().map(|r| r.template_id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);
    // t3 never executed.
    assert_eq!(fake.call_count(), 2);
    assert!(outcome.counts_as_failure());
}

#[tokio::test]
async fn slow_failure_is_classified_slow() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok(""));
    fake.push(FakeResponse::exit(2, "tests failed"));

    let config = config_with(&[("lint", "cargo", &[]), ("tests", "cargo", &[])]);
    let dir = tempfile::tempdir().unwrap();
    let outcome =
        run_verification(&fake, &config, &plan(&["lint"], &["tests"]), dir.path(), None).await;
    assert_eq!(
        outcome.result,
        VerifyResultType::Fail {
            phase: VerifyPhase::Slow
        }
    );
}

#[tokio::test]
async fn timeout_wins_over_fail_regardless_of_exit_code() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::timeout());

    let config = config_with(&[("tests", "cargo", &[])]);
    let dir = tempfile::tempdir().unwrap();
    let outcome =
        run_verification(&fake, &config, &plan(&["tests"], &[]), dir.path(), None).await;
    assert_eq!(outcome.result, VerifyResultType::Timeout);
    assert!(outcome.counts_as_failure());
}

#[tokio::test]
async fn exit_124_counts_as_timeout() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::exit(124, ""));

    let config = config_with(&[("tests", "cargo", &[])]);
    let dir = tempfile::tempdir().unwrap();
    let outcome =
        run_verification(&fake, &config, &plan(&["tests"], &[]), dir.path(), None).await;
    assert_eq!(outcome.result, VerifyResultType::Timeout);
    assert!(outcome.runs[0].timed_out);
}

#[tokio::test]
async fn params_substitute_into_args() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok(""));

    let config = config_with(&[("test-pkg", "cargo", &["test", "-p", "{{pkg}}"])]);
    let mut verification = plan(&["test-pkg"], &[]);
    verification
        .params
        .insert("pkg".to_string(), "relais-core".to_string());

    let dir = tempfile::tempdir().unwrap();
    let outcome = run_verification(&fake, &config, &verification, dir.path(), None).await;
    assert!(outcome.passed());
    assert_eq!(
        fake.requests()[0].args,
        vec!["test", "-p", "relais-core"]
    );
    // The report record keeps the unsubstituted template.
    assert_eq!(outcome.runs[0].args_template, vec!["test", "-p", "{{pkg}}"]);
}

#[tokio::test]
async fn tainted_metachar_param_runs_nothing() {
    let fake = FakeInvoker::new();
    let config = config_with(&[("tests", "cargo", &["test", "{{pkg}}"])]);
    let mut verification = plan(&["tests"], &[]);
    verification
        .params
        .insert("pkg".to_string(), "a;rm -rf /".to_string());

    let dir = tempfile::tempdir().unwrap();
    let outcome = run_verification(&fake, &config, &verification, dir.path(), None).await;
    match &outcome.result {
        VerifyResultType::Tainted { param, reason } => {
            assert_eq!(param, "pkg");
            assert!(reason.contains("metacharacter") || reason.contains("whitespace"));
        }
        other => panic!("expected Tainted, got {other:?}"),
    }
    assert!(outcome.runs.is_empty());
    assert_eq!(fake.call_count(), 0);
}

#[yare::parameterized(
    whitespace = { "a b", "whitespace" },
    dotdot = { "../etc", "'..'" },
    metachar = { "x|y", "metacharacter" },
)]
fn taint_reasons(value: &str, expected_fragment: &str) {
    let config = VerificationConfig::default();
    let (_, reason) = sanitize_param("p", value, &config).unwrap_err();
    assert!(reason.contains(expected_fragment), "{reason}");
}

#[test]
fn overlong_param_is_tainted() {
    let mut config = VerificationConfig::default();
    config.max_param_len = 8;
    let err = sanitize_param("p", "123456789", &config);
    assert!(err.is_err());
}

#[test]
fn invalid_metachar_regex_fails_closed() {
    let mut config = VerificationConfig::default();
    config.metachar_regex = "[unclosed".to_string();
    let (_, reason) = sanitize_param("p", "clean", &config).unwrap_err();
    assert!(reason.contains("invalid"));
}

#[tokio::test]
async fn unknown_template_id_runs_nothing() {
    let fake = FakeInvoker::new();
    let config = config_with(&[("lint", "cargo", &[])]);
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_verification(
        &fake,
        &config,
        &plan(&["lint", "ghost"], &[]),
        dir.path(),
        None,
    )
    .await;
    assert_eq!(
        outcome.result,
        VerifyResultType::UnknownTemplate {
            template_id: "ghost".to_string()
        }
    );
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn aggregate_log_is_written() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok("all good\n"));

    let config = config_with(&[("lint", "cargo", &["clippy"])]);
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("verify.log");
    let outcome = run_verification(
        &fake,
        &config,
        &plan(&["lint"], &[]),
        dir.path(),
        Some(log_path.clone()),
    )
    .await;

    assert_eq!(outcome.log_path, Some(log_path.clone()));
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("=== lint [fast] cargo"));
    assert!(log.contains("all good"));
}
