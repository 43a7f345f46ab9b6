// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::{FakeInvoker, FakeResponse};
use relais_core::{InvokerCommand, TaskKind};

fn config() -> OrchestratorConfig {
    OrchestratorConfig {
        invoker: InvokerCommand {
            command: "planner".to_string(),
            args: vec![
                "-p".to_string(),
                "{{prompt}}".to_string(),
                "--model".to_string(),
                "{{model}}".to_string(),
            ],
            model: Some("opus".to_string()),
        },
        system_prompt: "orchestrator-system.txt".to_string(),
        user_prompt: "orchestrator-user.txt".to_string(),
        schema_file: None,
        max_turns: 16,
        permission_mode: "plan".to_string(),
        retry_budget: 1,
        redispatch_cap: 2,
        timeout_seconds: 60,
    }
}

fn context(dir: &std::path::Path) -> OrchestratorContext {
    std::fs::write(dir.join("system.txt"), "You plan one task per tick.").unwrap();
    std::fs::write(dir.join("user.txt"), "Goal: {{goal}}. Milestone: {{milestone}}.").unwrap();
    OrchestratorContext {
        system_prompt_path: dir.join("system.txt"),
        user_prompt_path: dir.join("user.txt"),
        schema_override: None,
        values: [
            ("goal".to_string(), "green tests".to_string()),
            ("milestone".to_string(), "m-1".to_string()),
        ]
        .into(),
        cwd: dir.to_path_buf(),
    }
}

fn task_json() -> String {
    serde_json::json!({
        "task_id": "t-1",
        "milestone_id": "m-1",
        "kind": "verify_only",
        "intent": "confirm the suite is green",
        "scope": { "allowed_globs": [], "forbidden_globs": [] },
        "diff_limits": { "max_files": 5, "max_lines": 100 },
        "verification": { "fast": ["lint"], "slow": ["tests"], "params": {} }
    })
    .to_string()
}

#[tokio::test]
async fn valid_output_on_first_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok(task_json()));

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    let success = adapter.run(&context(dir.path())).await.unwrap();

    assert_eq!(success.attempts, 1);
    assert_eq!(success.task.kind, TaskKind::VerifyOnly);
    assert_eq!(success.extract_method, ExtractMethod::Direct);

    // Prompt interpolation reached the argv.
    let request = &fake.requests()[0];
    assert_eq!(request.command, "planner");
    assert!(request.args[1].contains("green tests"));
    assert!(request.args[1].contains("m-1"));
    assert_eq!(request.args[3], "opus");
}

#[tokio::test]
async fn fenced_output_is_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok(format!(
        "Here is my plan:\n```json\n{}\n```",
        task_json()
    )));

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    let success = adapter.run(&context(dir.path())).await.unwrap();
    assert_eq!(success.extract_method, ExtractMethod::Fenced);
}

#[tokio::test]
async fn retries_once_with_feedback_then_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok("I will fix it tomorrow."));
    fake.push(FakeResponse::ok(task_json()));

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    let success = adapter.run(&context(dir.path())).await.unwrap();
    assert_eq!(success.attempts, 2);

    // The retry prompt carries the correction preamble.
    let retry_prompt = &fake.requests()[1].args[1];
    assert!(retry_prompt.contains("Correction required"));
    assert!(retry_prompt.contains("json_parse"));
}

#[tokio::test]
async fn two_invalid_outputs_block_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok(r#"{"kind": "execute"}"#));
    fake.push(FakeResponse::ok(r#"{"kind": "execute"}"#));

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    match adapter.run(&context(dir.path())).await {
        Err(OrchestratorFailure::OutputInvalid {
            attempts,
            diagnostics,
            ..
        }) => {
            assert_eq!(attempts, 2);
            assert!(!diagnostics.schema_errors.is_empty());
            assert!(diagnostics.stdout_excerpt.is_some());
        }
        other => panic!("expected OutputInvalid, got {other:?}"),
    }
}

#[tokio::test]
async fn shape_violations_are_retried_too() {
    let dir = tempfile::tempdir().unwrap();
    // Schema-valid but structurally wrong: execute without builder/control.
    let shapeless = serde_json::json!({
        "task_id": "t-1",
        "milestone_id": "m-1",
        "kind": "execute",
        "intent": "x",
        "scope": {},
        "diff_limits": { "max_files": 5, "max_lines": 100 }
    })
    .to_string();

    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok(shapeless.clone()));
    fake.push(FakeResponse::ok(shapeless));

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    assert!(matches!(
        adapter.run(&context(dir.path())).await,
        Err(OrchestratorFailure::OutputInvalid { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn timeout_short_circuits_without_retry() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::timeout());

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    assert!(matches!(
        adapter.run(&context(dir.path())).await,
        Err(OrchestratorFailure::Timeout { attempts: 1 })
    ));
    assert_eq!(fake.call_count(), 1);
}

#[tokio::test]
async fn empty_result_with_clean_exit_is_transport() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok(""));

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    match adapter.run(&context(dir.path())).await {
        Err(OrchestratorFailure::Transport {
            subtype,
            diagnostics,
        }) => {
            assert_eq!(subtype, "empty_result");
            assert_eq!(
                diagnostics.provider_subtype.as_deref(),
                Some("auth_or_empty")
            );
        }
        other => panic!("expected Transport, got {other:?}"),
    }
}

#[tokio::test]
async fn nonzero_exit_is_transport() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::exit(1, "auth expired"));

    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);
    assert!(matches!(
        adapter.run(&context(dir.path())).await,
        Err(OrchestratorFailure::Transport { subtype, .. }) if subtype == "exit_1"
    ));
}

#[tokio::test]
async fn missing_prompt_file_is_its_own_failure() {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeInvoker::new();
    let config = config();
    let adapter = OrchestratorAdapter::new(&fake, &config);

    let mut ctx = context(dir.path());
    ctx.system_prompt_path = dir.path().join("nope.txt");
    assert!(matches!(
        adapter.run(&ctx).await,
        Err(OrchestratorFailure::MissingPrompt { .. })
    ));
    assert_eq!(fake.call_count(), 0);
}
