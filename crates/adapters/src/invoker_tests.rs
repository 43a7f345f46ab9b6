// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn captures_stdout_and_exit_code() {
    let out = SubprocessInvoker
        .invoke(InvokerRequest::new(
            "sh",
            vec!["-c".to_string(), "printf hello".to_string()],
            Duration::from_secs(10),
        ))
        .await
        .unwrap();
    assert_eq!(out.exit_code, Some(0));
    assert_eq!(out.stdout, "hello");
    assert!(!out.timed_out);
    assert!(out.success());
}

#[tokio::test]
async fn nonzero_exit_is_not_success() {
    let out = SubprocessInvoker
        .invoke(InvokerRequest::new(
            "sh",
            vec!["-c".to_string(), "echo err >&2; exit 3".to_string()],
            Duration::from_secs(10),
        ))
        .await
        .unwrap();
    assert_eq!(out.exit_code, Some(3));
    assert_eq!(out.stderr.trim(), "err");
    assert!(!out.success());
}

#[tokio::test]
async fn timeout_kills_and_flags() {
    let start = std::time::Instant::now();
    let out = SubprocessInvoker
        .invoke(InvokerRequest::new(
            "sleep",
            vec!["30".to_string()],
            Duration::from_millis(100),
        ))
        .await
        .unwrap();
    assert!(out.timed_out);
    assert_eq!(out.exit_code, None);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn missing_command_is_not_found() {
    let err = SubprocessInvoker
        .invoke(InvokerRequest::new(
            "definitely-not-a-real-binary-4f2a",
            vec![],
            Duration::from_secs(5),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::NotFound(_)));
}

#[tokio::test]
async fn env_and_cwd_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let out = SubprocessInvoker
        .invoke(
            InvokerRequest::new(
                "sh",
                vec!["-c".to_string(), "printf '%s %s' \"$RELAIS_PROBE\" \"$PWD\"".to_string()],
                Duration::from_secs(10),
            )
            .with_env(vec![("RELAIS_PROBE".to_string(), "on".to_string())])
            .with_cwd(dir.path()),
        )
        .await
        .unwrap();
    assert!(out.stdout.starts_with("on "));
    let canonical = dir.path().canonicalize().unwrap();
    assert!(out.stdout.contains(canonical.to_str().unwrap()));
}
