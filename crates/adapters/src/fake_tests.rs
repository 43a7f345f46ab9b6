// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn scripted_responses_pop_in_order() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::ok("first"));
    fake.push(FakeResponse::exit(2, "boom"));

    let a = fake
        .invoke(InvokerRequest::new("x", vec![], Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(a.stdout, "first");

    let b = fake
        .invoke(InvokerRequest::new("x", vec![], Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(b.exit_code, Some(2));
    assert_eq!(b.stderr, "boom");
}

#[tokio::test]
async fn exhausted_queue_yields_empty_success() {
    let fake = FakeInvoker::new();
    let out = fake
        .invoke(InvokerRequest::new("x", vec![], Duration::from_secs(1)))
        .await
        .unwrap();
    assert!(out.success());
    assert!(out.stdout.is_empty());
}

#[tokio::test]
async fn requests_are_recorded() {
    let fake = FakeInvoker::new();
    let request = InvokerRequest::new(
        "git",
        vec!["rev-parse".to_string(), "HEAD".to_string()],
        Duration::from_secs(1),
    );
    fake.invoke(request.clone()).await.unwrap();
    assert_eq!(fake.call_count(), 1);
    assert_eq!(fake.requests()[0], request);
}

#[tokio::test]
async fn not_found_surfaces_as_error() {
    let fake = FakeInvoker::new();
    fake.push(FakeResponse::NotFound);
    let err = fake
        .invoke(InvokerRequest::new("agent", vec![], Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::NotFound(name) if name == "agent"));
}
