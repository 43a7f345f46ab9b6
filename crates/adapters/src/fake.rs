// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake invoker for deterministic testing
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::invoker::{InvokeError, Invoker, InvokerOutput, InvokerRequest};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// One scripted response for [`FakeInvoker`].
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Output(InvokerOutput),
    NotFound,
}

impl FakeResponse {
    /// A successful invocation with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::Output(InvokerOutput {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 5,
            timed_out: false,
        })
    }

    /// A failed invocation with the given exit code and stderr.
    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self::Output(InvokerOutput {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 5,
            timed_out: false,
        })
    }

    /// A timed-out invocation.
    pub fn timeout() -> Self {
        Self::Output(InvokerOutput {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 5,
            timed_out: true,
        })
    }
}

type InvokeHook = dyn Fn(&InvokerRequest) + Send + Sync;

/// Scripted invoker: pops queued responses in order and records every
/// request. An exhausted queue yields empty successes.
#[derive(Clone, Default)]
pub struct FakeInvoker {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    queue: VecDeque<FakeResponse>,
    requests: Vec<InvokerRequest>,
    /// Side-effect hook, e.g. to emulate an agent writing its output file.
    on_invoke: Option<Arc<InvokeHook>>,
}

impl FakeInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response.
    pub fn push(&self, response: FakeResponse) {
        self.inner.lock().queue.push_back(response);
    }

    /// All requests seen so far, in order.
    pub fn requests(&self) -> Vec<InvokerRequest> {
        self.inner.lock().requests.clone()
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.inner.lock().requests.len()
    }

    /// Install a side-effect hook run on every invocation.
    pub fn set_on_invoke(&self, hook: impl Fn(&InvokerRequest) + Send + Sync + 'static) {
        self.inner.lock().on_invoke = Some(Arc::new(hook));
    }
}

#[async_trait]
impl Invoker for FakeInvoker {
    async fn invoke(&self, request: InvokerRequest) -> Result<InvokerOutput, InvokeError> {
        let (response, hook) = {
            let mut state = self.inner.lock();
            state.requests.push(request.clone());
            (state.queue.pop_front(), state.on_invoke.clone())
        };
        if let Some(hook) = hook {
            hook(&request);
        }
        match response {
            Some(FakeResponse::Output(output)) => Ok(output),
            Some(FakeResponse::NotFound) => Err(InvokeError::NotFound(request.command)),
            None => Ok(InvokerOutput {
                exit_code: Some(0),
                ..InvokerOutput::default()
            }),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
