// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! External-process adapters for relais: the invoker seam, git, and the
//! orchestrator/builder/reviewer agents.

mod builder;
mod extract;
#[cfg(any(test, feature = "test-support"))]
mod fake;
mod git;
mod invoker;
mod orchestrator;
mod patch;
mod prompt;
mod reviewer;
mod schema;

pub use builder::{BuilderAdapter, BuilderFailure, BuilderWorkspace, DRIVER_PROTOCOL};
pub use extract::{extract_json, ExtractMethod};
pub use git::{DiffAnalysis, GitAdapter, GitError};
pub use invoker::{InvokeError, Invoker, InvokerOutput, InvokerRequest, SubprocessInvoker};
pub use orchestrator::{
    OrchestratorAdapter, OrchestratorContext, OrchestratorFailure, OrchestratorSuccess,
};
pub use patch::{apply_patch, patch_target_paths, PatchError};
pub use prompt::{interpolate, load_prompt, PromptError};
pub use reviewer::{ReviewerAdapter, ReviewerDecision, ReviewerOutcome};
pub use schema::{validate_builder_result, validate_task, ParseFailure, ParseFailureKind};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeInvoker, FakeResponse};
