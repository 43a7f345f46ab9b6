// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reviewer adapter, invoked pre-build when risk flags fire.
//!
//! The reviewer can never block a tick by failing: auth errors, missing
//! prompt files, invocation failures, and unparseable decisions all
//! degrade to `force_patch` with the error preserved for the report.

use crate::extract::extract_json;
use crate::invoker::{Invoker, InvokerRequest};
use crate::prompt::{interpolate, load_prompt};
use relais_core::ReviewerConfig;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// The reviewer's decision for the pending task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewerDecision {
    Proceed,
    ForcePatch,
    AskQuestion {
        prompt: String,
        choices: Option<Vec<String>>,
    },
}

/// Decision plus the error that degraded it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerOutcome {
    pub decision: ReviewerDecision,
    pub error: Option<String>,
}

impl ReviewerOutcome {
    fn degraded(error: impl Into<String>) -> Self {
        Self {
            decision: ReviewerDecision::ForcePatch,
            error: Some(error.into()),
        }
    }
}

pub struct ReviewerAdapter<'a, I> {
    invoker: &'a I,
    config: &'a ReviewerConfig,
}

impl<'a, I: Invoker> ReviewerAdapter<'a, I> {
    pub fn new(invoker: &'a I, config: &'a ReviewerConfig) -> Self {
        Self { invoker, config }
    }

    /// Run the reviewer over the interpolated prompt. Infallible by
    /// design: every failure degrades to force_patch.
    pub async fn run(
        &self,
        prompt_path: &Path,
        values: &BTreeMap<String, String>,
        cwd: &Path,
    ) -> ReviewerOutcome {
        let Some(invoker_command) = &self.config.invoker else {
            return ReviewerOutcome::degraded("reviewer enabled but no invoker configured");
        };

        let template = match load_prompt(prompt_path) {
            Ok(template) => template,
            Err(e) => {
                warn!(error = %e, "reviewer prompt unreadable");
                return ReviewerOutcome::degraded(e.to_string());
            }
        };
        let prompt = interpolate(&template, values);

        let mut args: Vec<String> = invoker_command
            .args
            .iter()
            .map(|arg| {
                interpolate(
                    arg,
                    &[("prompt".to_string(), prompt.clone())].into(),
                )
            })
            .collect();
        if !invoker_command.args.iter().any(|a| a.contains("{{prompt}}")) {
            args.push(prompt.clone());
        }

        let request = InvokerRequest::new(
            &invoker_command.command,
            args,
            Duration::from_secs(self.config.timeout_seconds),
        )
        .with_cwd(cwd);

        let output = match self.invoker.invoke(request).await {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "reviewer invocation failed");
                return ReviewerOutcome::degraded(e.to_string());
            }
        };
        if output.timed_out {
            return ReviewerOutcome::degraded("reviewer timed out");
        }
        if output.exit_code != Some(0) {
            return ReviewerOutcome::degraded(format!(
                "reviewer exited {:?}: {}",
                output.exit_code,
                output.stderr.trim()
            ));
        }

        parse_decision(&output.stdout)
    }
}

fn parse_decision(stdout: &str) -> ReviewerOutcome {
    let Some((value, _method)) = extract_json(stdout) else {
        return ReviewerOutcome::degraded("reviewer produced no JSON decision");
    };
    match value.get("decision").and_then(|d| d.as_str()) {
        Some("proceed") => ReviewerOutcome {
            decision: ReviewerDecision::Proceed,
            error: None,
        },
        Some("force_patch") => ReviewerOutcome {
            decision: ReviewerDecision::ForcePatch,
            error: None,
        },
        Some("ask_question") => {
            let question = value.get("question");
            let prompt = question
                .and_then(|q| q.get("prompt"))
                .and_then(|p| p.as_str())
                .unwrap_or_default()
                .to_string();
            if prompt.is_empty() {
                return ReviewerOutcome::degraded("ask_question decision without a prompt");
            }
            let choices = question
                .and_then(|q| q.get("choices"))
                .and_then(|c| c.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|i| i.as_str().map(str::to_string))
                        .collect::<Vec<_>>()
                });
            ReviewerOutcome {
                decision: ReviewerDecision::AskQuestion { prompt, choices },
                error: None,
            }
        }
        other => ReviewerOutcome::degraded(format!("invalid reviewer decision: {other:?}")),
    }
}

#[cfg(test)]
#[path = "reviewer_tests.rs"]
mod tests;
