// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator (planner) adapter.
//!
//! Invokes the external planner with interpolated prompt templates,
//! extracts a JSON task from the raw output, validates it, and retries
//! once with a feedback prompt on parse or schema failure.

use crate::extract::{extract_json, ExtractMethod};
use crate::invoker::{Invoker, InvokerRequest};
use crate::prompt::{interpolate, load_prompt};
use crate::schema::{validate_task, ParseFailure, ParseFailureKind};
use relais_core::{Diagnostics, OrchestratorConfig, Task};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Maximum characters of raw output preserved in diagnostics.
const EXCERPT_LEN: usize = 400;

/// Placeholder values and file locations for one planner invocation.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorContext {
    pub system_prompt_path: PathBuf,
    pub user_prompt_path: PathBuf,
    pub schema_override: Option<PathBuf>,
    /// Placeholder map: project goal, milestone id, budget summary, verify
    /// template ids, repo summary, facts, last report, blocked record.
    pub values: BTreeMap<String, String>,
    pub cwd: PathBuf,
}

/// A validated task plus invocation metadata.
#[derive(Debug, Clone)]
pub struct OrchestratorSuccess {
    pub task: Task,
    pub attempts: u32,
    pub raw_response: String,
    pub extract_method: ExtractMethod,
}

/// Planner failures, classified for verdict mapping.
#[derive(Debug)]
pub enum OrchestratorFailure {
    /// Prompt template missing or unreadable.
    MissingPrompt { message: String },
    /// The invocation exceeded its wall-clock budget.
    Timeout { attempts: u32 },
    /// Unusable output after the retry budget was spent.
    OutputInvalid {
        attempts: u32,
        diagnostics: Diagnostics,
        raw_stderr: String,
    },
    /// The planner process produced nothing usable at the transport level
    /// (nonzero exit, or an empty result that usually means auth failure).
    Transport {
        subtype: String,
        diagnostics: Diagnostics,
    },
}

pub struct OrchestratorAdapter<'a, I> {
    invoker: &'a I,
    config: &'a OrchestratorConfig,
}

impl<'a, I: Invoker> OrchestratorAdapter<'a, I> {
    pub fn new(invoker: &'a I, config: &'a OrchestratorConfig) -> Self {
        Self { invoker, config }
    }

    /// Run the planner, retrying once with feedback on invalid output.
    pub async fn run(
        &self,
        ctx: &OrchestratorContext,
    ) -> Result<OrchestratorSuccess, OrchestratorFailure> {
        let system_prompt = load_prompt(&ctx.system_prompt_path).map_err(|e| {
            OrchestratorFailure::MissingPrompt {
                message: e.to_string(),
            }
        })?;
        let user_template = load_prompt(&ctx.user_prompt_path).map_err(|e| {
            OrchestratorFailure::MissingPrompt {
                message: e.to_string(),
            }
        })?;
        let base_prompt = interpolate(&user_template, &ctx.values);

        let mut prompt = base_prompt.clone();
        let mut attempts = 0u32;
        let mut last_failure: Option<(ParseFailure, String, Option<String>)> = None;
        let mut last_stderr = String::new();

        while attempts <= self.config.retry_budget {
            attempts += 1;
            let request = self.build_request(&system_prompt, &prompt, ctx);
            let output = match self.invoker.invoke(request).await {
                Ok(output) => output,
                Err(e) => {
                    return Err(OrchestratorFailure::Transport {
                        subtype: "spawn_failed".to_string(),
                        diagnostics: Diagnostics {
                            stdout_excerpt: Some(e.to_string()),
                            ..Diagnostics::default()
                        },
                    });
                }
            };

            if output.timed_out {
                return Err(OrchestratorFailure::Timeout { attempts });
            }
            if output.exit_code != Some(0) {
                return Err(OrchestratorFailure::Transport {
                    subtype: format!("exit_{}", output.exit_code.unwrap_or(-1)),
                    diagnostics: Diagnostics {
                        stdout_excerpt: Some(excerpt(&output.stdout)),
                        provider_subtype: Some("cli_error".to_string()),
                        ..Diagnostics::default()
                    },
                });
            }
            if output.stdout.trim().is_empty() {
                // An empty result with a clean exit is the signature of a
                // provider-side auth failure.
                return Err(OrchestratorFailure::Transport {
                    subtype: "empty_result".to_string(),
                    diagnostics: Diagnostics {
                        provider_subtype: Some("auth_or_empty".to_string()),
                        ..Diagnostics::default()
                    },
                });
            }
            last_stderr = output.stderr.clone();

            match self.parse_and_validate(&output.stdout, ctx) {
                Ok((task, method)) => {
                    info!(
                        attempts,
                        method = method.as_str(),
                        task_id = %task.task_id,
                        "orchestrator produced a valid task"
                    );
                    return Ok(OrchestratorSuccess {
                        task,
                        attempts,
                        raw_response: output.stdout,
                        extract_method: method,
                    });
                }
                Err((failure, json_excerpt)) => {
                    warn!(
                        attempts,
                        kind = failure.kind.as_str(),
                        message = %failure.message,
                        "orchestrator output invalid"
                    );
                    prompt = feedback_prompt(&base_prompt, &failure, &output.stdout);
                    last_failure = Some((failure, excerpt(&output.stdout), json_excerpt));
                }
            }
        }

        let (failure, stdout_excerpt, json_excerpt) =
            last_failure.unwrap_or_else(|| {
                (
                    ParseFailure::new(ParseFailureKind::JsonParse, "no output"),
                    String::new(),
                    None,
                )
            });
        Err(OrchestratorFailure::OutputInvalid {
            attempts,
            diagnostics: Diagnostics {
                schema_errors: failure.details,
                extract_method: None,
                stdout_excerpt: Some(stdout_excerpt),
                json_excerpt,
                provider_subtype: None,
            },
            raw_stderr: last_stderr,
        })
    }

    fn build_request(
        &self,
        system_prompt: &str,
        prompt: &str,
        ctx: &OrchestratorContext,
    ) -> InvokerRequest {
        let invoker_values: BTreeMap<String, String> = [
            ("system_prompt".to_string(), system_prompt.to_string()),
            ("prompt".to_string(), prompt.to_string()),
            (
                "model".to_string(),
                self.config.invoker.model.clone().unwrap_or_default(),
            ),
            ("max_turns".to_string(), self.config.max_turns.to_string()),
            (
                "permission_mode".to_string(),
                self.config.permission_mode.clone(),
            ),
        ]
        .into();

        let mut args: Vec<String> = self
            .config
            .invoker
            .args
            .iter()
            .map(|arg| interpolate(arg, &invoker_values))
            .collect();
        // A command with no {{prompt}} placeholder gets it as the last arg.
        if !self.config.invoker.args.iter().any(|a| a.contains("{{prompt}}")) {
            args.push(prompt.to_string());
        }

        InvokerRequest::new(
            &self.config.invoker.command,
            args,
            Duration::from_secs(self.config.timeout_seconds),
        )
        .with_cwd(&ctx.cwd)
    }

    fn parse_and_validate(
        &self,
        stdout: &str,
        ctx: &OrchestratorContext,
    ) -> Result<(Task, ExtractMethod), (ParseFailure, Option<String>)> {
        let Some((value, method)) = extract_json(stdout) else {
            return Err((
                ParseFailure::new(
                    ParseFailureKind::JsonParse,
                    "no JSON object found in planner output",
                ),
                None,
            ));
        };
        let json_excerpt = excerpt(&value.to_string());

        validate_task(&value, ctx.schema_override.as_deref())
            .map_err(|f| (f, Some(json_excerpt.clone())))?;

        let task: Task = serde_json::from_value(value).map_err(|e| {
            (
                ParseFailure::new(
                    ParseFailureKind::Shape,
                    format!("task does not fit the model: {e}"),
                ),
                Some(json_excerpt.clone()),
            )
        })?;
        task.validate().map_err(|e| {
            (
                ParseFailure::new(ParseFailureKind::Shape, e.to_string()),
                Some(json_excerpt.clone()),
            )
        })?;
        Ok((task, method))
    }
}

/// Compose the retry prompt from the original one plus the failure detail.
fn feedback_prompt(base: &str, failure: &ParseFailure, raw: &str) -> String {
    let mut feedback = format!(
        "{base}\n\n## Correction required\n\
         Your previous reply could not be used ({}: {}).\n",
        failure.kind.as_str(),
        failure.message
    );
    if !failure.details.is_empty() {
        feedback.push_str("Schema errors:\n");
        for detail in &failure.details {
            feedback.push_str(&format!("- {detail}\n"));
        }
    }
    feedback.push_str(&format!(
        "Offending excerpt:\n{}\n\nReply with ONLY a JSON object that validates against the task schema.",
        excerpt(raw)
    ));
    feedback
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= EXCERPT_LEN {
        trimmed.to_string()
    } else {
        let mut end = EXCERPT_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
