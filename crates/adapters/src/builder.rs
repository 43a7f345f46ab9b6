// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builder adapter: drives the external implementor, or applies a patch.
//!
//! Agent modes speak a machine contract: the task is written to a file,
//! the agent is told where it is via environment variables, and the agent
//! writes its result JSON to the output path. No prose travels through
//! the prompt.

use crate::git::GitAdapter;
use crate::invoker::{InvokeError, Invoker, InvokerRequest};
use crate::patch::{apply_patch, PatchError};
use crate::schema::{validate_builder_result, ParseFailure, ParseFailureKind};
use relais_core::{
    AgentModeConfig, AutonomyConfig, BuilderConfig, BuilderMode, BuilderResult, Task,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Protocol version advertised to external agents.
pub const DRIVER_PROTOCOL: &str = "v2_machine";

/// Builder invocation failures, classified for verdict mapping.
#[derive(Debug)]
pub enum BuilderFailure {
    /// The requested mode has no configuration.
    MissingConfig { mode: BuilderMode },
    /// The autonomy profile denies the requested mode.
    ModeNotAllowed { mode: BuilderMode },
    /// The configured command is not on PATH.
    CommandNotFound { command: String },
    Timeout,
    CliError {
        exit: Option<i32>,
        stderr_excerpt: String,
    },
    /// Output file unusable: json_parse / schema / shape.
    Parse(ParseFailure),
    Patch(PatchError),
    /// The task carried no builder directive (state-machine bug upstream).
    NoBuilder,
}

/// File and path context for one builder invocation.
pub struct BuilderWorkspace<'a> {
    /// Scratch directory for the task/result exchange files.
    pub exchange_dir: &'a Path,
    /// Builder-result schema override, when the workspace provides one.
    pub schema_override: Option<&'a Path>,
    /// Forbidden-path predicate for patch vetting.
    pub forbidden: &'a (dyn Fn(&str) -> bool + Sync),
}

pub struct BuilderAdapter<'a, I> {
    invoker: &'a I,
    config: &'a BuilderConfig,
    autonomy: &'a AutonomyConfig,
}

impl<'a, I: Invoker> BuilderAdapter<'a, I> {
    pub fn new(
        invoker: &'a I,
        config: &'a BuilderConfig,
        autonomy: &'a AutonomyConfig,
    ) -> Self {
        Self {
            invoker,
            config,
            autonomy,
        }
    }

    /// Run the builder for `task`, dispatching on its mode.
    pub async fn run(
        &self,
        task: &Task,
        git: &GitAdapter<I>,
        workspace: &BuilderWorkspace<'_>,
    ) -> Result<BuilderResult, BuilderFailure> {
        let Some(builder) = &task.builder else {
            return Err(BuilderFailure::NoBuilder);
        };
        if !self.autonomy.allows_mode(builder.mode) {
            return Err(BuilderFailure::ModeNotAllowed { mode: builder.mode });
        }

        match builder.mode {
            BuilderMode::Patch => {
                let patch = builder.patch.as_deref().unwrap_or_default();
                let paths = apply_patch(git, patch, workspace.forbidden)
                    .await
                    .map_err(BuilderFailure::Patch)?;
                info!(files = paths.len(), "patch applied");
                Ok(BuilderResult {
                    summary: format!("applied literal patch ({} files)", paths.len()),
                    files_intended: paths,
                    commands_ran: Vec::new(),
                    notes: Vec::new(),
                })
            }
            BuilderMode::ClaudeCode => {
                let mode_config = self
                    .config
                    .claude_code
                    .as_ref()
                    .ok_or(BuilderFailure::MissingConfig { mode: builder.mode })?;
                self.run_agent(task, builder.mode, mode_config, git, workspace)
                    .await
            }
            BuilderMode::CursorAgent => {
                let mode_config = self
                    .config
                    .cursor_agent
                    .as_ref()
                    .ok_or(BuilderFailure::MissingConfig { mode: builder.mode })?;
                self.run_agent(task, builder.mode, mode_config, git, workspace)
                    .await
            }
            BuilderMode::External => {
                let mode_config = self
                    .config
                    .external
                    .as_ref()
                    .ok_or(BuilderFailure::MissingConfig { mode: builder.mode })?;
                self.run_agent(task, builder.mode, mode_config, git, workspace)
                    .await
            }
        }
    }

    async fn run_agent(
        &self,
        task: &Task,
        mode: BuilderMode,
        mode_config: &AgentModeConfig,
        git: &GitAdapter<I>,
        workspace: &BuilderWorkspace<'_>,
    ) -> Result<BuilderResult, BuilderFailure> {
        let exchange = workspace.exchange_dir;
        std::fs::create_dir_all(exchange).map_err(|e| {
            BuilderFailure::Parse(ParseFailure::new(
                ParseFailureKind::Shape,
                format!("cannot create exchange dir: {e}"),
            ))
        })?;

        let task_path = exchange.join("task.json");
        let output_path = exchange.join("result.json");
        let schema_path = match workspace.schema_override {
            Some(path) => path.to_path_buf(),
            None => {
                let embedded = exchange.join("builder-result.schema.json");
                let _ = std::fs::write(&embedded, crate::schema::BUILDER_RESULT_SCHEMA_RAW);
                embedded
            }
        };

        let rendered = serde_json::to_string_pretty(task).unwrap_or_default();
        std::fs::write(&task_path, rendered).map_err(|e| {
            BuilderFailure::Parse(ParseFailure::new(
                ParseFailureKind::Shape,
                format!("cannot write task file: {e}"),
            ))
        })?;
        // A stale result from a previous tick must never be re-read.
        let _ = std::fs::remove_file(&output_path);

        // The task's own turn cap, when present, wins over the mode config.
        let max_turns = task
            .builder
            .as_ref()
            .and_then(|b| b.max_turns)
            .unwrap_or(mode_config.max_turns);
        let request = InvokerRequest::new(
            &mode_config.invoker.command,
            mode_config.invoker.args.clone(),
            Duration::from_secs(self.config.timeout_seconds),
        )
        .with_cwd(git.repo_root())
        .with_env(machine_env(
            mode,
            &task_path,
            &output_path,
            &schema_path,
            max_turns,
        ));

        let output = match self.invoker.invoke(request).await {
            Ok(output) => output,
            Err(InvokeError::NotFound(command)) => {
                return Err(BuilderFailure::CommandNotFound { command });
            }
            Err(e) => {
                return Err(BuilderFailure::CliError {
                    exit: None,
                    stderr_excerpt: e.to_string(),
                });
            }
        };
        if output.timed_out {
            return Err(BuilderFailure::Timeout);
        }
        if output.exit_code != Some(0) {
            return Err(BuilderFailure::CliError {
                exit: output.exit_code,
                stderr_excerpt: excerpt(&output.stderr),
            });
        }

        self.read_result(&output_path, workspace.schema_override)
    }

    fn read_result(
        &self,
        output_path: &Path,
        schema_override: Option<&Path>,
    ) -> Result<BuilderResult, BuilderFailure> {
        let raw = std::fs::read_to_string(output_path).map_err(|_| {
            BuilderFailure::Parse(ParseFailure::new(
                ParseFailureKind::Shape,
                format!("agent wrote no result to {}", output_path.display()),
            ))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
            BuilderFailure::Parse(ParseFailure::new(
                ParseFailureKind::JsonParse,
                format!("result is not JSON: {e}"),
            ))
        })?;
        validate_builder_result(&value, schema_override).map_err(BuilderFailure::Parse)?;
        serde_json::from_value(value).map_err(|e| {
            BuilderFailure::Parse(ParseFailure::new(
                ParseFailureKind::Shape,
                format!("result does not fit the model: {e}"),
            ))
        })
    }
}

/// The environment contract handed to external agents.
fn machine_env(
    mode: BuilderMode,
    task_path: &Path,
    output_path: &Path,
    schema_path: &Path,
    max_turns: u32,
) -> Vec<(String, String)> {
    vec![
        ("PROTOCOL".to_string(), DRIVER_PROTOCOL.to_string()),
        ("DRIVER_KIND".to_string(), mode.to_string()),
        ("TASK_PATH".to_string(), path_string(task_path)),
        ("OUTPUT_PATH".to_string(), path_string(output_path)),
        ("SCHEMA_PATH".to_string(), path_string(schema_path)),
        ("MAX_TURNS".to_string(), max_turns.to_string()),
    ]
}

fn path_string(path: &Path) -> String {
    path.display().to_string()
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= 400 {
        trimmed.to_string()
    } else {
        let mut end = 400;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
